//! Unit tests for `ShellDialect`
//!
//! Tests launch arguments, framing scripts, environment rewriting and
//! remote bridging commands

use kodegen_shell_session::transport::dialect::{ps_quote, sh_quote};
use kodegen_shell_session::transport::{MarkerFactory, ShellDialect};
use kodegen_shell_session::{AuthMethod, ManagerOptions, RemoteOptions, ShellError};
use std::time::Duration;

fn options() -> ManagerOptions {
    ManagerOptions::builder()
        .shell_program("/bin/bash")
        .ssh_program("/usr/bin/ssh")
        .ssh_control_dir("/tmp/kg-test")
        .build()
}

#[test]
fn test_parse_dialect_names() {
    assert_eq!("bash".parse::<ShellDialect>().unwrap(), ShellDialect::Bash);
    assert_eq!(" POSIX ".parse::<ShellDialect>().unwrap(), ShellDialect::Bash);
    assert_eq!("pwsh".parse::<ShellDialect>().unwrap(), ShellDialect::PowerShell);
    assert_eq!(
        "PowerShell".parse::<ShellDialect>().unwrap(),
        ShellDialect::PowerShell
    );
    assert!(matches!(
        "fish".parse::<ShellDialect>(),
        Err(ShellError::InvalidConfig(_))
    ));
}

#[test]
fn test_interactive_invocations() {
    let bash = ShellDialect::Bash.interactive(&options());
    assert_eq!(bash.program.to_str(), Some("/bin/bash"));
    assert_eq!(bash.args, vec!["--noprofile", "--norc"]);

    let pwsh = ShellDialect::PowerShell.interactive(&options());
    assert_eq!(pwsh.args.last().map(String::as_str), Some("-"));
    assert!(pwsh.args.contains(&"-NonInteractive".to_string()));
}

#[test]
fn test_one_shot_passes_command_last() {
    let invocation = ShellDialect::Bash.one_shot(&options(), "echo hi");
    assert_eq!(invocation.args, vec!["-c", "echo hi"]);

    let invocation = ShellDialect::PowerShell.one_shot(&options(), "Get-Date");
    assert_eq!(invocation.args.last().map(String::as_str), Some("Get-Date"));
    assert!(invocation.args.contains(&"-Command".to_string()));
}

#[test]
fn test_bash_frame_wraps_command() {
    let factory = MarkerFactory::with_nonce("frame");
    let (_, markers) = factory.next();
    let script = ShellDialect::Bash.frame("echo 'quoted'", &markers);

    assert!(script.ends_with('\n'));
    assert_eq!(script.matches('\n').count(), 1);
    assert!(script.contains(markers.start()));
    assert!(script.contains(markers.end_success()));
    assert!(script.contains(markers.end_error()));
    assert!(script.contains(&format!("eval {}", sh_quote("echo 'quoted'"))));
    assert!(script.contains("</dev/null"));
}

#[test]
fn test_powershell_frame_is_single_line() {
    let factory = MarkerFactory::with_nonce("frame");
    let (_, markers) = factory.next();
    let script = ShellDialect::PowerShell.frame("Write-Output 1\nWrite-Output 2", &markers);

    assert_eq!(script.matches('\n').count(), 1);
    assert!(script.ends_with('\n'));
    assert!(script.contains("Invoke-Expression"));
    assert!(script.contains(markers.end_error()));
}

#[test]
fn test_env_prefix_rewrite_powershell() {
    let dialect = ShellDialect::PowerShell;
    assert_eq!(
        dialect.rewrite_env_prefix("FOO=bar node app.js"),
        "$env:FOO = 'bar'; node app.js"
    );
    assert_eq!(
        dialect.rewrite_env_prefix("GREETING=\"hello there\" echo $env:GREETING"),
        "$env:GREETING = 'hello there'; echo $env:GREETING"
    );
}

#[test]
fn test_env_prefix_rewrite_converts_only_first_assignment() {
    assert_eq!(
        ShellDialect::PowerShell.rewrite_env_prefix("A=1 B=2 run"),
        "$env:A = '1'; B=2 run"
    );
}

#[test]
fn test_env_prefix_rewrite_leaves_other_commands() {
    assert_eq!(
        ShellDialect::PowerShell.rewrite_env_prefix("Get-ChildItem"),
        "Get-ChildItem"
    );
    assert_eq!(
        ShellDialect::PowerShell.rewrite_env_prefix("FOO=bar"),
        "FOO=bar"
    );
    assert_eq!(
        ShellDialect::Bash.rewrite_env_prefix("FOO=bar env"),
        "FOO=bar env"
    );
}

#[test]
fn test_ssh_bridge_arguments() {
    let remote = RemoteOptions::new("deploy@build-host")
        .port(2222)
        .credential("/keys/id_ed25519")
        .auth(AuthMethod::PublicKey)
        .connect_timeout(Duration::from_secs(7))
        .use_tls(true);
    let bridge = ShellDialect::Bash.bridge(&options(), "ci", &remote, "uname -a");

    assert_eq!(bridge.program.to_str(), Some("/usr/bin/ssh"));
    let args = bridge.args.join(" ");
    assert!(args.contains("ControlMaster=auto"));
    assert!(args.contains("ControlPath=/tmp/kg-test/kodegen-ssh-ci.sock"));
    assert!(args.contains("ControlPersist=600"));
    assert!(args.contains("ConnectTimeout=7"));
    assert!(args.contains("-p 2222"));
    assert!(args.contains("-i /keys/id_ed25519"));
    assert!(args.contains("PreferredAuthentications=publickey"));
    assert_eq!(bridge.args[bridge.args.len() - 2], "deploy@build-host");
    assert_eq!(bridge.args.last().map(String::as_str), Some("uname -a"));
}

#[test]
fn test_ssh_bridge_removal() {
    let remote = RemoteOptions::new("build-host");
    let removal = ShellDialect::Bash.bridge_removal(&options(), "ci", &remote);
    let args = removal.args.join(" ");
    assert!(args.contains("-O exit"));
    assert!(args.contains("ControlPath=/tmp/kg-test/kodegen-ssh-ci.sock"));
    assert_eq!(removal.args.last().map(String::as_str), Some("build-host"));
}

#[test]
fn test_pssession_bridge_script() {
    let remote = RemoteOptions::new("win-host")
        .port(5986)
        .use_tls(true)
        .auth(AuthMethod::Negotiate);
    let bridge = ShellDialect::PowerShell.bridge(&options(), "ops", &remote, "Get-Service");
    let script = bridge.args.last().expect("script argument");

    assert!(script.contains("ComputerName = 'win-host'"));
    assert!(script.contains("$conn.Port = 5986"));
    assert!(script.contains("$conn.UseSSL = $true"));
    assert!(script.contains("$conn.Authentication = 'Negotiate'"));
    assert!(script.contains("'kodegen-ops'"));
    assert!(script.contains("Connect-PSSession"));
    assert!(script.contains("New-PSSession"));
    assert!(script.contains("Invoke-Command"));
    assert!(script.contains("Disconnect-PSSession"));
    assert!(script.contains("'Get-Service'"));

    let removal = ShellDialect::PowerShell.bridge_removal(&options(), "ops", &remote);
    assert!(removal.args.last().is_some_and(|s| s.contains("Remove-PSSession")));
}

#[test]
fn test_within_directory() {
    let dir = std::path::Path::new("/srv/app");
    assert_eq!(
        ShellDialect::Bash.within_directory(dir, "ls"),
        "cd '/srv/app' && ls"
    );
    assert_eq!(
        ShellDialect::PowerShell.within_directory(dir, "ls"),
        "Set-Location -LiteralPath '/srv/app'; ls"
    );
}

#[test]
fn test_quoting() {
    assert_eq!(sh_quote("it's"), r"'it'\''s'");
    assert_eq!(ps_quote("it's"), "'it''s'");
}
