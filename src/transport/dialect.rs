//! Interpreter dialects: launch arguments, framing scripts and remote bridging

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;

use crate::error::ShellError;
use crate::types::options::{AuthMethod, ManagerOptions, RemoteOptions};

use super::framing::Markers;

/// Leading `VAR=value rest` assignment; only the first one is converted
static ENV_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)=("([^"]*)"|'([^']*)'|(\S+))\s+(.+)$"#)
        .expect("env prefix pattern is valid")
});

const PWSH_FLAGS: &[&str] = &["-NoLogo", "-NoProfile", "-NonInteractive"];

/// Command interpreter used for sessions, one-shot commands and jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellDialect {
    /// POSIX `bash`; remote sessions bridge through `ssh`
    #[default]
    #[serde(alias = "sh", alias = "posix")]
    Bash,
    /// PowerShell `pwsh`; remote sessions bridge through PSSessions
    #[serde(rename = "powershell", alias = "pwsh")]
    PowerShell,
}

impl std::str::FromStr for ShellDialect {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bash" | "sh" | "posix" => Ok(Self::Bash),
            "powershell" | "pwsh" => Ok(Self::PowerShell),
            other => Err(ShellError::invalid_config(format!(
                "unknown shell dialect: {other}"
            ))),
        }
    }
}

/// Program plus arguments for one subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory; inherited when `None`
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Build a tokio command with null stdin and piped output
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl ShellDialect {
    /// Program name looked up on `PATH` when none is configured
    #[must_use]
    pub const fn default_program(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::PowerShell => "pwsh",
        }
    }

    /// Resolve the interpreter program from configuration
    #[must_use]
    pub fn program(self, options: &ManagerOptions) -> PathBuf {
        resolve_program(options.shell_program.as_deref(), self.default_program())
    }

    /// Long-lived interpreter reading commands from stdin
    #[must_use]
    pub fn interactive(self, options: &ManagerOptions) -> Invocation {
        let args: &[&str] = match self {
            Self::Bash => &["--noprofile", "--norc"],
            Self::PowerShell => &["-NoLogo", "-NoProfile", "-NonInteractive", "-Command", "-"],
        };
        Invocation {
            program: self.program(options),
            args: args.iter().map(ToString::to_string).collect(),
            working_dir: None,
        }
    }

    /// Fresh interpreter running one command
    #[must_use]
    pub fn one_shot(self, options: &ManagerOptions, command: &str) -> Invocation {
        let mut args: Vec<String> = match self {
            Self::Bash => vec!["-c".to_string()],
            Self::PowerShell => PWSH_FLAGS
                .iter()
                .map(ToString::to_string)
                .chain(std::iter::once("-Command".to_string()))
                .collect(),
        };
        args.push(command.to_string());
        Invocation {
            program: self.program(options),
            args,
            working_dir: None,
        }
    }

    /// Wrap `command` with the sentinels of one execution
    ///
    /// Both streams receive the start sentinel, then the command runs in the
    /// interpreter's current scope, then both streams receive the end sentinel
    /// carrying the outcome. The result is newline-terminated.
    #[must_use]
    pub fn frame(self, command: &str, markers: &Markers) -> String {
        match self {
            Self::Bash => {
                let start = sh_quote(markers.start());
                let ok = sh_quote(markers.end_success());
                let err = sh_quote(markers.end_error());
                format!(
                    "printf '%s\\n' {start}; printf '%s\\n' {start} >&2; \
                     eval {cmd} </dev/null; __kg_rc=$?; \
                     if [ \"$__kg_rc\" -eq 0 ]; then __kg_end={ok}; else __kg_end={err}; fi; \
                     printf '\\n%s\\n' \"$__kg_end\"; printf '\\n%s\\n' \"$__kg_end\" >&2\n",
                    cmd = sh_quote(command),
                )
            }
            Self::PowerShell => {
                let start = ps_quote(markers.start());
                let ok = ps_quote(markers.end_success());
                let err = ps_quote(markers.end_error());
                format!(
                    "[Console]::Out.WriteLine({start}); [Console]::Error.WriteLine({start}); \
                     $__kgOk = $true; \
                     try {{ Invoke-Expression {cmd} | Out-String -Stream | ForEach-Object {{ [Console]::Out.WriteLine($_) }} }} \
                     catch {{ $__kgOk = $false; [Console]::Error.WriteLine(($_ | Out-String).Trim()) }}; \
                     if ($__kgOk) {{ $__kgEnd = {ok} }} else {{ $__kgEnd = {err} }}; \
                     [Console]::Out.WriteLine(''); [Console]::Out.WriteLine($__kgEnd); \
                     [Console]::Error.WriteLine(''); [Console]::Error.WriteLine($__kgEnd)\n",
                    cmd = ps_single_line(command),
                )
            }
        }
    }

    /// Trivial command used as the readiness probe
    #[must_use]
    pub const fn probe_command(self) -> &'static str {
        match self {
            Self::Bash => ":",
            Self::PowerShell => "$null",
        }
    }

    /// Instruction asking the interpreter to exit
    #[must_use]
    pub const fn exit_instruction(self) -> &'static str {
        "exit\n"
    }

    /// Rewrite a leading `VAR=value cmd` into an interpreter-native assignment
    ///
    /// Bash understands the prefix natively. PowerShell gets
    /// `$env:VAR = 'value'; cmd`. Only a single leading assignment is
    /// converted; any further assignments are left untouched.
    #[must_use]
    pub fn rewrite_env_prefix(self, command: &str) -> Cow<'_, str> {
        if self == Self::Bash {
            return Cow::Borrowed(command);
        }
        let Some(caps) = ENV_PREFIX.captures(command) else {
            return Cow::Borrowed(command);
        };
        let name = &caps[1];
        let value = caps
            .get(3)
            .or_else(|| caps.get(4))
            .or_else(|| caps.get(5))
            .map_or("", |m| m.as_str());
        let rest = &caps[6];
        Cow::Owned(format!("$env:{name} = {}; {rest}", ps_quote(value)))
    }

    /// Prefix `command` with a change into `dir`
    #[must_use]
    pub fn within_directory(self, dir: &Path, command: &str) -> String {
        let dir = dir.display().to_string();
        match self {
            Self::Bash => format!("cd {} && {command}", sh_quote(&dir)),
            Self::PowerShell => format!("Set-Location -LiteralPath {}; {command}", ps_quote(&dir)),
        }
    }

    /// Bridging subprocess that runs `command` in the session's remote connection
    #[must_use]
    pub fn bridge(
        self,
        options: &ManagerOptions,
        session: &str,
        remote: &RemoteOptions,
        command: &str,
    ) -> Invocation {
        match self {
            Self::Bash => {
                let mut args = ssh_connection_args(options, session, remote);
                args.push(remote.host.clone());
                args.push(command.to_string());
                Invocation {
                    program: resolve_program(options.ssh_program.as_deref(), "ssh"),
                    args,
                    working_dir: None,
                }
            }
            Self::PowerShell => {
                let script = format!(
                    "{prelude}\
                     $s = Get-PSSession @conn -Name $name -ErrorAction SilentlyContinue | Select-Object -First 1\n\
                     if ($s -and $s.State -eq 'Disconnected') {{ $s = Connect-PSSession -Session $s }}\n\
                     if (-not $s) {{ $s = New-PSSession @conn -Name $name -SessionOption $opts }}\n\
                     try {{ Invoke-Command -Session $s -ScriptBlock ([scriptblock]::Create({cmd})) }}\n\
                     finally {{ Disconnect-PSSession -Session $s | Out-Null }}\n",
                    prelude = pssession_prelude(session, remote),
                    cmd = ps_quote(command),
                );
                self.one_shot(options, &script)
            }
        }
    }

    /// Bridging subprocess that tears down the session's remote connection
    #[must_use]
    pub fn bridge_removal(
        self,
        options: &ManagerOptions,
        session: &str,
        remote: &RemoteOptions,
    ) -> Invocation {
        match self {
            Self::Bash => {
                let mut args = vec![
                    "-o".to_string(),
                    format!("ControlPath={}", control_path(options, session).display()),
                    "-O".to_string(),
                    "exit".to_string(),
                ];
                if let Some(port) = remote.port {
                    args.push("-p".to_string());
                    args.push(port.to_string());
                }
                args.push(remote.host.clone());
                Invocation {
                    program: resolve_program(options.ssh_program.as_deref(), "ssh"),
                    args,
                    working_dir: None,
                }
            }
            Self::PowerShell => {
                let script = format!(
                    "{}Get-PSSession @conn -Name $name -ErrorAction SilentlyContinue | Remove-PSSession\n",
                    pssession_prelude(session, remote),
                );
                self.one_shot(options, &script)
            }
        }
    }
}

// ============================================================================
// Remote helpers
// ============================================================================

fn ssh_connection_args(
    options: &ManagerOptions,
    session: &str,
    remote: &RemoteOptions,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ControlMaster=auto".to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path(options, session).display()),
        "-o".to_string(),
        format!("ControlPersist={}", options.ssh_control_persist.as_secs().max(1)),
    ];
    if let Some(timeout) = remote.connect_timeout {
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
    }
    if let Some(port) = remote.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(ref identity) = remote.credential {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
        args.push("-o".to_string());
        args.push("IdentitiesOnly=yes".to_string());
    }
    if let Some(method) = remote.auth.and_then(ssh_auth_name) {
        args.push("-o".to_string());
        args.push(format!("PreferredAuthentications={method}"));
    }
    if remote.use_tls {
        log::debug!("[{session}] TLS flag has no meaning for ssh transport; ignored");
    }
    args
}

fn ssh_auth_name(method: AuthMethod) -> Option<&'static str> {
    match method {
        AuthMethod::PublicKey => Some("publickey"),
        AuthMethod::Password => Some("password,keyboard-interactive"),
        AuthMethod::Kerberos | AuthMethod::Negotiate => Some("gssapi-with-mic"),
        AuthMethod::Default | AuthMethod::Basic | AuthMethod::CredSsp => None,
    }
}

fn pssession_auth_name(method: AuthMethod) -> Option<&'static str> {
    match method {
        AuthMethod::Default => Some("Default"),
        AuthMethod::Basic => Some("Basic"),
        AuthMethod::Negotiate => Some("Negotiate"),
        AuthMethod::Kerberos => Some("Kerberos"),
        AuthMethod::CredSsp => Some("Credssp"),
        AuthMethod::PublicKey | AuthMethod::Password => None,
    }
}

/// Connection splat, session name and session options shared by bridge scripts
fn pssession_prelude(session: &str, remote: &RemoteOptions) -> String {
    let mut script = String::from("$ErrorActionPreference = 'Stop'\n");
    script.push_str(&format!("$conn = @{{ ComputerName = {} }}\n", ps_quote(&remote.host)));
    if let Some(port) = remote.port {
        script.push_str(&format!("$conn.Port = {port}\n"));
    }
    if remote.use_tls {
        script.push_str("$conn.UseSSL = $true\n");
    }
    if let Some(method) = remote.auth.and_then(pssession_auth_name) {
        script.push_str(&format!("$conn.Authentication = '{method}'\n"));
    }
    if let Some(ref credential) = remote.credential {
        script.push_str(&format!(
            "$conn.Credential = Import-Clixml -Path {}\n",
            ps_quote(&credential.display().to_string())
        ));
    }
    script.push_str(&format!(
        "$name = {}\n",
        ps_quote(&format!("kodegen-{}", sanitize_name(session)))
    ));
    match remote.connect_timeout {
        Some(timeout) => script.push_str(&format!(
            "$opts = New-PSSessionOption -OpenTimeout {}\n",
            crate::error::duration_ms(timeout)
        )),
        None => script.push_str("$opts = New-PSSessionOption\n"),
    }
    script
}

fn control_path(options: &ManagerOptions, session: &str) -> PathBuf {
    options
        .ssh_control_dir()
        .join(format!("kodegen-ssh-{}.sock", sanitize_name(session)))
}

// ============================================================================
// Quoting
// ============================================================================

/// Resolve the configured program, or `default`, looking bare names up on `PATH`
pub(crate) fn resolve_program(configured: Option<&Path>, default: &str) -> PathBuf {
    let program = configured.unwrap_or_else(|| Path::new(default));
    if program.is_absolute() || program.components().count() > 1 {
        return program.to_path_buf();
    }
    which::which(program).unwrap_or_else(|_| program.to_path_buf())
}

/// Restrict a caller-chosen name to characters safe in file names
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// POSIX single-quoted literal
#[must_use]
pub fn sh_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// PowerShell single-quoted literal
#[must_use]
pub fn ps_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// PowerShell string expression with newlines encoded, fitting on one line
fn ps_single_line(text: &str) -> String {
    let text = text.replace('\r', "");
    let parts: Vec<String> = text.split('\n').map(ps_quote).collect();
    if parts.len() == 1 {
        parts.concat()
    } else {
        format!("({})", parts.join(" + \"`n\" + "))
    }
}
