//! Unit tests for `ManagerOptions`
//!
//! Tests defaults, the builder, JSON loading and environment overrides

use kodegen_shell_session::types::options::ENV_PREFIX;
use kodegen_shell_session::{
    CommandOutput, ManagerOptions, RemoteOptions, SessionEvent, ShellDialect, ShellError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let options = ManagerOptions::default();
    assert_eq!(options.dialect, ShellDialect::Bash);
    assert_eq!(options.init_timeout, Duration::from_secs(10));
    assert_eq!(options.probe_interval, Duration::from_millis(500));
    assert_eq!(options.command_timeout, Duration::from_secs(30));
    assert_eq!(options.control_timeout, Duration::from_secs(10));
    assert_eq!(options.output_tail_lines, 100);
    assert_eq!(options.ssh_control_persist, Duration::from_secs(600));
    assert_eq!(options.job_output_dir(), std::env::temp_dir());
}

#[test]
fn test_builder() {
    let options = ManagerOptions::builder()
        .dialect(ShellDialect::PowerShell)
        .shell_program("/opt/pwsh")
        .working_dir("/srv")
        .command_timeout(Duration::from_secs(5))
        .job_output_dir("/var/tmp/jobs")
        .output_tail_lines(10)
        .build();

    assert_eq!(options.dialect, ShellDialect::PowerShell);
    assert_eq!(options.shell_program, Some(PathBuf::from("/opt/pwsh")));
    assert_eq!(options.working_dir, Some(PathBuf::from("/srv")));
    assert_eq!(options.command_timeout, Duration::from_secs(5));
    assert_eq!(options.job_output_dir(), PathBuf::from("/var/tmp/jobs"));
    assert_eq!(options.output_tail_lines, 10);
}

#[test]
fn test_from_json_file_keeps_missing_defaults() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("shell.json");
    std::fs::write(
        &path,
        r#"{ "dialect": "powershell", "command_timeout": 1500, "output_tail_lines": 20 }"#,
    )
    .unwrap();

    let options = ManagerOptions::from_json_file(&path).unwrap();
    assert_eq!(options.dialect, ShellDialect::PowerShell);
    assert_eq!(options.command_timeout, Duration::from_millis(1500));
    assert_eq!(options.output_tail_lines, 20);
    assert_eq!(options.init_timeout, Duration::from_secs(10));
}

#[test]
fn test_dialect_names_agree_with_env_spelling() {
    for (json, expected) in [
        (r#""bash""#, ShellDialect::Bash),
        (r#""sh""#, ShellDialect::Bash),
        (r#""powershell""#, ShellDialect::PowerShell),
        (r#""pwsh""#, ShellDialect::PowerShell),
    ] {
        let parsed: ShellDialect = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, expected, "{json}");
        let name = json.trim_matches('"');
        assert_eq!(name.parse::<ShellDialect>().unwrap(), expected);
    }

    assert_eq!(
        serde_json::to_string(&ShellDialect::PowerShell).unwrap(),
        r#""powershell""#
    );
    assert!(serde_json::from_str::<ShellDialect>(r#""power_shell""#).is_err());
}

#[test]
fn test_from_json_file_errors() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        ManagerOptions::from_json_file(&path),
        Err(ShellError::InvalidConfig(_))
    ));

    assert!(matches!(
        ManagerOptions::from_json_file(scratch.path().join("absent.json")),
        Err(ShellError::Io(_))
    ));
}

#[test]
fn test_overrides() {
    let options = ManagerOptions::default()
        .with_overrides(lookup(&[
            ("DIALECT", "pwsh"),
            ("INIT_TIMEOUT_MS", "2500"),
            ("JOB_OUTPUT_DIR", "/tmp/jobs"),
            ("TAIL_LINES", " 7 "),
        ]))
        .unwrap();

    assert_eq!(options.dialect, ShellDialect::PowerShell);
    assert_eq!(options.init_timeout, Duration::from_millis(2500));
    assert_eq!(options.job_output_dir, Some(PathBuf::from("/tmp/jobs")));
    assert_eq!(options.output_tail_lines, 7);
    assert_eq!(options.command_timeout, Duration::from_secs(30));
}

#[test]
fn test_invalid_override() {
    let err = ManagerOptions::default()
        .with_overrides(lookup(&[("COMMAND_TIMEOUT_MS", "soon")]))
        .unwrap_err();
    assert!(matches!(err, ShellError::InvalidConfig(ref msg) if msg.contains(ENV_PREFIX)));

    let err = ManagerOptions::default()
        .with_overrides(lookup(&[("DIALECT", "fish")]))
        .unwrap_err();
    assert!(matches!(err, ShellError::InvalidConfig(_)));
}

#[test]
fn test_remote_options_serde() {
    let remote = RemoteOptions::new("host")
        .port(22)
        .connect_timeout(Duration::from_millis(2500));
    let json = serde_json::to_value(&remote).unwrap();
    assert_eq!(json["host"], "host");
    assert_eq!(json["connect_timeout"], 2500);
    assert!(json.get("credential").is_none());

    let parsed: RemoteOptions = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, remote);
}

#[test]
fn test_records_serialize_plainly() {
    let timeout = ShellError::command_timeout(Duration::from_millis(300), Some("build"));
    let record = CommandOutput::from_error(&timeout);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["stderr"].as_str().unwrap().contains("timed out after 300ms"));
    assert!(json.get("exit_code").is_none());

    let event = SessionEvent::SessionClosed {
        name: "build".into(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "session_closed");
    assert_eq!(json["name"], "build");
}
