//! Integration tests for `ExecutionGateway`
//!
//! Tests stateless execution, session routing and error folding

use kodegen_shell_session::{
    CreateSessionRequest, ExecutionGateway, JobState, ManagerOptions, ShellError,
    StartJobRequest,
};
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gateway() -> ExecutionGateway {
    ExecutionGateway::new(
        ManagerOptions::builder()
            .command_timeout(Duration::from_secs(10))
            .probe_interval(Duration::from_millis(200))
            .close_grace(Duration::from_millis(200))
            .build(),
    )
}

#[tokio::test]
async fn test_one_shot_execution() {
    init_logger();
    let gateway = gateway();

    let output = gateway.execute(None, "echo stateless", None).await.unwrap();
    assert_eq!(output.stdout, "stateless");
    assert!(output.success);
    assert_eq!(output.exit_code, Some(0));

    let output = gateway
        .execute(None, "echo bad >&2; exit 4", None)
        .await
        .unwrap();
    assert!(!output.success);
    assert_eq!(output.exit_code, Some(4));
    assert_eq!(output.stderr, "bad");
}

#[tokio::test]
async fn test_one_shot_does_not_keep_state() {
    init_logger();
    let gateway = gateway();

    gateway.execute(None, "export LEAK=1", None).await.unwrap();
    let output = gateway.execute(None, "echo \"[$LEAK]\"", None).await.unwrap();
    assert_eq!(output.stdout, "[]");
}

#[tokio::test]
async fn test_one_shot_timeout() {
    init_logger();
    let gateway = gateway();

    let started = Instant::now();
    let err = gateway
        .execute(None, "sleep 5", Some(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, ShellError::CommandTimeout { session: None, .. }));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_report_folds_errors() {
    init_logger();
    let gateway = gateway();

    let timed_out = gateway
        .report(None, "sleep 5", Some(Duration::from_millis(300)))
        .await;
    assert!(!timed_out.success);
    assert!(timed_out.stderr.contains("timed out"));
    assert_eq!(timed_out.exit_code, None);

    let missing = gateway.report(Some("ghost"), "echo", None).await;
    assert!(!missing.success);
    assert!(missing.stderr.contains("Session not found: ghost"));
    assert!(!missing.stderr.contains("timed out"));

    let failed = gateway.report(None, "exit 2", None).await;
    assert!(!failed.success);
    assert_eq!(failed.exit_code, Some(2));
}

#[tokio::test]
async fn test_routes_to_session() {
    init_logger();
    let gateway = gateway();

    gateway
        .create_session(CreateSessionRequest::local("routed"))
        .await
        .unwrap();
    gateway
        .execute(Some("routed"), "cd / && export ROUTED=yes", None)
        .await
        .unwrap();

    let output = gateway
        .execute(Some("routed"), "echo $ROUTED $(pwd)", None)
        .await
        .unwrap();
    assert_eq!(output.stdout, "yes /");
    assert_eq!(output.exit_code, None);

    assert_eq!(gateway.list_sessions().await.len(), 1);
    assert!(gateway.close_session("routed").await);
    assert!(gateway.list_sessions().await.is_empty());
}

#[tokio::test]
async fn test_job_delegation() {
    init_logger();
    let scratch = tempfile::tempdir().unwrap();
    let gateway = ExecutionGateway::new(
        ManagerOptions::builder()
            .job_output_dir(scratch.path())
            .build(),
    );

    let info = gateway
        .start_job(StartJobRequest::new("bg", "sleep 5"))
        .await
        .unwrap();
    let status = gateway.job_status("bg", false).await.unwrap();
    assert_eq!(status.job.pid, info.pid);
    assert_eq!(status.state, JobState::Running);
    assert_eq!(gateway.list_jobs().await.len(), 1);

    gateway.stop_job("bg").await.unwrap();
    let output = gateway.job_output("bg", true).await.unwrap();
    assert_eq!(output.stdout.as_deref(), Some(""));

    let removed = gateway.remove_job("bg", false).await.unwrap();
    assert_eq!(removed.deleted_files.len(), 1);
    assert!(gateway.list_jobs().await.is_empty());
}
