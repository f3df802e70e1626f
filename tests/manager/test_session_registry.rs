//! Integration tests for `SessionRegistry`
//!
//! Tests name uniqueness, isolation, lifecycle notifications and
//! serialization of commands sent to one session

use futures::StreamExt;
use kodegen_shell_session::{
    CreateSessionRequest, Locality, ManagerOptions, SessionEvent, SessionEventKind,
    SessionRegistry, SessionState, ShellError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_WAIT: Duration = Duration::from_secs(5);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(
        ManagerOptions::builder()
            .init_timeout(Duration::from_secs(10))
            .probe_interval(Duration::from_millis(200))
            .close_grace(Duration::from_millis(200))
            .build(),
    )
}

#[tokio::test]
async fn test_create_and_execute() {
    init_logger();
    let registry = registry();

    let info = registry.create(CreateSessionRequest::local("main")).await.unwrap();
    assert_eq!(info.name, "main");
    assert_eq!(info.locality, Locality::Local);
    assert_eq!(info.host, "localhost");
    assert_eq!(info.state, SessionState::Connected);
    assert!(info.remote.is_none());

    let output = registry.execute("main", "echo hi", TIMEOUT).await.unwrap();
    assert_eq!(output.stdout, "hi");
    assert!(output.success);

    let snapshot = registry.get("main").await.unwrap();
    assert!(snapshot.last_used_at >= info.last_used_at);
    assert!(registry.pid("main").await.unwrap().is_some());

    assert_eq!(registry.close_all().await, 1);
}

#[tokio::test]
async fn test_duplicate_name_keeps_first_session() {
    init_logger();
    let registry = registry();

    registry.create(CreateSessionRequest::local("dup")).await.unwrap();
    registry.execute("dup", "export MARK=first", TIMEOUT).await.unwrap();

    let err = registry
        .create(CreateSessionRequest::local("dup"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShellError::DuplicateSession(ref name) if name == "dup"));

    let output = registry.execute("dup", "echo $MARK", TIMEOUT).await.unwrap();
    assert_eq!(output.stdout, "first");
    assert_eq!(registry.list().await.len(), 1);

    registry.close_all().await;
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    init_logger();
    let registry = registry();

    registry.create(CreateSessionRequest::local("a")).await.unwrap();
    registry.create(CreateSessionRequest::local("b")).await.unwrap();

    registry.execute("a", "X=1", TIMEOUT).await.unwrap();
    let output = registry.execute("b", "echo \"[$X]\"", TIMEOUT).await.unwrap();
    assert_eq!(output.stdout, "[]");

    let names: Vec<String> = registry.list().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["a", "b"]);

    assert_eq!(registry.close_all().await, 2);
    assert!(registry.list().await.is_empty());
}

#[tokio::test]
async fn test_unknown_session() {
    init_logger();
    let registry = registry();

    let err = registry.execute("ghost", "echo", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ShellError::SessionNotFound(ref name) if name == "ghost"));
    assert!(matches!(
        registry.get("ghost").await,
        Err(ShellError::SessionNotFound(_))
    ));
    assert!(matches!(
        registry.pid("ghost").await,
        Err(ShellError::SessionNotFound(_))
    ));

    // Closing an unknown name is a no-op
    assert!(!registry.close("ghost").await);
}

#[tokio::test]
async fn test_close_removes_entry() {
    init_logger();
    let registry = registry();

    registry.create(CreateSessionRequest::local("temp")).await.unwrap();
    assert!(registry.close("temp").await);
    assert!(!registry.close("temp").await);
    assert!(matches!(
        registry.execute("temp", "echo", TIMEOUT).await,
        Err(ShellError::SessionNotFound(_))
    ));

    // The name is free again
    registry.create(CreateSessionRequest::local("temp")).await.unwrap();
    registry.close_all().await;
}

#[tokio::test]
async fn test_lifecycle_notifications() {
    init_logger();
    let registry = registry();
    let mut events = Box::pin(registry.subscribe(None));

    registry.create(CreateSessionRequest::local("watched")).await.unwrap();
    registry.close("watched").await;

    let created = tokio::time::timeout(EVENT_WAIT, events.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        created,
        SessionEvent::SessionCreated { ref name, locality: Locality::Local } if name == "watched"
    ));

    let closed = tokio::time::timeout(EVENT_WAIT, events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.kind(), SessionEventKind::Closed);
    assert_eq!(closed.name(), "watched");
}

#[tokio::test]
async fn test_interpreter_exit_publishes_disconnect() {
    init_logger();
    let registry = registry();
    let mut disconnects = Box::pin(registry.subscribe(Some(SessionEventKind::Disconnected)));

    registry.create(CreateSessionRequest::local("fragile")).await.unwrap();
    let err = registry.execute("fragile", "exit 0", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ShellError::ExecutionFailure(_)));

    let event = tokio::time::timeout(EVENT_WAIT, disconnects.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.name(), "fragile");

    // The entry is gone once the notification is out
    assert!(registry.list().await.is_empty());
    assert!(!registry.close("fragile").await);
}

#[tokio::test]
async fn test_failed_create_publishes_error_and_frees_name() {
    init_logger();
    let registry = registry();
    let mut errors = Box::pin(registry.subscribe(Some(SessionEventKind::Error)));
    let scratch = tempfile::tempdir().unwrap();
    let missing = scratch.path().join("missing");

    let err = registry
        .create(CreateSessionRequest::local("broken").working_dir(&missing))
        .await
        .unwrap_err();
    assert!(matches!(err, ShellError::SessionStartFailure { .. }));

    let event = tokio::time::timeout(EVENT_WAIT, errors.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SessionEvent::SessionError { ref name, .. } if name == "broken"));
    assert!(registry.list().await.is_empty());

    registry.create(CreateSessionRequest::local("broken")).await.unwrap();
    registry.close_all().await;
}

#[tokio::test]
async fn test_commands_on_one_session_are_serialized() {
    init_logger();
    let registry = Arc::new(registry());
    registry.create(CreateSessionRequest::local("shared")).await.unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .execute("shared", &format!("sleep 0.1; echo task{i}"), TIMEOUT)
                    .await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let output = task.await.unwrap().unwrap();
        assert_eq!(output.stdout, format!("task{i}"));
    }

    registry.close_all().await;
}

#[tokio::test]
async fn test_concurrent_creation_of_one_name() {
    init_logger();
    let registry = Arc::new(registry());

    let first = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.create(CreateSessionRequest::local("race")).await })
    };
    let second = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.create(CreateSessionRequest::local("race")).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(ShellError::DuplicateSession(_))))
    );
    assert_eq!(registry.list().await.len(), 1);

    registry.close_all().await;
}

#[tokio::test]
async fn test_subscription_filters_by_kind() {
    init_logger();
    let registry = registry();
    let mut closes = tokio_test::task::spawn(registry.subscribe(Some(SessionEventKind::Closed)));

    registry.create(CreateSessionRequest::local("filtered")).await.unwrap();
    tokio_test::assert_pending!(closes.poll_next());

    registry.close("filtered").await;
    assert!(closes.is_woken());
    let event = tokio_test::assert_ready!(closes.poll_next()).unwrap();
    assert_eq!(event.kind(), SessionEventKind::Closed);
}

/// Interpreter that answers the readiness probe and exits right after
#[cfg(unix)]
fn short_lived_interpreter(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("short-lived.sh");
    std::fs::write(
        &path,
        "#!/bin/bash\nIFS= read -r line\neval \"$line\"\nsleep 0.1\nexit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_interpreter_exiting_after_startup_is_never_left_listed() {
    init_logger();
    let scratch = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::new(
        ManagerOptions::builder()
            .shell_program(short_lived_interpreter(scratch.path()))
            .init_timeout(Duration::from_secs(10))
            .probe_interval(Duration::from_millis(500))
            .build(),
    );
    let mut disconnects = Box::pin(registry.subscribe(Some(SessionEventKind::Disconnected)));

    registry.create(CreateSessionRequest::local("brief")).await.unwrap();

    let event = tokio::time::timeout(EVENT_WAIT, disconnects.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.name(), "brief");

    let deadline = Instant::now() + EVENT_WAIT;
    while !registry.list().await.is_empty() {
        assert!(Instant::now() < deadline, "dead session still listed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(matches!(
        registry.get("brief").await,
        Err(ShellError::SessionNotFound(_))
    ));
}
