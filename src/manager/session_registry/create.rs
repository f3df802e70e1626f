//! Session creation
//!
//! The name is reserved before any subprocess is started, so two concurrent
//! creations of one name cannot both succeed, and released on every exit path
//! so a failed creation leaves no partial entry behind.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{Result, ShellError};
use crate::transport::{ExitReporter, LocalSession, RemoteSession};
use crate::types::identifiers::InstanceId;
use crate::types::session::{
    CreateSessionRequest, LOCALHOST, Locality, SessionEvent, SessionInfo, SessionState,
};

use super::super::session::{SessionRuntime, SessionSlot};
use super::core::{RegistryInner, SessionRegistry};

/// Pending name reservation; released in the background if the creating
/// future is dropped before finishing
struct Reservation {
    inner: Arc<RegistryInner>,
    name: String,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let name = std::mem::take(&mut self.name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                inner.directory.lock().await.pending.remove(&name);
            });
        }
    }
}

impl SessionRegistry {
    /// Create a local or remote session
    ///
    /// A request with `remote` options records a remote session, which is
    /// connected immediately. Otherwise a local interpreter is started and
    /// must answer its readiness probe first. An interpreter that exits
    /// between the probe and registration yields a `Disconnected` record
    /// that is never listed.
    ///
    /// # Errors
    /// - `DuplicateSession` if the name is live or being created
    /// - `SessionStartFailure` / `SessionInitTimeout` from the local runtime
    pub async fn create(&self, request: CreateSessionRequest) -> Result<SessionInfo> {
        let name = request.name.clone();
        let mut reservation = self.reserve(&name).await?;

        let instance = InstanceId::generate();
        let started = self.start_runtime(&request, instance).await;

        let mut directory = self.inner.directory.lock().await;
        directory.pending.remove(&name);
        reservation.armed = false;

        let runtime = match started {
            Ok(runtime) => runtime,
            Err(e) => {
                drop(directory);
                log::warn!("[{name}] session creation failed: {e}");
                self.inner.events.publish(SessionEvent::SessionError {
                    name,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let now = Utc::now();
        let (locality, host) = match request.remote {
            Some(ref remote) => (Locality::Remote, remote.host.clone()),
            None => (Locality::Local, LOCALHOST.to_string()),
        };
        let info = SessionInfo {
            name: name.clone(),
            locality,
            host,
            state: SessionState::Connected,
            created_at: now,
            last_used_at: now,
            remote: request.remote,
        };

        // An interpreter that died before the entry existed had its exit
        // notice ignored by the watcher; the stdout reader flags the runtime
        // before that notice is sent, so checking under the lock is enough.
        if runtime.state() != SessionState::Connected {
            drop(directory);
            drop(runtime);
            log::warn!("[{name}] interpreter exited right after startup");
            self.inner.events.publish(SessionEvent::SessionCreated {
                name: name.clone(),
                locality,
            });
            self.inner
                .events
                .publish(SessionEvent::SessionDisconnected { name });
            return Ok(SessionInfo {
                state: SessionState::Disconnected,
                ..info
            });
        }

        directory.live.insert(
            name.clone(),
            Arc::new(SessionSlot::new(instance, info.clone(), runtime)),
        );
        drop(directory);

        log::info!("[{name}] {locality:?} session created on {}", info.host);
        self.inner
            .events
            .publish(SessionEvent::SessionCreated { name, locality });
        Ok(info)
    }

    async fn reserve(&self, name: &str) -> Result<Reservation> {
        let mut directory = self.inner.directory.lock().await;
        if directory.live.contains_key(name) || !directory.pending.insert(name.to_string()) {
            return Err(ShellError::DuplicateSession(name.to_string()));
        }
        Ok(Reservation {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            armed: true,
        })
    }

    async fn start_runtime(
        &self,
        request: &CreateSessionRequest,
        instance: InstanceId,
    ) -> Result<SessionRuntime> {
        let config = &self.inner.config;

        if let Some(ref remote) = request.remote {
            let session = RemoteSession::new(
                &request.name,
                config.dialect,
                remote.clone(),
                request.working_dir.clone(),
                Arc::clone(config),
            );
            return Ok(SessionRuntime::Remote(session));
        }

        let exit = ExitReporter::new(&request.name, instance, self.inner.exit_tx.clone());
        let session = LocalSession::connect(
            &request.name,
            config.dialect,
            config,
            request.working_dir.as_deref(),
            Some(exit),
        )
        .await?;
        Ok(SessionRuntime::Local(session))
    }
}
