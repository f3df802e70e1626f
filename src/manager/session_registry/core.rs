//! Core session registry structure and lifecycle management

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Result, ShellError};
use crate::transport::ExitNotice;
use crate::types::options::ManagerOptions;

use super::super::background::spawn_exit_watcher;
use super::super::events::EventBus;
use super::super::session::SessionSlot;

// ============================================================================
// SHARED STATE
// ============================================================================

/// Live sessions plus names reserved by creations in progress
#[derive(Default)]
pub(crate) struct Directory {
    pub live: HashMap<String, Arc<SessionSlot>>,
    pub pending: HashSet<String>,
}

pub(crate) struct RegistryInner {
    pub directory: Mutex<Directory>,
    pub events: EventBus,
    pub config: Arc<ManagerOptions>,
    pub exit_tx: mpsc::UnboundedSender<ExitNotice>,
}

impl RegistryInner {
    pub(crate) async fn lookup(&self, name: &str) -> Result<Arc<SessionSlot>> {
        self.directory
            .lock()
            .await
            .live
            .get(name)
            .cloned()
            .ok_or_else(|| ShellError::SessionNotFound(name.to_string()))
    }
}

// ============================================================================
// SESSION REGISTRY CORE
// ============================================================================

/// Name-keyed directory of live shell sessions
///
/// The `SessionRegistry` coordinates local and remote sessions, handling:
/// - Creation with at most one live session per name
/// - Routing of `execute` with one command in flight per session
/// - Removal of sessions whose interpreter exited
/// - Lifecycle notifications for subscribers
pub struct SessionRegistry {
    pub(super) inner: Arc<RegistryInner>,
    watcher_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SessionRegistry {
    /// Create an empty registry with its exit watcher task
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(config: ManagerOptions) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    pub(crate) fn with_shared_config(config: Arc<ManagerOptions>) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RegistryInner {
            directory: Mutex::new(Directory::default()),
            events: EventBus::new(config.event_capacity),
            config,
            exit_tx,
        });

        let watcher_handle = spawn_exit_watcher(Arc::downgrade(&inner), exit_rx);

        Self {
            inner,
            watcher_handle: Some(watcher_handle),
        }
    }

    /// Configuration this registry was created with
    #[must_use]
    pub fn config(&self) -> &ManagerOptions {
        &self.inner.config
    }

    /// Close every session before exit
    ///
    /// Alias for [`close_all`](Self::close_all) used by the shutdown hook.
    pub async fn shutdown(&self) {
        log::info!("Shutting down SessionRegistry...");
        let closed = self.close_all().await;
        log::info!("SessionRegistry shutdown complete ({closed} session(s) closed)");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher_handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}
