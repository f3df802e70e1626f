//! Background task reacting to local interpreters that exit on their own

use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transport::ExitNotice;
use crate::types::session::{SessionEvent, SessionState};

use super::session_registry::RegistryInner;

/// Spawn the task removing sessions whose interpreter exited
///
/// An entry is only removed if it is still the incarnation that exited; a
/// late notice for a name that was closed and created again is ignored. The
/// task ends when every reporter is gone or the registry was dropped.
pub(super) fn spawn_exit_watcher(
    inner: Weak<RegistryInner>,
    mut exit_rx: mpsc::UnboundedReceiver<ExitNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = exit_rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };

            let removed = {
                let mut directory = inner.directory.lock().await;
                match directory.live.get(&notice.name) {
                    Some(slot) if slot.instance == notice.instance => {
                        directory.live.remove(&notice.name)
                    }
                    _ => None,
                }
            };

            match removed {
                Some(slot) => {
                    slot.set_state(SessionState::Disconnected);
                    log::info!("[{}] session disconnected", notice.name);
                    inner.events.publish(SessionEvent::SessionDisconnected { name: notice.name });
                }
                None => {
                    log::debug!("[{}] exit notice for a session no longer tracked", notice.name);
                }
            }
        }
    })
}
