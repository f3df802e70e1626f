//! Local session runtime backed by one long-lived interpreter subprocess
//!
//! The interpreter reads framed commands from stdin; one reader task per
//! output stream feeds the shared [`Framer`](super::framing::Framer), which
//! hands each completed capture to the waiting `execute` call.

mod lifecycle;
mod reader;
mod session;

use tokio::sync::mpsc;

use crate::types::identifiers::InstanceId;

// Re-export public types
pub use session::LocalSession;

/// Notice that a local interpreter exited without being asked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
    /// Session name
    pub name: String,
    /// Session incarnation that exited
    pub instance: InstanceId,
}

/// Channel the stdout reader reports an unexpected exit on
#[derive(Debug, Clone)]
pub struct ExitReporter {
    notice: ExitNotice,
    tx: mpsc::UnboundedSender<ExitNotice>,
}

impl ExitReporter {
    /// Reporter sending `ExitNotice { name, instance }` on `tx`
    pub fn new(
        name: impl Into<String>,
        instance: InstanceId,
        tx: mpsc::UnboundedSender<ExitNotice>,
    ) -> Self {
        Self {
            notice: ExitNotice {
                name: name.into(),
                instance,
            },
            tx,
        }
    }

    fn report(&self) {
        // Receiver gone means the registry is gone; nothing left to notify
        let _ = self.tx.send(self.notice.clone());
    }
}
