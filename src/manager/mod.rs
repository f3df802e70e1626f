//! Shell session management
//!
//! Provides `SessionRegistry` for creating, routing commands to, and closing
//! named local and remote shell sessions, with lifecycle notifications and
//! automatic removal of sessions whose interpreter exited.
//!
//! # Module Structure
//!
//! - `session_registry` - Core `SessionRegistry` with public API
//! - `session` - Live session entries and the runtime enum
//! - `events` - Lifecycle notification fan-out
//! - `background` - Exit watcher task

mod background;
mod events;
mod session;
mod session_registry;

pub use session::SessionRuntime;
pub use session_registry::SessionRegistry;
