//! Session registry implementation
//!
//! This module is organized into logical submodules:
//! - `core`: Core struct, constructors, and shutdown
//! - `create`: Session creation with atomic name reservation
//! - `execute`: Per-session serialized command routing
//! - `close`: Closing one or all sessions
//! - `list`: Snapshots and notification subscriptions

mod close;
mod core;
mod create;
mod execute;
mod list;

pub use self::core::SessionRegistry;
pub(super) use self::core::RegistryInner;
