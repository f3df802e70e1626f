//! Detached background jobs
//!
//! Provides `JobRegistry` for starting OS processes that outlive the calls
//! that created them, querying their liveness, reading and clearing their
//! captured output, and terminating them.
//!
//! # Module Structure
//!
//! - `registry` - Core `JobRegistry` with public API
//! - `process` - Spawning, signal-0 liveness and process-group kill
//! - `output` - Output target resolution and output file handling

mod output;
mod process;
mod registry;

pub use registry::JobRegistry;
