//! Supervisor core for runbound
//!
//! This crate contains everything between a launched child and process exit:
//! - Stream pumps forwarding child stdout/stderr to the console
//! - The input relay forwarding console lines to the child's stdin
//! - The timeout state machine (Running -> ExitedNaturally | TimedOut -> ShutdownComplete)
//! - The per-run context that owns the child and its tasks

mod console;
mod pump;
mod relay;
mod run;
mod supervisor;

pub use console::*;
pub use pump::*;
pub use relay::*;
pub use run::*;
pub use supervisor::*;
