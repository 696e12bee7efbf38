//! Linux host adapter for runbound
//!
//! Provides:
//! - Account resolution, password check and identity switch for the child
//! - Process spawning with process group isolation
//! - Forceful (SIGKILL) termination of the whole group
//! - Exit observation
//! - Piped stdin/stdout/stderr

mod adapter;
mod auth;
mod identity;
mod process;

pub use adapter::*;
pub use auth::*;
pub use identity::*;
pub use process::*;
