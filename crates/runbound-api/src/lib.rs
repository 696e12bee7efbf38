//! Shared types for runbound
//!
//! This crate defines the values passed between the command line front end,
//! the supervisor core and the host adapters:
//! - Invocation parsing and the immutable launch specification
//! - The opaque credential handle
//! - Exit status, supervisor state and run outcome

mod credential;
mod launch;
mod types;

pub use credential::*;
pub use launch::*;
pub use types::*;
