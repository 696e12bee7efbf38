//! Host adapter trait interfaces for runbound
//!
//! This crate defines the seam between the supervisor core and
//! platform-specific process creation. It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
