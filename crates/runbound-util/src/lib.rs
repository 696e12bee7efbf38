//! Shared utilities for runbound
//!
//! This crate provides:
//! - The error taxonomy shared by every layer (usage, launch, unanticipated)
//! - Duration helpers for structured log fields

mod error;
mod time;

pub use error::*;
pub use time::*;
