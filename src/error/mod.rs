//! Error types for the admission gate.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
