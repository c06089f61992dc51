//! Configuration module for the admission gate.
//!
//! Handles loading and validating gate configuration from TOML files.

mod settings;

pub use settings::*;
