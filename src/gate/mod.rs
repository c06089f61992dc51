//! Admission gate.
//!
//! Composes the token verifier and the rate limiter into the check every
//! inbound request passes before reaching its handler.

mod admission;
mod rejection;
mod stores;

pub use admission::{Admission, AdmissionGate, AdmissionRequest, GateOptions};
pub use rejection::{ErrorBody, Rejection, RATE_LIMITED, SERVICE_UNAVAILABLE};
pub use stores::{GateStores, InMemoryStores};
