//! Rate limiting module.
//!
//! Fixed-window request counting against a shared counter store.

mod fixed_window;
mod memory;
mod policy;
mod store;

pub use fixed_window::{RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use memory::InMemoryCounterStore;
pub use policy::{RateLimitDecision, RateLimitPolicy, MAX_WINDOW_SECONDS};
pub use store::CounterStore;
