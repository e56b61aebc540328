//! Bounded, cancellable polling.
//!
//! Converts "call a status check every `gap` until it says stop" into a
//! single awaitable session with explicit termination reasons.

mod scheduler;

pub use scheduler::{PollHandle, PollOutcome, PollingScheduler};
