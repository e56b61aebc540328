//! Polling and task observation for mlops.
//!
//! Long-running backend work (deploys, uploads by URL) is represented by a
//! task that can only be observed by fetching it again. This crate owns the
//! two pieces that turn repeated fetches into something callers can await
//! or subscribe to.
//!
//! # Structure
//!
//! - `polling` - [`PollingScheduler`], a bounded and cancellable retry loop
//! - `registry` - [`TaskObservationRegistry`], one poll per task id shared by
//!   every caller that asks about it

#![deny(unused_crate_dependencies)]

mod polling;
mod registry;

pub use polling::{PollHandle, PollOutcome, PollingScheduler};
pub use registry::{QueryOutcome, TaskObservationRegistry};

#[cfg(test)]
use anyhow as _;
#[cfg(test)]
use tracing_subscriber as _;
