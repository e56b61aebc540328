//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the tracking engine expects from the outside
//! world. They contain no transport details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP types in any signature; the transport lives behind `MlBackendPort`
//! - Observer and notifier ports are synchronous and must not block
//! - Every port is `Send + Sync` so it can be shared as `Arc<dyn Port>`

mod backend;
mod notifier;
mod observer;

pub use backend::{ArtifactContent, CreateModelVersionRequest, CreatedModelVersion, MlBackendPort};
pub use notifier::{NoopNotifier, NotifierPort};
pub use observer::{NoopObserver, TaskCallbacks, TaskObserver};
