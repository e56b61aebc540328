//! Scripted collaborators for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates:
//!
//! ```toml
//! [dev-dependencies]
//! mlops-core = { workspace = true, features = ["test-utils"] }
//! ```

mod backend;
mod recorders;

pub use backend::{BackendCall, ScriptedBackend};
pub use recorders::{ObservedEvent, RecordingNotifier, RecordingObserver};
