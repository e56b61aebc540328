//! Notification port.
//!
//! Lets coordinators surface success/failure notices without coupling to
//! the UI toolkit that renders them.

use crate::notification::Notification;

/// Port for delivering user-visible notifications.
///
/// Implementations should hand the notification off (channel, toast queue)
/// and return immediately.
pub trait NotifierPort: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Discards every notification. Suitable for headless callers and tests
/// that only inspect returned outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NotifierPort for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{ModelVersionId, ModelVersionRef};
    use crate::notification::Operation;

    #[test]
    fn noop_notifier_accepts_notifications() {
        let notifier: Arc<dyn NotifierPort> = Arc::new(NoopNotifier::new());
        notifier.notify(Notification::success(
            Operation::Deploy,
            ModelVersionRef::from_id(ModelVersionId::new("mv-1")),
        ));
    }
}
