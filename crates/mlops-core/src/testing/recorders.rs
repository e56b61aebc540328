//! Collaborators that record what they receive.

use std::sync::{Mutex, PoisonError};

use crate::domain::Task;
use crate::errors::TaskError;
use crate::notification::Notification;
use crate::ports::{NotifierPort, TaskObserver};

/// Notifier that keeps every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Notification> {
        self.notifications().pop()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl NotifierPort for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// One callback received by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Update(Task),
    Complete(Task),
    Error(TaskError),
}

/// Observer that keeps every callback in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn updates(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Update(_)))
    }

    #[must_use]
    pub fn completions(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Complete(_)))
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Error(_)))
    }

    fn count(&self, pred: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl TaskObserver for RecordingObserver {
    fn on_update(&self, task: &Task) {
        self.push(ObservedEvent::Update(task.clone()));
    }

    fn on_complete(&self, task: &Task) {
        self.push(ObservedEvent::Complete(task.clone()));
    }

    fn on_error(&self, error: &TaskError) {
        self.push(ObservedEvent::Error(error.clone()));
    }
}
