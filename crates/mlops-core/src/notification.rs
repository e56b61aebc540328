//! User-visible notifications.
//!
//! Every success or failure notice names the model version it concerns.
//! Failures may carry a [`DetailAction`] that the UI resolves only when the
//! user asks to see the full error.
//!
//! # Wire Format
//!
//! ```json
//! { "id": "…", "kind": "failure", "operation": "deploy",
//!   "title": "Failed to deploy bert version 2",
//!   "subject": { "id": "mv-1", "name": "bert", "version": "2" },
//!   "detail": { "type": "task_error", "task_id": "t-9" },
//!   "created_at": "2024-05-01T12:00:00Z" }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ModelVersionRef, TaskId};

/// Lifecycle operation a notification or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Undeploy,
    Delete,
    Upload,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Undeploy => "undeploy",
            Self::Delete => "delete",
            Self::Upload => "upload",
        }
    }

    #[must_use]
    pub const fn past_participle(self) -> &'static str {
        match self {
            Self::Deploy => "deployed",
            Self::Undeploy => "undeployed",
            Self::Delete => "deleted",
            Self::Upload => "uploaded",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Failure,
}

/// Deferred "see full error" action attached to a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetailAction {
    /// Re-fetch the task and show its `error` field.
    TaskError { task_id: TaskId },
    /// Show text that was captured when the failure happened.
    Raw { message: String },
}

/// A user-visible success or failure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub operation: Operation,
    pub title: String,
    pub subject: ModelVersionRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn build(
        kind: NotificationKind,
        operation: Operation,
        subject: ModelVersionRef,
        title: String,
        detail: Option<DetailAction>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            operation,
            title,
            subject,
            detail,
            created_at: Utc::now(),
        }
    }

    /// "`<model>` was deployed" style success notice.
    #[must_use]
    pub fn success(operation: Operation, subject: ModelVersionRef) -> Self {
        let title = format!("{subject} was {}", operation.past_participle());
        Self::build(NotificationKind::Success, operation, subject, title, None)
    }

    /// Failure notice with a custom reason.
    #[must_use]
    pub fn failure(
        operation: Operation,
        subject: ModelVersionRef,
        reason: impl fmt::Display,
        detail: Option<DetailAction>,
    ) -> Self {
        let title = format!("Failed to {operation} {subject}: {reason}");
        Self::build(NotificationKind::Failure, operation, subject, title, detail)
    }

    /// Generic transport failure: no detail view is available.
    #[must_use]
    pub fn network_error(operation: Operation, subject: ModelVersionRef) -> Self {
        Self::failure(operation, subject, "network error", None)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.kind, NotificationKind::Failure)
    }
}
