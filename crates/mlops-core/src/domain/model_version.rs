//! Model version domain types and lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::UploadError;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Backend identifier of a model version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersionId(String);

impl ModelVersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is blank (no model version selected).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ModelVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelVersionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModelVersionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a model version.
///
/// ```text
/// REGISTERING ──► REGISTERED | REGISTER_FAILED
/// REGISTERED | UNDEPLOYED | DEPLOY_FAILED ──► DEPLOYING
/// DEPLOYING ──► DEPLOYED | PARTIALLY_DEPLOYED | DEPLOY_FAILED
/// DEPLOYED | PARTIALLY_DEPLOYED ──► UNDEPLOYED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelVersionState {
    Registering,
    Registered,
    RegisterFailed,
    Deploying,
    Deployed,
    PartiallyDeployed,
    DeployFailed,
    Undeployed,
}

impl ModelVersionState {
    /// States from which a deploy may be started.
    pub const DEPLOYABLE: [Self; 3] = [Self::Registered, Self::Undeployed, Self::DeployFailed];

    /// States from which an undeploy may be started.
    pub const UNDEPLOYABLE: [Self; 2] = [Self::Deployed, Self::PartiallyDeployed];

    /// Transient states: the backend is working and no action is permitted.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Registering | Self::Deploying)
    }

    #[must_use]
    pub const fn can_deploy(self) -> bool {
        matches!(self, Self::Registered | Self::Undeployed | Self::DeployFailed)
    }

    #[must_use]
    pub const fn can_undeploy(self) -> bool {
        matches!(self, Self::Deployed | Self::PartiallyDeployed)
    }

    /// Delete is forbidden while the version is serving or in flight.
    #[must_use]
    pub const fn can_delete(self) -> bool {
        !matches!(
            self,
            Self::Deployed | Self::PartiallyDeployed | Self::Deploying | Self::Registering
        )
    }

    /// Edits follow the same rule as delete.
    #[must_use]
    pub const fn can_edit(self) -> bool {
        self.can_delete()
    }

    /// Whether `self -> to` is an edge of the lifecycle state machine.
    #[must_use]
    pub const fn transition_allowed(self, to: Self) -> bool {
        match self {
            Self::Registering => matches!(to, Self::Registered | Self::RegisterFailed),
            Self::Registered | Self::Undeployed | Self::DeployFailed => {
                matches!(to, Self::Deploying)
            }
            Self::Deploying => matches!(
                to,
                Self::Deployed | Self::PartiallyDeployed | Self::DeployFailed
            ),
            Self::Deployed | Self::PartiallyDeployed => matches!(to, Self::Undeployed),
            Self::RegisterFailed => false,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registering => "REGISTERING",
            Self::Registered => "REGISTERED",
            Self::RegisterFailed => "REGISTER_FAILED",
            Self::Deploying => "DEPLOYING",
            Self::Deployed => "DEPLOYED",
            Self::PartiallyDeployed => "PARTIALLY_DEPLOYED",
            Self::DeployFailed => "DEPLOY_FAILED",
            Self::Undeployed => "UNDEPLOYED",
        }
    }
}

impl fmt::Display for ModelVersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVersionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REGISTERING" => Ok(Self::Registering),
            "REGISTERED" => Ok(Self::Registered),
            "REGISTER_FAILED" => Ok(Self::RegisterFailed),
            "DEPLOYING" => Ok(Self::Deploying),
            "DEPLOYED" => Ok(Self::Deployed),
            "PARTIALLY_DEPLOYED" => Ok(Self::PartiallyDeployed),
            "DEPLOY_FAILED" => Ok(Self::DeployFailed),
            "UNDEPLOYED" => Ok(Self::Undeployed),
            other => Err(format!("unknown model version state: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model version snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of a model version as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: ModelVersionId,
    pub name: String,
    pub version: String,
    pub state: ModelVersionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelVersion {
    pub fn new(
        id: impl Into<ModelVersionId>,
        name: impl Into<String>,
        version: impl Into<String>,
        state: ModelVersionState,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            state,
            description: None,
        }
    }

    /// Named reference used in user-facing messages.
    #[must_use]
    pub fn reference(&self) -> ModelVersionRef {
        ModelVersionRef {
            id: self.id.clone(),
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
        }
    }
}

/// Reference to a model version for notifications.
///
/// Carries the display name and version when a snapshot was available,
/// otherwise falls back to the raw id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersionRef {
    pub id: ModelVersionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModelVersionRef {
    /// Reference known only by id.
    #[must_use]
    pub const fn from_id(id: ModelVersionId) -> Self {
        Self {
            id,
            name: None,
            version: None,
        }
    }

    /// Reference built from upload metadata before the backend assigned an id.
    #[must_use]
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            id: ModelVersionId::new(""),
            name: Some(metadata.name.clone()),
            version: Some(metadata.version.clone()),
        }
    }

    /// Replace the id once the backend allocates one.
    #[must_use]
    pub fn with_id(mut self, id: ModelVersionId) -> Self {
        self.id = id;
        self
    }
}

impl fmt::Display for ModelVersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.version) {
            (Some(name), Some(version)) => write!(f, "{name} version {version}"),
            (Some(name), None) => f.write_str(name),
            _ => write!(f, "model version {}", self.id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Serialization format of a model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelFormat {
    #[default]
    TorchScript,
    Onnx,
}

/// Metadata supplied when registering a new model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub model_format: ModelFormat,
    /// Free-form model configuration (embedding dimension, framework, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<serde_json::Value>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            model_format: ModelFormat::default(),
            model_config: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: ModelFormat) -> Self {
        self.model_format = format;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.model_config = Some(config);
        self
    }

    /// Reject metadata the backend would refuse before any request is made.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.name.trim().is_empty() {
            return Err(UploadError::invalid_metadata("name", "must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(UploadError::invalid_metadata("version", "must not be empty"));
        }
        Ok(())
    }
}
