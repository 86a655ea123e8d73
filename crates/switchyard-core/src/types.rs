use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SwitchyardError;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The external services an integration request can target.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Api,
    Email,
    Database,
    Storage,
    Webhook,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Api,
        ServiceKind::Email,
        ServiceKind::Database,
        ServiceKind::Storage,
        ServiceKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Email => "email",
            Self::Database => "database",
            Self::Storage => "storage",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" | "http" => Ok(Self::Api),
            "email" => Ok(Self::Email),
            "database" | "db" => Ok(Self::Database),
            "storage" | "file_storage" | "filestorage" => Ok(Self::Storage),
            "webhook" | "webhooks" => Ok(Self::Webhook),
            _ => Err(SwitchyardError::ServiceNotFound(s.to_string())),
        }
    }
}

/// Outcome marker carried by every integration envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// A request routed through the integration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRequest {
    pub service: ServiceKind,
    pub operation: String,
    #[serde(default)]
    pub params: Value,
}

/// Provider name used by every simulated provider.
pub const MOCK_PROVIDER: &str = "mock";

/// Normalized envelope returned by every integration operation:
/// `{ "status": ..., "provider": ..., ...provider-specific fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub status: ResultStatus,
    pub provider: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IntegrationResult {
    pub fn success(provider: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            provider: provider.into(),
            fields: Map::new(),
        }
    }

    pub fn mock() -> Self {
        Self::success(MOCK_PROVIDER)
    }

    /// Add a provider-specific field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Whether this result was fabricated by a simulated provider.
    pub fn is_mock(&self) -> bool {
        self.provider == MOCK_PROVIDER
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(
            "status".into(),
            Value::String(match self.status {
                ResultStatus::Success => "success".into(),
                ResultStatus::Error => "error".into(),
            }),
        );
        map.insert("provider".into(), Value::String(self.provider));
        map.extend(self.fields);
        Value::Object(map)
    }
}

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Workflow run started.
    RunStarted { run_id: RunId, node_count: usize },
    /// A node is about to execute.
    NodeStarted { node_id: String, label: String },
    /// A node finished and its result was merged into the context.
    NodeCompleted {
        node_id: String,
        status: ResultStatus,
        elapsed_ms: u64,
    },
    /// A node failed; its branch was pruned.
    NodeFailed { node_id: String, error: String },
    /// A gate node stopped traversal into its successors.
    BranchStopped { node_id: String, reason: String },
    /// A webhook delivery was accepted.
    WebhookReceived { webhook_id: String, path: String },
    /// Workflow run finished.
    RunCompleted {
        run_id: RunId,
        failed: bool,
        error_count: usize,
        finished_at: DateTime<Utc>,
    },
}
