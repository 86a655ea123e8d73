//! Typed per-node configuration.
//!
//! The editor stores a free-form `config` object on every node. On load it is
//! parsed into the struct matching the node's type, so unknown operators or
//! action kinds are rejected before a run starts. Missing values are left to
//! [`NodeConfig::validate`], which the traversal engine checks per edge.

use std::fmt;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::graph::NodeType;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Trigger(TriggerConfig),
    Action(ActionConfig),
    Filter(FilterConfig),
    DataSource(DataSourceConfig),
    DataModifier(DataModifierConfig),
    MultiBranch(MultiBranchConfig),
    Delay(DelayConfig),
    Validation(ValidationConfig),
    Passthrough,
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Trigger(_) => NodeType::Trigger,
            Self::Action(_) => NodeType::Action,
            Self::Filter(_) => NodeType::Filter,
            Self::DataSource(_) => NodeType::DataSource,
            Self::DataModifier(_) => NodeType::DataModifier,
            Self::MultiBranch(_) => NodeType::MultiBranch,
            Self::Delay(_) => NodeType::Delay,
            Self::Validation(_) => NodeType::Validation,
            Self::Passthrough => NodeType::Passthrough,
        }
    }

    /// Parse the raw editor config for a node of the given type.
    pub fn from_value(node_type: NodeType, config: Value) -> Result<Self, String> {
        let config = match config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let parsed = match node_type {
            NodeType::Trigger => parse(config).map(Self::Trigger),
            NodeType::Action => parse(config).map(Self::Action),
            NodeType::Filter => parse(config).map(Self::Filter),
            NodeType::DataSource => parse(config).map(Self::DataSource),
            NodeType::DataModifier => parse(config).map(Self::DataModifier),
            NodeType::MultiBranch => parse(config).map(Self::MultiBranch),
            NodeType::Delay => parse(config).map(Self::Delay),
            NodeType::Validation => parse(config).map(Self::Validation),
            NodeType::Passthrough => Ok(Self::Passthrough),
        };
        parsed.map_err(|e| format!("invalid {} config: {}", node_type, e))
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            Self::Trigger(c) => serde_json::to_value(c),
            Self::Action(c) => serde_json::to_value(c),
            Self::Filter(c) => serde_json::to_value(c),
            Self::DataSource(c) => serde_json::to_value(c),
            Self::DataModifier(c) => serde_json::to_value(c),
            Self::MultiBranch(c) => serde_json::to_value(c),
            Self::Delay(c) => serde_json::to_value(c),
            Self::Validation(c) => serde_json::to_value(c),
            Self::Passthrough => Ok(Value::Object(Map::new())),
        };
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Required-field checks. Returns one message per problem; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            Self::Trigger(c) => match c.trigger_type() {
                TriggerType::Webhook if is_blank(&c.webhook_path) => {
                    problems.push("webhook trigger requires 'webhookPath'".to_string())
                }
                TriggerType::Schedule if is_blank(&c.schedule) => {
                    problems.push("schedule trigger requires 'schedule'".to_string())
                }
                _ => {}
            },
            Self::Action(c) => match c.action_type {
                Some(ActionType::Email) => {
                    require(&mut problems, &c.to, "to");
                    require(&mut problems, &c.subject, "subject");
                }
                Some(ActionType::ApiCall) => require(&mut problems, &c.url, "url"),
                Some(ActionType::Database) => require(&mut problems, &c.query, "query"),
                Some(ActionType::FileStorage) => {
                    let op = c.operation.unwrap_or_default();
                    if op != StorageOperation::List {
                        require(&mut problems, &c.path, "path");
                    }
                    if op == StorageOperation::Upload {
                        require(&mut problems, &c.content, "content");
                    }
                }
                None => {}
            },
            Self::Filter(c) => {
                if c.field.trim().is_empty() {
                    problems.push("missing required field 'field'".to_string());
                }
                if c.operator.is_none() {
                    problems.push("missing required field 'operator'".to_string());
                }
            }
            Self::DataSource(c) => match c.source_type {
                Some(SourceType::Database) => require(&mut problems, &c.query, "query"),
                Some(SourceType::Api) => require(&mut problems, &c.url, "url"),
                Some(SourceType::Static) | None => {}
            },
            Self::DataModifier(c) => {
                if c.input.is_none() {
                    problems.push("missing required field 'input'".to_string());
                }
                match c.operation_type {
                    None => problems.push("missing required field 'operationType'".to_string()),
                    Some(ModifierOperation::Sort) => {
                        require(&mut problems, &c.sort_field, "sortField")
                    }
                    Some(ModifierOperation::Aggregate) => {
                        if c.aggregate_function.is_none() {
                            problems.push("missing required field 'aggregateFunction'".to_string());
                        }
                        if c.aggregate_function != Some(AggregateFunction::Count) {
                            require(&mut problems, &c.aggregate_field, "aggregateField");
                        }
                    }
                    Some(ModifierOperation::Format) => {
                        require(&mut problems, &c.format_template, "formatTemplate")
                    }
                    Some(ModifierOperation::Transform) | Some(ModifierOperation::Filter) => {}
                }
            }
            Self::MultiBranch(c) => {
                if c.field.trim().is_empty() {
                    problems.push("missing required field 'field'".to_string());
                }
                if c.branches.is_empty() {
                    problems.push("at least one branch is required".to_string());
                }
                for (i, branch) in c.branches.iter().enumerate() {
                    if branch.name.trim().is_empty() {
                        problems.push(format!("branch {} has no name", i + 1));
                    }
                }
            }
            Self::Validation(c) => {
                if c.rules.is_empty() {
                    problems.push("at least one rule is required".to_string());
                }
            }
            Self::Delay(_) | Self::Passthrough => {}
        }
        problems
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn require(problems: &mut Vec<String>, value: &Option<String>, field: &str) {
    if is_blank(value) {
        problems.push(format!("missing required field '{}'", field));
    }
}

// ── Trigger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Schedule,
    Webhook,
    Event,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::Event => "event",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub trigger_type: Option<TriggerType>,
    /// Cron-style expression; informational in a simulated run.
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub webhook_path: Option<String>,
    /// Replaces the synthetic event payload when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_payload: Option<Map<String, Value>>,
}

impl TriggerConfig {
    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type.unwrap_or_default()
    }
}

// ── Action ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Email,
    ApiCall,
    Database,
    FileStorage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOperation {
    #[default]
    Upload,
    Download,
    List,
    Delete,
}

impl StorageOperation {
    /// Operation name understood by the storage service.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::Upload => "uploadFile",
            Self::Download => "downloadFile",
            Self::List => "listFiles",
            Self::Delete => "deleteFile",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub action_type: Option<ActionType>,
    // email
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Email body, or request body for API calls.
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    // api_call
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Either a JSON object or a (templated) JSON string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    // database
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    // file_storage
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub operation: Option<StorageOperation>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Provider selection and credentials, merged into the integration params.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_config: Map<String, Value>,
}

// ── Filter ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Regex,
    IsEmpty,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::In => "in",
            Self::Regex => "regex",
            Self::IsEmpty => "is_empty",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(default, deserialize_with = "stringish")]
    pub field: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub operator: Option<FilterOperator>,
    #[serde(default, deserialize_with = "stringish")]
    pub value: String,
}

// ── Data source ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Database,
    Api,
    Static,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub source_type: Option<SourceType>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// Payload returned by `static` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub output_var: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_config: Map<String, Value>,
}

impl DataSourceConfig {
    pub fn output_var(&self) -> &str {
        non_blank(&self.output_var).unwrap_or("data")
    }
}

// ── Data modifier ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierOperation {
    Transform,
    Filter,
    Sort,
    Aggregate,
    Format,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModifierConfig {
    /// Templated string (JSON-decoded when it looks like JSON) or inline JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub operation_type: Option<ModifierOperation>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub filter_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<Value>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub aggregate_field: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<AggregateFunction>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub format_template: Option<String>,
}

impl DataModifierConfig {
    pub fn output(&self) -> &str {
        non_blank(&self.output).unwrap_or("result")
    }

    pub fn filter_field(&self) -> &str {
        non_blank(&self.filter_field).unwrap_or("status")
    }

    pub fn filter_value(&self) -> Value {
        self.filter_value
            .clone()
            .unwrap_or_else(|| Value::String("active".into()))
    }
}

// ── Multi-branch ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCase {
    #[serde(default, deserialize_with = "stringish")]
    pub name: String,
    pub operator: FilterOperator,
    #[serde(default, deserialize_with = "stringish")]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiBranchConfig {
    #[serde(default, deserialize_with = "stringish")]
    pub field: String,
    #[serde(default)]
    pub branches: Vec<BranchCase>,
    #[serde(default, deserialize_with = "stringish_opt", skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl MultiBranchConfig {
    pub fn default_branch(&self) -> &str {
        non_blank(&self.default_branch).unwrap_or("default")
    }
}

// ── Delay ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    #[serde(default)]
    pub duration_ms: u64,
}

// ── Validation ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    Required,
    Email,
    Numeric,
    Regex { pattern: String },
    MinLength { length: usize },
    MaxLength { length: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    #[serde(default, deserialize_with = "stringish")]
    pub value: String,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

// ── Serde helpers ───────────────────────────────────────────────

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Scalar to string; the editor stores numbers and booleans unquoted.
fn scalar_to_string<E: de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(E::custom(format!("expected a string, found {}", other))),
    }
}

fn stringish<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value)?.unwrap_or_default())
}

fn stringish_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(value)
}

/// `null` and `""` both mean "not configured".
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(de::Error::custom),
    }
}
