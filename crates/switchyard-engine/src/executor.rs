use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use switchyard_core::config::EngineConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::Node;
use switchyard_core::node_config::{
    ActionConfig, ActionType, DataModifierConfig, DataSourceConfig, DelayConfig, FilterConfig,
    MultiBranchConfig, NodeConfig, SourceType, TriggerConfig, ValidationConfig,
};
use switchyard_integrations::IntegrationRouter;

use crate::condition::{check_rule, evaluate};
use crate::context::ExecutionContext;
use crate::modifier;
use crate::resolver::{resolve, resolve_value};

/// Whether traversal continues past a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Follow every outgoing edge.
    Open,
    /// Stop here; the reason is logged.
    Closed(String),
    /// Follow only edges labelled with this branch.
    Branch(String),
}

#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub result: Value,
    pub gate: Gate,
}

impl NodeOutcome {
    fn open(result: Value) -> Self {
        Self {
            result,
            gate: Gate::Open,
        }
    }
}

/// Database params used when a node does not name a connection.
const SIMULATED_DATABASE: (&str, &str) = ("mock", "mock://switchyard");

/// Runs a single node against the current context.
pub struct NodeExecutor {
    router: Arc<IntegrationRouter>,
    max_delay_ms: u64,
}

impl NodeExecutor {
    pub fn new(router: Arc<IntegrationRouter>, config: &EngineConfig) -> Self {
        Self {
            router,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn router(&self) -> &Arc<IntegrationRouter> {
        &self.router
    }

    /// Execute `node`. Errors are node failures; the caller prunes the branch.
    pub async fn execute(&self, node: &Node, context: &ExecutionContext) -> Result<NodeOutcome> {
        let fail = |message: String| SwitchyardError::NodeExecution {
            node: node.display_name().to_string(),
            message,
        };

        match &node.config {
            NodeConfig::Trigger(cfg) => Ok(NodeOutcome::open(trigger_payload(cfg))),
            NodeConfig::Action(cfg) => Ok(NodeOutcome::open(self.action(node, cfg, context).await)),
            NodeConfig::Filter(cfg) => filter(cfg, context).map_err(fail),
            NodeConfig::DataSource(cfg) => self
                .data_source(cfg, context)
                .await
                .map(NodeOutcome::open)
                .map_err(|e| fail(e.to_string())),
            NodeConfig::DataModifier(cfg) => data_modifier(cfg, context).map_err(fail),
            NodeConfig::MultiBranch(cfg) => multi_branch(cfg, context).map_err(fail),
            NodeConfig::Delay(cfg) => Ok(NodeOutcome::open(self.delay(cfg).await)),
            NodeConfig::Validation(cfg) => validation(cfg, context).map_err(fail),
            NodeConfig::Passthrough => Ok(NodeOutcome::open(json!({
                "status": "success",
                "label": node.display_name(),
            }))),
        }
    }

    /// Router failures are captured in the result; actions never fail the node.
    async fn action(&self, node: &Node, cfg: &ActionConfig, context: &ExecutionContext) -> Value {
        let Some(action_type) = cfg.action_type else {
            return json!({
                "status": "success",
                "message": format!("Action '{}' executed", node.display_name()),
                "executedAt": Utc::now().to_rfc3339(),
            });
        };

        let mut params = provider_params(&cfg.provider_config, context);
        let text = |v: &Option<String>| v.as_deref().map(|s| resolve(s, context));
        let (service, operation, type_name) = match action_type {
            ActionType::Email => {
                put(&mut params, "to", text(&cfg.to));
                put(&mut params, "subject", text(&cfg.subject));
                put(&mut params, "body", text(&cfg.body));
                ("email", "sendEmail", "email")
            }
            ActionType::ApiCall => {
                put(&mut params, "url", text(&cfg.url));
                put(&mut params, "method", text(&cfg.method));
                if let Some(headers) = resolve_headers(cfg.headers.as_ref(), context) {
                    params.insert("headers".into(), headers);
                }
                if let Some(body) = text(&cfg.body) {
                    params.insert("body".into(), json_or_text(body));
                }
                params.insert("validateStatus".into(), Value::Bool(true));
                ("api", "makeRequest", "api_call")
            }
            ActionType::Database => {
                simulated_database_defaults(&mut params);
                put(&mut params, "query", text(&cfg.query));
                ("database", "executeQuery", "database")
            }
            ActionType::FileStorage => {
                put(&mut params, "path", text(&cfg.path));
                put(&mut params, "content", text(&cfg.content));
                let op = cfg.operation.unwrap_or_default().operation_name();
                ("storage", op, "file_storage")
            }
        };

        match self
            .router
            .execute(service, operation, &Value::Object(params))
            .await
        {
            Ok(result) => {
                let mut value = result.into_value();
                if let Value::Object(map) = &mut value {
                    map.insert("actionType".into(), json!(type_name));
                }
                value
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Action failed, continuing");
                json!({
                    "status": "error",
                    "actionType": type_name,
                    "error": e.to_string(),
                })
            }
        }
    }

    async fn data_source(&self, cfg: &DataSourceConfig, context: &ExecutionContext) -> Result<Value> {
        let text = |v: &Option<String>| v.as_deref().map(|s| resolve(s, context));
        let source = cfg.source_type.unwrap_or(SourceType::Static);
        let (payload, provider) = match source {
            SourceType::Database => {
                let mut params = provider_params(&cfg.provider_config, context);
                simulated_database_defaults(&mut params);
                put(&mut params, "query", text(&cfg.query));
                let result = self
                    .router
                    .execute("database", "executeQuery", &Value::Object(params))
                    .await?;
                let provider = result.provider.clone();
                let rows = result.get("rows").cloned();
                (rows.unwrap_or_else(|| result.into_value()), provider)
            }
            SourceType::Api => {
                let mut params = provider_params(&cfg.provider_config, context);
                put(&mut params, "url", text(&cfg.url));
                put(&mut params, "method", text(&cfg.method));
                if let Some(headers) = resolve_headers(cfg.headers.as_ref(), context) {
                    params.insert("headers".into(), headers);
                }
                params.insert("validateStatus".into(), Value::Bool(true));
                let result = self
                    .router
                    .execute("api", "makeRequest", &Value::Object(params))
                    .await?;
                let provider = result.provider.clone();
                (result.get("data").cloned().unwrap_or(Value::Null), provider)
            }
            SourceType::Static => {
                let data = match &cfg.data {
                    Some(data) => resolve_value(data, context),
                    None => placeholder_rows(),
                };
                (data, "static".to_string())
            }
        };

        let mut result = Map::new();
        result.insert("status".into(), json!("success"));
        result.insert("sourceType".into(), json!(source_name(source)));
        result.insert("provider".into(), json!(provider));
        result.insert("fetchedAt".into(), json!(Utc::now().to_rfc3339()));
        result.insert(cfg.output_var().to_string(), payload);
        Ok(Value::Object(result))
    }

    async fn delay(&self, cfg: &DelayConfig) -> Value {
        let delayed = cfg.duration_ms.min(self.max_delay_ms);
        if delayed < cfg.duration_ms {
            warn!(requested_ms = cfg.duration_ms, max_ms = self.max_delay_ms, "Delay capped");
        }
        if delayed > 0 {
            tokio::time::sleep(Duration::from_millis(delayed)).await;
        }
        json!({
            "status": "success",
            "delayedMs": delayed,
            "capped": delayed < cfg.duration_ms,
        })
    }
}

fn put(params: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        params.insert(key.to_string(), Value::String(v));
    }
}

fn provider_params(provider_config: &Map<String, Value>, context: &ExecutionContext) -> Map<String, Value> {
    match resolve_value(&Value::Object(provider_config.clone()), context) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn simulated_database_defaults(params: &mut Map<String, Value>) {
    let (kind, connection) = SIMULATED_DATABASE;
    params.entry("type").or_insert_with(|| json!(kind));
    params.entry("connection").or_insert_with(|| json!(connection));
}

/// Headers may be an object or a templated JSON string.
fn resolve_headers(headers: Option<&Value>, context: &ExecutionContext) -> Option<Value> {
    match headers? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(Value::String(resolve(s, context))),
        other => Some(resolve_value(other, context)),
    }
}

fn json_or_text(body: String) -> Value {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str(&body) {
            return v;
        }
    }
    Value::String(body)
}

fn source_name(source: SourceType) -> &'static str {
    match source {
        SourceType::Database => "database",
        SourceType::Api => "api",
        SourceType::Static => "static",
    }
}

fn placeholder_rows() -> Value {
    json!([
        {"id": 1, "name": "Sample item 1", "status": "active", "value": 100},
        {"id": 2, "name": "Sample item 2", "status": "inactive", "value": 250},
        {"id": 3, "name": "Sample item 3", "status": "active", "value": 75}
    ])
}

/// Synthetic event payload for a trigger, or the configured sample.
fn trigger_payload(cfg: &TriggerConfig) -> Value {
    let mut payload = Map::new();
    payload.insert("status".into(), json!("success"));
    payload.insert("triggerType".into(), json!(cfg.trigger_type().as_str()));
    payload.insert("triggeredAt".into(), json!(Utc::now().to_rfc3339()));
    if let Some(path) = &cfg.webhook_path {
        payload.insert("webhookPath".into(), json!(path));
    }
    if let Some(schedule) = &cfg.schedule {
        payload.insert("schedule".into(), json!(schedule));
    }

    match &cfg.sample_payload {
        Some(sample) => {
            payload.extend(sample.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        None => {
            payload.insert("orderId".into(), json!("ORD-1001"));
            payload.insert("customerId".into(), json!("CUST-042"));
            payload.insert("email".into(), json!("customer@example.com"));
            payload.insert("total".into(), json!(149.99));
            payload.insert(
                "items".into(),
                json!([
                    {"sku": "SKU-001", "name": "Widget", "quantity": 2, "price": 49.99, "status": "active"},
                    {"sku": "SKU-002", "name": "Gadget", "quantity": 1, "price": 50.01, "status": "backordered"}
                ]),
            );
        }
    }
    debug!(trigger_type = cfg.trigger_type().as_str(), "Trigger payload seeded");
    Value::Object(payload)
}

fn filter(cfg: &FilterConfig, context: &ExecutionContext) -> std::result::Result<NodeOutcome, String> {
    let operator = cfg
        .operator
        .ok_or_else(|| "missing required field 'operator'".to_string())?;
    let lhs = resolve(&cfg.field, context);
    let rhs = resolve(&cfg.value, context);
    let passed = evaluate(&lhs, operator, &rhs)?;
    let condition = format!("{} {} {}", lhs, operator, rhs);

    Ok(NodeOutcome {
        result: json!({
            "status": "success",
            "result": passed,
            "conditionPassed": passed,
            "condition": condition,
        }),
        gate: if passed {
            Gate::Open
        } else {
            Gate::Closed(format!("condition not met: {}", condition))
        },
    })
}

fn data_modifier(
    cfg: &DataModifierConfig,
    context: &ExecutionContext,
) -> std::result::Result<NodeOutcome, String> {
    let input = cfg
        .input
        .as_ref()
        .ok_or_else(|| "missing required field 'input'".to_string())?;
    let input = modifier::resolve_input(input, context);
    let output = modifier::apply(cfg, input, context)?;

    let mut result = Map::new();
    result.insert("status".into(), json!("success"));
    if let Some(op) = cfg.operation_type {
        result.insert("operationType".into(), serde_json::to_value(op).unwrap_or(Value::Null));
    }
    result.insert(cfg.output().to_string(), output);
    Ok(NodeOutcome::open(Value::Object(result)))
}

fn multi_branch(
    cfg: &MultiBranchConfig,
    context: &ExecutionContext,
) -> std::result::Result<NodeOutcome, String> {
    let value = resolve(&cfg.field, context);
    let mut selected = None;
    for branch in &cfg.branches {
        let rhs = resolve(&branch.value, context);
        if evaluate(&value, branch.operator, &rhs)? {
            selected = Some(branch.name.clone());
            break;
        }
    }
    let matched = selected.is_some();
    let branch = selected.unwrap_or_else(|| cfg.default_branch().to_string());

    Ok(NodeOutcome {
        result: json!({
            "status": "success",
            "branch": branch,
            "matched": matched,
            "value": value,
        }),
        gate: Gate::Branch(branch),
    })
}

fn validation(
    cfg: &ValidationConfig,
    context: &ExecutionContext,
) -> std::result::Result<NodeOutcome, String> {
    let value = resolve(&cfg.value, context);
    let mut violations = Vec::new();
    for rule in &cfg.rules {
        if let Some(violation) = check_rule(&value, rule)? {
            violations.push(violation);
        }
    }
    let valid = violations.is_empty();

    Ok(NodeOutcome {
        result: json!({
            "status": "success",
            "valid": valid,
            "violations": violations,
            "value": value,
        }),
        gate: if valid {
            Gate::Open
        } else {
            Gate::Closed("validation failed".into())
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::config::AppConfig;
    use switchyard_integrations::Simulator;
    use switchyard_test_utils::instant_config;

    fn executor() -> NodeExecutor {
        let config = instant_config();
        let router = IntegrationRouter::builder(&config)
            .simulator(Simulator::instant())
            .build()
            .unwrap();
        NodeExecutor::new(Arc::new(router), &config.engine)
    }

    fn node(node_type: &str, config: Value) -> Node {
        serde_json::from_value(json!({
            "id": "n",
            "type": node_type,
            "label": "Under test",
            "config": config,
        }))
        .unwrap()
    }

    fn order_context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set(
            "1",
            json!({
                "email": "ana@example.com",
                "total": 150,
                "tier": "gold",
                "rows": [{"id": 1, "status": "active"}, {"id": 2, "status": "inactive"}]
            }),
        );
        ctx
    }

    #[tokio::test]
    async fn test_trigger_default_payload() {
        let out = executor()
            .execute(&node("trigger", json!({})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.gate, Gate::Open);
        assert_eq!(out.result["triggerType"], "manual");
        assert!(out.result["items"].as_array().unwrap().iter().all(|i| i.get("status").is_some()));
        for key in ["triggeredAt", "orderId", "customerId", "email", "total"] {
            assert!(out.result.get(key).is_some(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_trigger_sample_payload_overrides() {
        let out = executor()
            .execute(
                &node("trigger", json!({"samplePayload": {"x": 150}})),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.result["x"], 150);
        assert!(out.result.get("orderId").is_none());
    }

    #[tokio::test]
    async fn test_filter_gates() {
        let ctx = order_context();
        let pass = executor()
            .execute(
                &node("filter", json!({"field": "{{1.total}}", "operator": "greater_than", "value": 100})),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(pass.gate, Gate::Open);
        assert_eq!(pass.result["conditionPassed"], true);
        assert_eq!(pass.result["condition"], "150 greater_than 100");

        let fail = executor()
            .execute(
                &node("filter", json!({"field": "{{1.total}}", "operator": "greater_than", "value": 200})),
                &ctx,
            )
            .await
            .unwrap();
        assert!(matches!(fail.gate, Gate::Closed(_)));
        assert_eq!(fail.result["result"], false);
    }

    #[tokio::test]
    async fn test_filter_bad_regex_is_node_error() {
        let err = executor()
            .execute(
                &node("filter", json!({"field": "x", "operator": "regex", "value": "("})),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NodeExecution { ref node, .. } if node == "Under test"));
    }

    #[tokio::test]
    async fn test_email_action_resolves_templates() {
        let out = executor()
            .execute(
                &node(
                    "action",
                    json!({"actionType": "email", "to": "{{1.email}}", "subject": "Total {{1.total}}"}),
                ),
                &order_context(),
            )
            .await
            .unwrap();
        assert_eq!(out.result["status"], "success");
        assert_eq!(out.result["provider"], "mock");
        assert_eq!(out.result["to"], "ana@example.com");
        assert_eq!(out.result["subject"], "Total 150");
        assert_eq!(out.result["actionType"], "email");
    }

    #[tokio::test]
    async fn test_action_router_error_is_captured() {
        let out = executor()
            .execute(
                &node(
                    "action",
                    json!({"actionType": "email", "to": "a@b.c", "subject": "x", "providerConfig": {"provider": "sendgrid"}}),
                ),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.result["status"], "error");
        assert!(out.result["error"].as_str().unwrap().contains("apiKey"));
        assert_eq!(out.gate, Gate::Open);
    }

    #[tokio::test]
    async fn test_generic_action() {
        let out = executor()
            .execute(&node("action", json!({})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.result["status"], "success");
    }

    #[tokio::test]
    async fn test_database_action_defaults_to_simulated_store() {
        let out = executor()
            .execute(
                &node("action", json!({"actionType": "database", "query": "INSERT INTO t VALUES (1)"})),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.result["status"], "success");
        assert_eq!(out.result["queryType"], "INSERT");
    }

    #[tokio::test]
    async fn test_data_source_output_var() {
        let out = executor()
            .execute(
                &node("data_source", json!({"sourceType": "database", "query": "SELECT * FROM x", "outputVar": "orders"})),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert!(out.result["orders"].as_array().is_some());
        assert_eq!(out.result["provider"], "mock");

        let out = executor()
            .execute(&node("data_source", json!({"sourceType": "static"})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.result["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_data_source_router_error_fails_node() {
        let err = executor()
            .execute(
                &node(
                    "data_source",
                    json!({"sourceType": "database", "query": "SELECT 1", "providerConfig": {"type": "oracle"}}),
                ),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NodeExecution { .. }));
    }

    #[tokio::test]
    async fn test_static_data_source_resolves_and_stays_open() {
        let out = executor()
            .execute(
                &node(
                    "data_source",
                    json!({"sourceType": "static", "data": {"to": "{{1.email}}"}, "outputVar": "contact"}),
                ),
                &order_context(),
            )
            .await
            .unwrap();
        assert_eq!(out.gate, Gate::Open);
        assert_eq!(out.result["status"], "success");
        assert_eq!(out.result["sourceType"], "static");
        assert_eq!(out.result["contact"], json!({"to": "ana@example.com"}));
    }

    #[tokio::test]
    async fn test_data_modifier() {
        let out = executor()
            .execute(
                &node("data_modifier", json!({"input": "{{1.rows}}", "operationType": "filter", "output": "active"})),
                &order_context(),
            )
            .await
            .unwrap();
        assert_eq!(out.result["active"], json!([{"id": 1, "status": "active"}]));
        assert_eq!(out.result["operationType"], "filter");
    }

    #[tokio::test]
    async fn test_multi_branch_selects_first_match() {
        let cfg = json!({
            "field": "{{1.tier}}",
            "branches": [
                {"name": "vip", "operator": "in", "value": "gold,platinum"},
                {"name": "gold-only", "operator": "equals", "value": "gold"}
            ],
            "defaultBranch": "standard"
        });
        let out = executor()
            .execute(&node("multi_branch", cfg.clone()), &order_context())
            .await
            .unwrap();
        assert_eq!(out.gate, Gate::Branch("vip".into()));

        let out = executor()
            .execute(&node("multi_branch", cfg), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.gate, Gate::Branch("standard".into()));
        assert_eq!(out.result["matched"], false);
    }

    #[tokio::test]
    async fn test_delay_capped() {
        let mut config = AppConfig::default();
        config.engine.max_delay_ms = 5;
        let router = IntegrationRouter::builder(&config).build().unwrap();
        let exec = NodeExecutor::new(Arc::new(router), &config.engine);
        let out = exec
            .execute(&node("delay", json!({"durationMs": 10_000})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.result["delayedMs"], 5);
        assert_eq!(out.result["capped"], true);
    }

    #[tokio::test]
    async fn test_validation_gate() {
        let cfg = json!({"value": "{{1.email}}", "rules": [{"rule": "required"}, {"rule": "email"}]});
        let out = executor()
            .execute(&node("validation", cfg.clone()), &order_context())
            .await
            .unwrap();
        assert_eq!(out.gate, Gate::Open);
        assert_eq!(out.result["valid"], true);

        let out = executor()
            .execute(&node("validation", cfg), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(matches!(out.gate, Gate::Closed(_)));
        assert_eq!(out.result["violations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_echoes_label() {
        let out = executor()
            .execute(&node("passthrough", json!({})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out.result, json!({"status": "success", "label": "Under test"}));
    }
}
