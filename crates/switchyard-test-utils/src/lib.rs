//! Fixtures shared by the Switchyard test suites.

use serde_json::{json, Value};

use switchyard_core::config::{AppConfig, SimulationConfig};
use switchyard_core::graph::{Edge, Graph, Node};

/// Default configuration with simulated latency switched off.
pub fn instant_config() -> AppConfig {
    AppConfig {
        simulation: SimulationConfig::instant(),
        ..AppConfig::default()
    }
}

/// Parse an `AppConfig` from inline TOML. Panics on invalid input.
pub fn config_from_toml(toml_str: &str) -> AppConfig {
    toml::from_str(toml_str).expect("fixture TOML should parse")
}

/// Fluent builder for workflow graphs. Node labels default to the id.
#[derive(Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node from its editor representation.
    pub fn node_json(mut self, id: &str, node_type: &str, config: Value) -> Self {
        let node: Node = serde_json::from_value(json!({
            "id": id,
            "type": node_type,
            "label": id,
            "config": config,
        }))
        .unwrap_or_else(|e| panic!("fixture node '{}' should parse: {}", id, e));
        self.graph.add_node(node);
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.graph.add_node(node);
        self
    }

    pub fn trigger(self, id: &str) -> Self {
        self.node_json(id, "trigger", json!({"triggerType": "manual"}))
    }

    pub fn trigger_with_payload(self, id: &str, payload: Value) -> Self {
        self.node_json(
            id,
            "trigger",
            json!({"triggerType": "manual", "samplePayload": payload}),
        )
    }

    pub fn passthrough(self, id: &str) -> Self {
        self.node_json(id, "passthrough", json!({}))
    }

    pub fn filter(self, id: &str, field: &str, operator: &str, value: &str) -> Self {
        self.node_json(
            id,
            "filter",
            json!({"field": field, "operator": operator, "value": value}),
        )
    }

    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.graph.add_edge(Edge::new(source, target));
        self
    }

    pub fn labeled_edge(mut self, source: &str, target: &str, label: &str) -> Self {
        self.graph.add_edge(Edge::labeled(source, target, label));
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// An order-processing workflow in the editor's save format: trigger, a
/// high-value filter, and an email notification.
pub const ORDER_WORKFLOW_JSON: &str = r#"{
  "nodes": [
    {"id": "1", "type": "trigger", "label": "Order placed", "config": {"triggerType": "webhook", "webhookPath": "/orders"}},
    {"id": "2", "type": "filter", "label": "High value", "config": {"field": "{{1.total}}", "operator": "greater_than", "value": "100"}},
    {"id": "3", "type": "action", "label": "Email customer", "config": {"actionType": "email", "to": "{{1.email}}", "subject": "Order {{1.orderId}} confirmed", "body": "Thanks for spending {{1.total}}"}}
  ],
  "edges": [
    {"id": "e1-2", "source": "1", "target": "2"},
    {"id": "e2-3", "source": "2", "target": "3"}
  ]
}"#;

pub fn order_workflow() -> Graph {
    Graph::from_json(ORDER_WORKFLOW_JSON).expect("order workflow fixture should parse")
}
