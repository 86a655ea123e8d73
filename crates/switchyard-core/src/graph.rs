use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SwitchyardError};
use crate::node_config::NodeConfig;

/// The kind of work a node performs.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Action,
    Filter,
    DataSource,
    DataModifier,
    MultiBranch,
    Delay,
    Validation,
    Passthrough,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Filter => "filter",
            Self::DataSource => "data_source",
            Self::DataModifier => "data_modifier",
            Self::MultiBranch => "multi_branch",
            Self::Delay => "delay",
            Self::Validation => "validation",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| SwitchyardError::Graph(format!("unknown node type '{}'", s)))
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: String,
    pub label: String,
    pub notes: String,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            notes: String::new(),
            config,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }

    /// Label for logs; falls back to the id when unlabeled.
    pub fn display_name(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Wire shape of a node as stored by the editor.
#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    notes: String,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> std::result::Result<Self, Self::Error> {
        let config = NodeConfig::from_value(raw.node_type, raw.config)
            .map_err(|e| format!("node '{}': {}", raw.id, e))?;
        Ok(Self {
            id: raw.id,
            label: raw.label,
            notes: raw.notes,
            config,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        Self {
            node_type: node.node_type(),
            config: node.config.to_value(),
            id: node.id,
            label: node.label,
            notes: node.notes,
        }
    }
}

/// A directed connection between two nodes. The label selects the
/// outgoing path of a multi-branch node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e{}-{}", source, target),
            source,
            target,
            label: None,
        }
    }

    pub fn labeled(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(source, target)
        }
    }

    /// Case-insensitive label match used for branch selection.
    pub fn matches_label(&self, branch: &str) -> bool {
        self.label
            .as_deref()
            .is_some_and(|l| l.trim().eq_ignore_ascii_case(branch.trim()))
    }
}

/// A workflow: nodes plus directed edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut graph: Self =
            serde_json::from_str(json).map_err(|e| SwitchyardError::Graph(e.to_string()))?;
        for edge in &mut graph.edges {
            if edge.id.is_empty() {
                edge.id = format!("e{}-{}", edge.source, edge.target);
            }
        }
        Ok(graph)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn triggers(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Trigger)
            .collect()
    }

    /// Outgoing edges per node id, preserving edge declaration order.
    pub fn adjacency(&self) -> HashMap<&str, Vec<&Edge>> {
        let mut adj: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &self.edges {
            adj.entry(edge.source.as_str()).or_default().push(edge);
        }
        adj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_config::{FilterConfig, FilterOperator};

    const ORDER_FLOW: &str = r#"{
        "nodes": [
            {"id": "1", "type": "trigger", "label": "Order placed", "config": {"triggerType": "webhook", "webhookPath": "/orders"}},
            {"id": "2", "type": "filter", "label": "Big orders", "config": {"field": "{{1.total}}", "operator": "greater_than", "value": 100}},
            {"id": "3", "type": "action", "label": "Notify", "config": {"actionType": "email", "to": "{{1.email}}", "subject": "Thanks"}}
        ],
        "edges": [
            {"source": "1", "target": "2"},
            {"id": "custom", "source": "2", "target": "3"}
        ]
    }"#;

    #[test]
    fn test_parse_graph() {
        let graph = Graph::from_json(ORDER_FLOW).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[1].node_type(), NodeType::Filter);
        assert_eq!(graph.edges[0].id, "e1-2");
        assert_eq!(graph.edges[1].id, "custom");
        assert_eq!(graph.triggers().len(), 1);
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let json = r#"{"nodes": [{"id": "1", "type": "teleport"}], "edges": []}"#;
        assert!(matches!(
            Graph::from_json(json),
            Err(SwitchyardError::Graph(_))
        ));
    }

    #[test]
    fn test_bad_config_names_node() {
        let json = r#"{"nodes": [{"id": "7", "type": "filter", "config": {"operator": "about"}}]}"#;
        let err = Graph::from_json(json).unwrap_err().to_string();
        assert!(err.contains("node '7'"), "{}", err);
    }

    #[test]
    fn test_node_roundtrip() {
        let graph = Graph::from_json(ORDER_FLOW).unwrap();
        let json = graph.to_json().unwrap();
        let back = Graph::from_json(&json).unwrap();
        assert_eq!(graph, back);
        assert!(json.contains("\"type\": \"filter\""));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let node = Node::new(
            "9",
            "",
            NodeConfig::Filter(FilterConfig {
                field: "a".into(),
                operator: Some(FilterOperator::Equals),
                value: "b".into(),
            }),
        );
        assert_eq!(node.display_name(), "9");
    }

    #[test]
    fn test_edge_label_match_ignores_case() {
        let edge = Edge::labeled("1", "2", "High");
        assert!(edge.matches_label("high"));
        assert!(!edge.matches_label("low"));
        assert!(!Edge::new("1", "2").matches_label("high"));
    }

    #[test]
    fn test_node_type_from_str() {
        assert_eq!("data_source".parse::<NodeType>().unwrap(), NodeType::DataSource);
        assert!("datasource".parse::<NodeType>().is_err());
    }
}
