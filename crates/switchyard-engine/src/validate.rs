//! Structural checks for workflow graphs.
//!
//! Collects every problem rather than stopping at the first. Errors make a
//! graph unrunnable; warnings are reported but never invalidate it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};

use switchyard_core::graph::{Edge, Graph, Node, NodeType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// The graph has no nodes at all.
    Empty,
    /// No trigger node, so nothing would run.
    NoTrigger,
    /// Non-trigger nodes that appear in no edge.
    Disconnected { count: usize },
    /// A cycle reachable from a trigger; the path repeats the entry node last.
    Cycle { path: Vec<String> },
    /// An edge endpoint names a node that does not exist.
    UnknownNode { edge_id: String, node_id: String },
    DuplicateNode { node_id: String },
    /// A node's configuration is missing required values.
    InvalidConfig {
        node_id: String,
        label: String,
        problem: String,
    },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Workflow has no nodes"),
            Self::NoTrigger => write!(f, "Workflow has no trigger node"),
            Self::Disconnected { count } => {
                let noun = if *count == 1 { "node is" } else { "nodes are" };
                write!(f, "{} {} not connected to the workflow", count, noun)
            }
            Self::Cycle { path } => write!(f, "Cycle detected: {}", path.join(" -> ")),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::DuplicateNode { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::InvalidConfig {
                node_id,
                label,
                problem,
            } => write!(f, "Node '{}' ({}): {}", label, node_id, problem),
        }
    }
}

impl Serialize for GraphIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<GraphIssue>,
    pub warnings: Vec<GraphIssue>,
}

impl ValidationReport {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Validate a workflow graph.
pub fn validate(graph: &Graph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.nodes.is_empty() {
        errors.push(GraphIssue::Empty);
        return ValidationReport {
            valid: false,
            errors,
            warnings,
        };
    }

    check_duplicate_ids(graph, &mut errors);
    check_edge_references(graph, &mut errors);
    check_node_configs(graph, &mut errors);

    if graph.triggers().is_empty() {
        warnings.push(GraphIssue::NoTrigger);
    }
    check_disconnected(graph, &mut warnings);
    detect_cycles(graph, &mut errors);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_duplicate_ids(graph: &Graph, errors: &mut Vec<GraphIssue>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) && reported.insert(node.id.as_str()) {
            errors.push(GraphIssue::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }
}

fn check_edge_references(graph: &Graph, errors: &mut Vec<GraphIssue>) {
    let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                errors.push(GraphIssue::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
}

fn check_node_configs(graph: &Graph, errors: &mut Vec<GraphIssue>) {
    for node in &graph.nodes {
        for problem in node.config.validate() {
            errors.push(GraphIssue::InvalidConfig {
                node_id: node.id.clone(),
                label: node.display_name().to_string(),
                problem,
            });
        }
    }
}

fn check_disconnected(graph: &Graph, warnings: &mut Vec<GraphIssue>) {
    let connected: HashSet<&str> = graph
        .edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();
    let count = graph
        .nodes
        .iter()
        .filter(|n| n.node_type() != NodeType::Trigger && !connected.contains(n.id.as_str()))
        .count();
    if count > 0 {
        warnings.push(GraphIssue::Disconnected { count });
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    InPath,
    Done,
}

/// Three-colour depth-first search from every trigger.
fn detect_cycles(graph: &Graph, errors: &mut Vec<GraphIssue>) {
    let adjacency = graph.adjacency();
    let mut colours: HashMap<&str, Colour> = HashMap::new();

    for trigger in graph.triggers() {
        let mut path = Vec::new();
        visit(trigger.id.as_str(), &adjacency, &mut colours, &mut path, errors);
    }
}

fn visit<'g>(
    node_id: &'g str,
    adjacency: &HashMap<&'g str, Vec<&'g Edge>>,
    colours: &mut HashMap<&'g str, Colour>,
    path: &mut Vec<&'g str>,
    errors: &mut Vec<GraphIssue>,
) {
    match colours.get(node_id) {
        Some(Colour::Done) => return,
        Some(Colour::InPath) => {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(node_id.to_string());
            errors.push(GraphIssue::Cycle { path: cycle });
            return;
        }
        None => {}
    }

    colours.insert(node_id, Colour::InPath);
    path.push(node_id);
    if let Some(edges) = adjacency.get(node_id) {
        for edge in edges {
            visit(edge.target.as_str(), adjacency, colours, path, errors);
        }
    }
    path.pop();
    colours.insert(node_id, Colour::Done);
}

/// Immutable per-run view of a graph: id index and ordered outgoing edges.
pub struct Workflow<'g> {
    graph: &'g Graph,
    index: HashMap<&'g str, &'g Node>,
    outgoing: HashMap<&'g str, Vec<&'g Edge>>,
}

impl<'g> Workflow<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        let mut index = HashMap::new();
        for node in &graph.nodes {
            // first declaration wins on duplicate ids
            index.entry(node.id.as_str()).or_insert(node);
        }
        Self {
            graph,
            index,
            outgoing: graph.adjacency(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&'g Node> {
        self.index.get(id).copied()
    }

    pub fn outgoing(&self, id: &str) -> &[&'g Edge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn triggers(&self) -> Vec<&'g Node> {
        self.graph.triggers()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_test_utils::GraphBuilder;

    #[test]
    fn test_empty_graph_is_invalid() {
        let report = validate(&Graph::new());
        assert!(!report.valid);
        assert_eq!(report.errors, vec![GraphIssue::Empty]);
    }

    #[test]
    fn test_linear_graph_is_valid() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .build();
        let report = validate(&graph);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_cycle_reports_full_path() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .edge("3", "2")
            .build();
        let report = validate(&graph);
        assert!(!report.valid);
        assert_eq!(report.error_messages(), vec!["Cycle detected: 1 -> 2 -> 3 -> 2"]);
    }

    #[test]
    fn test_unreachable_cycle_not_reported() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .edge("2", "3")
            .edge("3", "2")
            .build();
        assert!(validate(&graph).valid);
    }

    #[test]
    fn test_no_trigger_and_disconnected_are_warnings() {
        let graph = GraphBuilder::new()
            .passthrough("a")
            .passthrough("b")
            .passthrough("c")
            .edge("a", "b")
            .build();
        let report = validate(&graph);
        assert!(report.valid);
        assert_eq!(
            report.warning_messages(),
            vec![
                "Workflow has no trigger node".to_string(),
                "1 node is not connected to the workflow".to_string(),
            ]
        );
    }

    #[test]
    fn test_dangling_edge_and_duplicate_id() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("1")
            .edge("1", "ghost")
            .build();
        let report = validate(&graph);
        assert!(!report.valid);
        assert!(report
            .errors
            .contains(&GraphIssue::DuplicateNode { node_id: "1".into() }));
        assert!(report
            .error_messages()
            .contains(&"Edge 'e1-ghost' references unknown node 'ghost'".to_string()));
    }

    #[test]
    fn test_config_problems_are_errors() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .node_json("2", "action", serde_json::json!({"actionType": "api_call"}))
            .edge("1", "2")
            .build();
        let report = validate(&graph);
        assert!(!report.valid);
        assert_eq!(
            report.error_messages(),
            vec!["Node '2' (2): missing required field 'url'"]
        );
    }

    #[test]
    fn test_report_serializes_messages() {
        let report = validate(&Graph::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0], "Workflow has no nodes");
    }

    #[test]
    fn test_workflow_view() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .edge("1", "3")
            .edge("1", "2")
            .build();
        let wf = Workflow::new(&graph);
        let targets: Vec<&str> = wf.outgoing("1").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["3", "2"]);
        assert!(wf.outgoing("3").is_empty());
        assert_eq!(wf.node("2").unwrap().id, "2");
        assert_eq!(wf.triggers().len(), 1);
    }
}
