use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::EventBus;
use switchyard_core::graph::{Edge, Graph, Node};
use switchyard_core::types::{EngineEvent, ResultStatus, RunId};
use switchyard_integrations::IntegrationRouter;

use crate::context::ExecutionContext;
use crate::executor::{Gate, NodeExecutor};
use crate::validate::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

/// A node failure recorded during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub node_id: Option<String>,
    pub label: Option<String>,
    pub message: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}: {}", label, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: RunState,
    pub log: Vec<LogEntry>,
    pub context: ExecutionContext,
    pub errors: Vec<RunError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// The log rendered as ordered, human-readable lines.
    pub fn log_lines(&self) -> Vec<String> {
        self.log
            .iter()
            .map(|entry| {
                format!(
                    "[{}] {:<5} {}",
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.level,
                    entry.message
                )
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        let verb = match self.state {
            RunState::Failed => "failed",
            _ => "completed",
        };
        format!("Workflow {} with {} errors", verb, self.errors.len())
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed && self.errors.is_empty()
    }
}

/// Mutable state for a single run.
struct Run<'g> {
    workflow: Workflow<'g>,
    context: ExecutionContext,
    visited: HashSet<&'g str>,
    log: Vec<LogEntry>,
    errors: Vec<RunError>,
}

impl<'g> Run<'g> {
    fn record(&mut self, level: LogLevel, node_id: Option<&str>, message: impl Into<String>) {
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            level,
            node_id: node_id.map(str::to_string),
            message: message.into(),
        });
    }

    fn fail_node(&mut self, node: &Node, message: String) {
        self.record(
            LogLevel::Error,
            Some(node.id.as_str()),
            format!("Error in {}: {}", node.display_name(), message),
        );
        self.errors.push(RunError {
            node_id: Some(node.id.clone()),
            label: Some(node.display_name().to_string()),
            message,
        });
    }
}

/// Walks a workflow graph from its triggers, executing each node once.
pub struct WorkflowEngine {
    executor: NodeExecutor,
    max_depth: usize,
    events: Option<Arc<EventBus>>,
}

impl WorkflowEngine {
    pub fn new(router: Arc<IntegrationRouter>, config: &AppConfig) -> Self {
        Self {
            executor: NodeExecutor::new(router, &config.engine),
            max_depth: config.engine.max_depth,
            events: None,
        }
    }

    /// Publish run and node events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn router(&self) -> &Arc<IntegrationRouter> {
        self.executor.router()
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Execute `graph` and report what happened.
    pub async fn run(&self, graph: &Graph) -> RunReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let mut run = Run {
            workflow: Workflow::new(graph),
            context: ExecutionContext::new(),
            visited: HashSet::new(),
            log: Vec::new(),
            errors: Vec::new(),
        };
        let mut state = RunState::Running;

        info!(run_id = %run_id, nodes = graph.nodes.len(), edges = graph.edges.len(), "Workflow run started");
        self.emit(EngineEvent::RunStarted {
            run_id: run_id.clone(),
            node_count: graph.nodes.len(),
        });

        if run.workflow.is_empty() {
            warn!(run_id = %run_id, "Workflow has no nodes");
            run.record(LogLevel::Warn, None, "Workflow has no nodes, nothing to run");
        } else {
            let triggers = run.workflow.triggers();
            if triggers.is_empty() {
                warn!(run_id = %run_id, "Workflow has no trigger node");
                run.record(LogLevel::Warn, None, "No trigger node found, nothing to run");
            }
            run.record(
                LogLevel::Info,
                None,
                format!("Starting workflow with {} trigger(s)", triggers.len()),
            );

            for trigger in triggers {
                if run.visited.contains(trigger.id.as_str()) {
                    debug!(node_id = %trigger.id, "Trigger already executed via another path");
                    continue;
                }
                let Some(gate) = self.visit(&mut run, trigger).await else {
                    continue;
                };
                run.record(
                    LogLevel::Info,
                    Some(trigger.id.as_str()),
                    format!("Trigger '{}' fired", trigger.display_name()),
                );
                if let Err(e) = self.process_connected(&mut run, trigger, gate, 0).await {
                    error!(run_id = %run_id, error = %e, "Workflow run aborted");
                    run.record(LogLevel::Error, None, format!("Run aborted: {}", e));
                    run.errors.push(RunError {
                        node_id: None,
                        label: None,
                        message: e.to_string(),
                    });
                    state = RunState::Failed;
                    break;
                }
            }
        }

        if state == RunState::Running {
            state = RunState::Completed;
        }
        let finished_at = Utc::now();
        let report = RunReport {
            run_id: run_id.clone(),
            state,
            log: run.log,
            context: run.context,
            errors: run.errors,
            started_at,
            finished_at: Some(finished_at),
        };

        info!(
            run_id = %run_id,
            executed = report.context.len(),
            errors = report.errors.len(),
            state = ?report.state,
            "Workflow run finished"
        );
        self.emit(EngineEvent::RunCompleted {
            run_id,
            failed: report.state == RunState::Failed,
            error_count: report.errors.len(),
            finished_at,
        });
        report
    }

    /// Follow the outgoing edges of `node` that `gate` allows.
    fn process_connected<'a, 'g: 'a>(
        &'a self,
        run: &'a mut Run<'g>,
        node: &'g Node,
        gate: Gate,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let edges: Vec<&'g Edge> = match &gate {
                Gate::Open => run.workflow.outgoing(&node.id).to_vec(),
                Gate::Closed(reason) => {
                    info!(node_id = %node.id, reason = %reason, "Branch stopped");
                    run.record(
                        LogLevel::Info,
                        Some(node.id.as_str()),
                        format!("{}: {}, not following connections", node.display_name(), reason),
                    );
                    self.emit(EngineEvent::BranchStopped {
                        node_id: node.id.clone(),
                        reason: reason.clone(),
                    });
                    return Ok(());
                }
                Gate::Branch(branch) => {
                    run.record(
                        LogLevel::Info,
                        Some(node.id.as_str()),
                        format!("{} selected branch '{}'", node.display_name(), branch),
                    );
                    run.workflow
                        .outgoing(&node.id)
                        .iter()
                        .copied()
                        .filter(|edge| edge.matches_label(branch))
                        .collect()
                }
            };

            for edge in edges {
                let Some(target) = run.workflow.node(&edge.target) else {
                    warn!(edge_id = %edge.id, target = %edge.target, "Edge target not found");
                    run.record(
                        LogLevel::Warn,
                        Some(node.id.as_str()),
                        format!("Target node '{}' not found, skipping", edge.target),
                    );
                    continue;
                };
                if run.visited.contains(target.id.as_str()) {
                    debug!(node_id = %target.id, "Node already executed in this run, skipping");
                    run.record(
                        LogLevel::Debug,
                        Some(target.id.as_str()),
                        format!("{} already executed, skipping", target.display_name()),
                    );
                    continue;
                }
                if depth + 1 > self.max_depth {
                    return Err(SwitchyardError::Graph(format!(
                        "maximum traversal depth {} exceeded at node '{}'",
                        self.max_depth, target.id
                    )));
                }
                if let Some(next) = self.visit(run, target).await {
                    self.process_connected(run, target, next, depth + 1).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Validate and execute one node. `None` prunes the branch.
    async fn visit<'g>(&self, run: &mut Run<'g>, node: &'g Node) -> Option<Gate> {
        run.visited.insert(node.id.as_str());

        let problems = node.config.validate();
        if !problems.is_empty() {
            let message = format!("invalid configuration: {}", problems.join(", "));
            warn!(node_id = %node.id, %message, "Skipping node");
            self.emit(EngineEvent::NodeFailed {
                node_id: node.id.clone(),
                error: message.clone(),
            });
            run.fail_node(node, message);
            return None;
        }

        debug!(node_id = %node.id, node_type = %node.node_type(), "Executing node");
        run.record(
            LogLevel::Info,
            Some(node.id.as_str()),
            format!("Executing {} ({})", node.display_name(), node.node_type()),
        );
        self.emit(EngineEvent::NodeStarted {
            node_id: node.id.clone(),
            label: node.display_name().to_string(),
        });

        let start = Instant::now();
        match self.executor.execute(node, &run.context).await {
            Ok(outcome) => {
                let status = match outcome.result.get("status").and_then(Value::as_str) {
                    Some("error") => ResultStatus::Error,
                    _ => ResultStatus::Success,
                };
                if status == ResultStatus::Error {
                    let detail = outcome.result.get("error").and_then(Value::as_str).unwrap_or("unknown error");
                    run.record(
                        LogLevel::Warn,
                        Some(node.id.as_str()),
                        format!("{} reported an error: {}", node.display_name(), detail),
                    );
                }
                run.context.set(node.id.clone(), outcome.result);
                self.emit(EngineEvent::NodeCompleted {
                    node_id: node.id.clone(),
                    status,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
                Some(outcome.gate)
            }
            Err(e) => {
                let message = match &e {
                    SwitchyardError::NodeExecution { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                warn!(node_id = %node.id, error = %message, "Node failed, pruning branch");
                run.context.set(
                    node.id.clone(),
                    json!({"status": "error", "error": message}),
                );
                self.emit(EngineEvent::NodeFailed {
                    node_id: node.id.clone(),
                    error: message.clone(),
                });
                run.fail_node(node, message);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_integrations::Simulator;
    use switchyard_test_utils::{instant_config, order_workflow, GraphBuilder};

    fn engine_with(config: &AppConfig) -> WorkflowEngine {
        let router = IntegrationRouter::builder(config)
            .simulator(Simulator::instant())
            .build()
            .unwrap();
        WorkflowEngine::new(Arc::new(router), config)
    }

    fn engine() -> WorkflowEngine {
        engine_with(&instant_config())
    }

    fn executed(report: &RunReport) -> Vec<&str> {
        report.context.node_ids().collect()
    }

    #[tokio::test]
    async fn test_empty_graph_completes_with_warning() {
        let report = engine().run(&Graph::new()).await;
        assert_eq!(report.state, RunState::Completed);
        assert!(report.context.is_empty());
        assert!(report.log.iter().any(|e| e.level == LogLevel::Warn));
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_no_trigger_is_noop() {
        let graph = GraphBuilder::new().passthrough("1").passthrough("2").edge("1", "2").build();
        let report = engine().run(&graph).await;
        assert_eq!(report.state, RunState::Completed);
        assert!(report.context.is_empty());
        assert!(report.log.iter().any(|e| e.message.contains("No trigger")));
    }

    #[tokio::test]
    async fn test_reachable_nodes_execute_exactly_once() {
        // diamond: 1 -> 2 -> 4, 1 -> 3 -> 4; 5 is unreachable
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .passthrough("4")
            .passthrough("5")
            .edge("1", "2")
            .edge("1", "3")
            .edge("2", "4")
            .edge("3", "4")
            .build();
        let report = engine().run(&graph).await;
        assert_eq!(executed(&report), vec!["1", "2", "4", "3"]);
        assert!(!report.context.contains("5"));
        assert!(report.is_success());
    }

    async fn gated_run(threshold: &str) -> RunReport {
        let graph = GraphBuilder::new()
            .trigger_with_payload("3", json!({"x": 150}))
            .filter("4", "{{3.x}}", "greater_than", threshold)
            .passthrough("5")
            .edge("3", "4")
            .edge("4", "5")
            .build();
        engine().run(&graph).await
    }

    #[tokio::test]
    async fn test_filter_passes() {
        let report = gated_run("100").await;
        assert_eq!(report.context.get("4").unwrap()["conditionPassed"], true);
        assert!(report.context.contains("5"));
    }

    #[tokio::test]
    async fn test_filter_blocks_successors() {
        let report = gated_run("200").await;
        assert_eq!(report.context.get("4").unwrap()["conditionPassed"], false);
        assert!(!report.context.contains("5"));
        assert!(report.errors.is_empty());
        assert!(report.log.iter().any(|e| e.message.contains("condition not met")));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .edge("3", "2")
            .build();
        let report = engine().run(&graph).await;
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(executed(&report), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_multi_branch_follows_matching_label() {
        let graph = GraphBuilder::new()
            .trigger_with_payload("1", json!({"tier": "gold"}))
            .node_json(
                "2",
                "multi_branch",
                json!({
                    "field": "{{1.tier}}",
                    "branches": [{"name": "VIP", "operator": "equals", "value": "gold"}]
                }),
            )
            .passthrough("vip")
            .passthrough("standard")
            .labeled_edge("2", "vip", "vip")
            .labeled_edge("2", "standard", "default")
            .edge("1", "2")
            .build();
        let report = engine().run(&graph).await;
        assert!(report.context.contains("vip"));
        assert!(!report.context.contains("standard"));
    }

    #[tokio::test]
    async fn test_node_error_prunes_branch() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .filter("2", "x", "regex", "(")
            .passthrough("3")
            .passthrough("4")
            .edge("1", "2")
            .edge("2", "3")
            .edge("1", "4")
            .build();
        let report = engine().run(&graph).await;
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].label.as_deref(), Some("2"));
        assert_eq!(report.context.get("2").unwrap()["status"], "error");
        assert!(!report.context.contains("3"));
        assert!(report.context.contains("4"));
        assert_eq!(report.summary(), "Workflow completed with 1 errors");
    }

    #[tokio::test]
    async fn test_invalid_config_skips_branch() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .node_json("2", "action", json!({"actionType": "email", "subject": "hi"}))
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .build();
        let report = engine().run(&graph).await;
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("'to'"));
        assert!(!report.context.contains("2"));
        assert!(!report.context.contains("3"));
    }

    #[tokio::test]
    async fn test_action_error_does_not_stop_traversal() {
        let graph = GraphBuilder::new()
            .trigger("1")
            .node_json(
                "2",
                "action",
                json!({"actionType": "email", "to": "a@b.c", "subject": "hi", "providerConfig": {"provider": "sendgrid"}}),
            )
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .build();
        let report = engine().run(&graph).await;
        assert_eq!(report.context.get("2").unwrap()["status"], "error");
        assert!(report.context.contains("3"));
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_max_depth_fails_run() {
        let mut config = instant_config();
        config.engine.max_depth = 2;
        let graph = GraphBuilder::new()
            .trigger("1")
            .passthrough("2")
            .passthrough("3")
            .passthrough("4")
            .edge("1", "2")
            .edge("2", "3")
            .edge("3", "4")
            .build();
        let report = engine_with(&config).run(&graph).await;
        assert_eq!(report.state, RunState::Failed);
        assert!(!report.context.contains("4"));
        assert!(report.summary().starts_with("Workflow failed"));
    }

    #[tokio::test]
    async fn test_order_workflow_end_to_end() {
        let report = engine().run(&order_workflow()).await;
        assert!(report.is_success());
        let email = report.context.get("3").unwrap();
        assert_eq!(email["provider"], "mock");
        assert_eq!(email["to"], "customer@example.com");
        assert_eq!(email["subject"], "Order ORD-1001 confirmed");
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let graph = GraphBuilder::new()
            .trigger_with_payload("1", json!({"x": 1}))
            .filter("2", "{{1.x}}", "greater_than", "5")
            .passthrough("3")
            .edge("1", "2")
            .edge("2", "3")
            .build();
        let report = engine().with_events(bus.clone()).run(&graph).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(EngineEvent::RunStarted { node_count: 3, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::BranchStopped { node_id, .. } if node_id == "2")));
        match events.last() {
            Some(EngineEvent::RunCompleted { run_id, failed, .. }) => {
                assert_eq!(run_id, &report.run_id);
                assert!(!failed);
            }
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let report = engine().run(&order_workflow()).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "completed");
        assert!(json["context"]["1"].is_object());
        assert_eq!(report.log_lines().len(), report.log.len());
    }
}
