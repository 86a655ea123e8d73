pub mod condition;
pub mod context;
pub mod engine;
pub mod executor;
pub mod modifier;
pub mod resolver;
pub mod run_log;
pub mod validate;

pub use context::ExecutionContext;
pub use engine::{LogEntry, LogLevel, RunError, RunReport, RunState, WorkflowEngine};
pub use executor::{Gate, NodeExecutor, NodeOutcome};
pub use resolver::resolve;
pub use run_log::RunLogger;
pub use validate::{validate, GraphIssue, ValidationReport, Workflow};
