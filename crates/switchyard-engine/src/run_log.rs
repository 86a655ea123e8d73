use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use switchyard_core::types::{EngineEvent, ResultStatus};

/// JSONL run logger.
///
/// Consumes engine events and writes one JSON object per line to
/// `{log_dir}/{run_id}.jsonl`. The file is opened when `RunStarted` arrives,
/// so a logger can be attached before the run id is known. Each line is
/// flushed as written; a crash mid-run leaves every earlier line intact.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Path of the log file for `run_id`.
    pub fn log_path(&self, run_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", run_id))
    }

    /// Write events until `RunCompleted`, cancellation, or the bus closing.
    ///
    /// `rx` must be subscribed before the run starts or `RunStarted` is missed.
    /// Returns the path written, if a run was observed.
    pub async fn run(self, mut rx: Receiver<EngineEvent>, cancel: CancellationToken) -> Option<PathBuf> {
        let mut writer: Option<(BufWriter<tokio::fs::File>, String, PathBuf)> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    };

                    if let EngineEvent::RunStarted { run_id, .. } = &event {
                        if writer.is_none() {
                            let path = self.log_path(&run_id.0);
                            match open(&self.log_dir, &path).await {
                                Ok(file) => {
                                    info!(path = %path.display(), "RunLogger started");
                                    writer = Some((BufWriter::new(file), run_id.0.clone(), path));
                                }
                                Err(e) => {
                                    error!(error = %e, path = %path.display(), "Failed to open run log");
                                    return None;
                                }
                            }
                        }
                    }

                    let Some((out, run_id, _)) = writer.as_mut() else {
                        continue;
                    };
                    let Some(entry) = event_to_entry(run_id, &event) else {
                        continue;
                    };
                    if let Ok(json) = serde_json::to_string(&entry) {
                        let line = format!("{}\n", json);
                        if let Err(e) = out.write_all(line.as_bytes()).await {
                            error!(error = %e, "Failed to write run log entry");
                            break;
                        }
                        if let Err(e) = out.flush().await {
                            error!(error = %e, "Failed to flush run log");
                        }
                    }

                    if matches!(event, EngineEvent::RunCompleted { .. }) {
                        break;
                    }
                }
            }
        }

        let (mut out, _, path) = writer?;
        out.flush().await.ok();
        debug!(path = %path.display(), "RunLogger finished");
        Some(path)
    }
}

async fn open(dir: &Path, path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

fn event_to_entry(run_id: &str, event: &EngineEvent) -> Option<LogEntry> {
    let entry = |event_type, node_id: Option<&String>, detail| LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        run_id: run_id.to_string(),
        event_type,
        node_id: node_id.cloned(),
        detail,
    };

    Some(match event {
        EngineEvent::RunStarted { node_count, .. } => entry(
            "run_started",
            None,
            Some(serde_json::json!({ "node_count": node_count })),
        ),
        EngineEvent::NodeStarted { node_id, label } => entry(
            "node_started",
            Some(node_id),
            Some(serde_json::json!({ "label": label })),
        ),
        EngineEvent::NodeCompleted {
            node_id,
            status,
            elapsed_ms,
        } => entry(
            "node_completed",
            Some(node_id),
            Some(serde_json::json!({
                "status": match status {
                    ResultStatus::Success => "success",
                    ResultStatus::Error => "error",
                },
                "elapsed_ms": elapsed_ms,
            })),
        ),
        EngineEvent::NodeFailed { node_id, error } => entry(
            "node_failed",
            Some(node_id),
            Some(serde_json::json!({ "error": error })),
        ),
        EngineEvent::BranchStopped { node_id, reason } => entry(
            "branch_stopped",
            Some(node_id),
            Some(serde_json::json!({ "reason": reason })),
        ),
        EngineEvent::RunCompleted {
            failed,
            error_count,
            finished_at,
            ..
        } => entry(
            "run_completed",
            None,
            Some(serde_json::json!({
                "failed": failed,
                "error_count": error_count,
                "finished_at": finished_at.to_rfc3339(),
            })),
        ),
        // webhook deliveries are not part of a run
        EngineEvent::WebhookReceived { .. } => return None,
    })
}
