use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use adbrain_core::types::{ExecutionId, WorkflowEvent};

/// JSONL run logger.
///
/// Consumes workflow events and writes one JSON object per line to
/// `{log_dir}/{execution_id}.jsonl`. Each line is flushed as it is written,
/// so a crashed run still leaves a readable log.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    execution_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1=run summary, 2=per node, 3=per provider attempt.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn log_path(log_dir: &Path, execution_id: &ExecutionId) -> PathBuf {
        log_dir.join(format!("{}.jsonl", execution_id))
    }

    /// Write events for one run until it completes or `cancel` fires.
    ///
    /// Takes a receiver rather than the bus so the caller can subscribe
    /// before the run publishes its first event.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<WorkflowEvent>,
        execution_id: ExecutionId,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let log_path = Self::log_path(&self.log_dir, &execution_id);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open run log");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(entry) = self.event_to_entry(&execution_id, &event) else {
                                continue;
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush run log");
                                }
                            }

                            if matches!(&event, WorkflowEvent::RunCompleted { execution_id: id, .. } if *id == execution_id) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry. `None` if it belongs to another run
    /// or is filtered out by level.
    fn event_to_entry(&self, execution_id: &ExecutionId, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, node_id: Option<&str>, detail: Option<serde_json::Value>| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            execution_id: execution_id.to_string(),
            event_type: event_type.to_string(),
            node_id: node_id.map(str::to_string),
            detail,
        };
        let ours = |id: &ExecutionId| id == execution_id;

        match event {
            // L1: run summary
            WorkflowEvent::RunStarted { execution_id: id, graph_id } if ours(id) => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({ "graph_id": graph_id })),
            )),
            WorkflowEvent::RunCompleted { execution_id: id, status, elapsed_ms } if ours(id) => {
                Some(entry(
                    "run_completed",
                    None,
                    Some(serde_json::json!({ "status": status, "elapsed_ms": elapsed_ms })),
                ))
            }
            WorkflowEvent::FallbackSynthesized { execution_id: id, reason } if ours(id) => Some(
                entry("fallback_synthesized", None, Some(serde_json::json!({ "reason": reason }))),
            ),
            WorkflowEvent::Archived { execution_id: id, campaign_id } if ours(id) => Some(entry(
                "archived",
                None,
                Some(serde_json::json!({ "campaign_id": campaign_id })),
            )),
            WorkflowEvent::ArchiveFailed { execution_id: id, error } if ours(id) => Some(entry(
                "archive_failed",
                None,
                Some(serde_json::json!({ "error": truncate_str(error, 200) })),
            )),

            // L2: per node
            WorkflowEvent::NodeStarted { execution_id: id, node_id, kind }
                if ours(id) && self.level >= 2 =>
            {
                Some(entry(
                    "node_started",
                    Some(node_id.as_str()),
                    Some(serde_json::json!({ "kind": kind })),
                ))
            }
            WorkflowEvent::NodeCompleted { execution_id: id, node_id, duration_secs }
                if ours(id) && self.level >= 2 =>
            {
                Some(entry(
                    "node_completed",
                    Some(node_id.as_str()),
                    Some(serde_json::json!({ "duration_secs": duration_secs })),
                ))
            }
            WorkflowEvent::NodeFailed { execution_id: id, node_id, error }
                if ours(id) && self.level >= 2 =>
            {
                Some(entry(
                    "node_failed",
                    Some(node_id.as_str()),
                    Some(serde_json::json!({ "error": truncate_str(error, 200) })),
                ))
            }

            // L3: provider attempts
            WorkflowEvent::ProviderFailed {
                execution_id: Some(id),
                provider,
                kind,
                message,
            } if ours(id) && self.level >= 3 => Some(entry(
                "provider_failed",
                None,
                Some(serde_json::json!({
                    "provider": provider,
                    "kind": kind,
                    "message": truncate_str(message, 200),
                })),
            )),
            WorkflowEvent::ProviderSelected {
                execution_id: Some(id),
                provider,
                attempts,
            } if ours(id) && self.level >= 3 => Some(entry(
                "provider_selected",
                None,
                Some(serde_json::json!({ "provider": provider, "attempts": attempts })),
            )),

            _ => None,
        }
    }
}

/// Truncate a string for logging, on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
