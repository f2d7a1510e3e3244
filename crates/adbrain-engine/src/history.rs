use std::sync::{Arc, Mutex};

use adbrain_core::types::ExecutionId;

use crate::graph::ExecutionRecord;

/// Append-only log of finished runs.
#[derive(Default)]
pub struct ExecutionHistory {
    records: Mutex<Vec<Arc<ExecutionRecord>>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: Arc<ExecutionRecord>) {
        self.lock().push(record);
    }

    /// The `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Arc<ExecutionRecord>> {
        let records = self.lock();
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    pub fn get(&self, execution_id: &ExecutionId) -> Option<Arc<ExecutionRecord>> {
        self.lock()
            .iter()
            .find(|r| &r.execution_id == execution_id)
            .cloned()
    }

    /// Number of recorded runs of one graph.
    pub fn count_for(&self, graph_id: &str) -> usize {
        self.lock().iter().filter(|r| r.graph_id == graph_id).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ExecutionRecord>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbrain_core::types::{MarketSignals, RunStatus};
    use adbrain_test_utils::campaign_params;
    use chrono::Utc;

    use crate::context::ExecutionContext;

    fn record(id: &str, graph_id: &str) -> Arc<ExecutionRecord> {
        let now = Utc::now();
        Arc::new(ExecutionRecord {
            execution_id: ExecutionId::from_string(id),
            graph_id: graph_id.to_string(),
            started_at: now,
            finished_at: now,
            status: RunStatus::Completed,
            node_states: Vec::new(),
            context: ExecutionContext::new(campaign_params(), MarketSignals::default()).snapshot(),
            cancelled: false,
            fallback_used: false,
        })
    }

    #[test]
    fn test_recent_is_oldest_first() {
        let history = ExecutionHistory::new();
        for i in 1..=5 {
            history.record(record(&format!("R{}", i), "g"));
        }

        let ids: Vec<_> = history
            .recent(3)
            .iter()
            .map(|r| r.execution_id.0.clone())
            .collect();
        assert_eq!(ids, vec!["R3", "R4", "R5"]);

        // Asking for more than exists returns everything, still in order
        let all = history.recent(50);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].execution_id.0, "R1");
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_get_and_counts() {
        let history = ExecutionHistory::new();
        assert!(history.is_empty());
        history.record(record("a", "campaign"));
        history.record(record("b", "other"));
        history.record(record("c", "campaign"));

        assert_eq!(history.len(), 3);
        assert_eq!(history.count_for("campaign"), 2);
        assert_eq!(history.get(&ExecutionId::from_string("b")).unwrap().graph_id, "other");
        assert!(history.get(&ExecutionId::from_string("zzz")).is_none());
    }
}
