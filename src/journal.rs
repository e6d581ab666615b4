use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::JournalConfig;
use crate::predict::Method;

/// Prediction Journal - recent scoring decisions, newest last
///
/// Lets an operator see which path (model or fallback) recent requests took
/// without turning on debug logging.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JournalEntry {
    pub timestamp: String,
    pub user_id: Option<Value>,
    pub method: Method,
    pub trust_score: f64,
    pub trust_rating: f64,
    pub latency_us: u64,
}

pub struct Journal {
    config: JournalConfig,
    entries: RwLock<Vec<JournalEntry>>,
    total_recorded: AtomicU64,
}

impl Journal {
    pub fn new(config: &JournalConfig) -> Self {
        Self {
            config: config.clone(),
            entries: RwLock::new(Vec::new()),
            total_recorded: AtomicU64::new(0),
        }
    }

    /// Record a prediction in the journal
    pub fn record(
        &self,
        user_id: Option<&Value>,
        method: Method,
        trust_score: f64,
        trust_rating: f64,
        latency: Duration,
    ) {
        if !self.config.enabled {
            return;
        }

        let entry = JournalEntry {
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            user_id: user_id.cloned(),
            method,
            trust_score,
            trust_rating,
            latency_us: latency.as_micros() as u64,
        };

        let mut entries = self.entries.write();
        entries.push(entry);
        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        // Rotation: keep within max_entries
        if entries.len() > self.config.max_entries {
            let drain_count = entries.len() - self.config.max_entries;
            entries.drain(..drain_count);
        }
    }

    /// Most recent first, optionally filtered by method
    pub fn search(&self, method: Option<Method>, limit: usize) -> Vec<JournalEntry> {
        let entries = self.entries.read();
        entries.iter()
            .rev()
            .filter(|e| method.map_or(true, |m| e.method == m))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> serde_json::Value {
        let entries = self.entries.read();
        serde_json::json!({
            "enabled": self.config.enabled,
            "current_entries": entries.len(),
            "max_entries": self.config.max_entries,
            "total_recorded": self.total_recorded.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn journal(max_entries: usize) -> Journal {
        Journal::new(&JournalConfig { enabled: true, max_entries })
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let j = journal(3);
        for i in 0..5 {
            j.record(Some(&json!(i)), Method::Fallback, i as f64, 1.0, Duration::from_micros(10));
        }
        let entries = j.search(None, 10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].user_id, Some(json!(4)));
        assert_eq!(entries[2].user_id, Some(json!(2)));
        assert_eq!(j.get_stats()["total_recorded"], 5);
    }

    #[test]
    fn test_filter_by_method() {
        let j = journal(10);
        j.record(None, Method::Fallback, 10.0, 1.4, Duration::ZERO);
        j.record(None, Method::MlModel, 80.0, 4.2, Duration::ZERO);
        j.record(None, Method::Fallback, 20.0, 1.8, Duration::ZERO);

        let model_only = j.search(Some(Method::MlModel), 10);
        assert_eq!(model_only.len(), 1);
        assert_eq!(model_only[0].trust_score, 80.0);
        assert_eq!(j.search(Some(Method::Fallback), 1).len(), 1);
    }

    #[test]
    fn test_disabled_records_nothing() {
        let j = Journal::new(&JournalConfig { enabled: false, max_entries: 10 });
        j.record(None, Method::Fallback, 10.0, 1.4, Duration::ZERO);
        assert!(j.search(None, 10).is_empty());
        assert_eq!(j.get_stats()["total_recorded"], 0);
    }
}
