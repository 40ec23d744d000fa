//! Stage and remote-call logging.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Receives pipeline stages, remote calls and retry notices in order.
///
/// Retry notices are kept apart from stages: a rate-limited run reports the
/// same stage sequence as an unthrottled one.
pub trait CallLog: Send + Sync {
    fn log_stage(&self, stage: &str);

    fn log_api_call(&self, service: &str, method: &str);

    fn log_retry(&self, call: &str, attempt: u32, delay: Duration);
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl CallLog for TracingLog {
    fn log_stage(&self, stage: &str) {
        info!(stage, "pipeline stage");
    }

    fn log_api_call(&self, service: &str, method: &str) {
        debug!(service, method, "remote call");
    }

    fn log_retry(&self, call: &str, attempt: u32, delay: Duration) {
        warn!(
            call,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "rate-limited, waiting before retry"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Stage(String),
    Call { service: String, method: String },
    Retry { call: String, attempt: u32 },
}

/// Keeps every entry in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<Entry>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage names in order. With `dedupe`, repeated names keep only their
    /// first occurrence.
    pub fn stage_log(&self, dedupe: bool) -> Vec<String> {
        let stages = self.collect(|e| match e {
            Entry::Stage(s) => Some(s.clone()),
            _ => None,
        });
        if dedupe { first_occurrences(stages) } else { stages }
    }

    /// `service.method` names of calls made to `service`, in order.
    pub fn api_calls_for(&self, service: &str, dedupe: bool) -> Vec<String> {
        let calls = self.collect(|e| match e {
            Entry::Call { service: s, method } if s == service => Some(format!("{s}.{method}")),
            _ => None,
        });
        if dedupe { first_occurrences(calls) } else { calls }
    }

    /// Every `service.method` call, in order and with repeats.
    pub fn all_api_calls(&self) -> Vec<String> {
        self.collect(|e| match e {
            Entry::Call { service, method } => Some(format!("{service}.{method}")),
            _ => None,
        })
    }

    /// `(call, attempt)` for every retry that was scheduled.
    pub fn retry_log(&self) -> Vec<(String, u32)> {
        self.collect(|e| match e {
            Entry::Retry { call, attempt } => Some((call.clone(), *attempt)),
            _ => None,
        })
    }

    fn collect<T>(&self, f: impl Fn(&Entry) -> Option<T>) -> Vec<T> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().filter_map(f).collect(),
            Err(poisoned) => poisoned.into_inner().iter().filter_map(f).collect(),
        }
    }

    fn push(&self, entry: Entry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

impl CallLog for RecordingLog {
    fn log_stage(&self, stage: &str) {
        self.push(Entry::Stage(stage.to_string()));
    }

    fn log_api_call(&self, service: &str, method: &str) {
        self.push(Entry::Call {
            service: service.to_string(),
            method: method.to_string(),
        });
    }

    fn log_retry(&self, call: &str, attempt: u32, _delay: Duration) {
        self.push(Entry::Retry {
            call: call.to_string(),
            attempt,
        });
    }
}

fn first_occurrences(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
