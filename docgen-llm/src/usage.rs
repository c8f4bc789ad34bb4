use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Ring capacity; the oldest records fall off beyond this.
const RING_CAPACITY: usize = 1024;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    pub step_name: String,
    pub provider: String,
    pub model: String,
    pub prompt_digest: String,
    pub response_digest: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_tokens: Option<u32>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UsageSnapshot {
    pub total_calls: u32,
    pub models: Vec<String>,
    pub providers: Vec<String>,
    pub calls: Vec<LlmCall>,
}

struct Inner {
    total_calls: u32,
    models: BTreeSet<String>,
    providers: BTreeSet<String>,
    ring: VecDeque<LlmCall>,
}

/// Process-wide usage accounting for provider calls.
///
/// Mutex-guarded; safe to share across concurrent workflow executions.
/// `snapshot` and `reset` exist so tests and the dispatcher can observe
/// and clear state deterministically.
pub struct UsageRegistry {
    inner: Mutex<Inner>,
}

impl UsageRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                total_calls: 0,
                models: BTreeSet::new(),
                providers: BTreeSet::new(),
                ring: VecDeque::new(),
            }),
        }
    }

    pub fn record(&self, call: LlmCall) {
        let mut inner = self.inner.lock().expect("usage registry poisoned");
        inner.total_calls += 1;
        inner.models.insert(call.model.clone());
        inner.providers.insert(call.provider.clone());
        if inner.ring.len() == RING_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(call);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let inner = self.inner.lock().expect("usage registry poisoned");
        UsageSnapshot {
            total_calls: inner.total_calls,
            models: inner.models.iter().cloned().collect(),
            providers: inner.providers.iter().cloned().collect(),
            calls: inner.ring.iter().cloned().collect(),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("usage registry poisoned");
        inner.total_calls = 0;
        inner.models.clear();
        inner.providers.clear();
        inner.ring.clear();
    }
}

impl Default for UsageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
