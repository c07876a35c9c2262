//! Bounded in-memory violation ring with broadcast subscription.

use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Default ring capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// What kind of access a violation denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Network,
    Read,
    Write,
}

impl ViolationKind {
    pub fn name(self) -> &'static str {
        match self {
            ViolationKind::Network => "network",
            ViolationKind::Read => "read",
            ViolationKind::Write => "write",
        }
    }
}

/// A single deny event.
#[derive(Debug, Clone)]
pub struct ViolationRecord {
    pub timestamp: SystemTime,
    pub kind: ViolationKind,
    /// The denied host or path.
    pub target: String,
    /// The rule pattern that produced the deny, when known.
    pub matched_rule: Option<String>,
    /// Best-effort identification of the offending process or command.
    pub process_hint: Option<String>,
}

impl ViolationRecord {
    pub fn new(kind: ViolationKind, target: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind,
            target: target.into(),
            matched_rule: None,
            process_hint: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.matched_rule = Some(rule.into());
        self
    }

    pub fn with_process_hint(mut self, hint: impl Into<String>) -> Self {
        self.process_hint = Some(hint.into());
        self
    }
}

/// Bounded ring of recent deny events. Not persisted; cleared on reset.
pub struct ViolationStore {
    ring: RwLock<VecDeque<ViolationRecord>>,
    capacity: usize,
    total_count: RwLock<u64>,
    sender: broadcast::Sender<ViolationRecord>,
}

impl Default for ViolationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            ring: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            total_count: RwLock::new(0),
            sender,
        }
    }

    /// Record a deny event. Oldest entries are dropped at capacity; lagging
    /// broadcast receivers likewise lose oldest events.
    pub fn record(&self, violation: ViolationRecord) {
        let _ = self.sender.send(violation.clone());

        let mut ring = self.ring.write();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(violation);
        *self.total_count.write() += 1;
    }

    /// Subscribe to future deny events.
    pub fn subscribe(&self) -> broadcast::Receiver<ViolationRecord> {
        self.sender.subscribe()
    }

    /// Most recent events, oldest first, up to `limit`.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ViolationRecord> {
        let ring = self.ring.read();
        let limit = limit.unwrap_or(ring.len()).min(ring.len());
        ring.iter().skip(ring.len() - limit).cloned().collect()
    }

    /// Events attributed to a specific command.
    pub fn for_process_hint(&self, hint: &str) -> Vec<ViolationRecord> {
        self.ring
            .read()
            .iter()
            .filter(|v| v.process_hint.as_deref() == Some(hint))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.ring.read().len()
    }

    /// Total events recorded, including those the ring has dropped.
    pub fn total_count(&self) -> u64 {
        *self.total_count.read()
    }

    pub fn clear(&self) {
        self.ring.write().clear();
        *self.total_count.write() = 0;
    }
}
