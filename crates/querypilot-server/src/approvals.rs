//! Server-held approval decisions, keyed by conversation.
//!
//! A person approves or rejects a query between exchanges; the next chat
//! request for the same conversation picks the decision up. Entries expire
//! after a period without use.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use querypilot_agent::{ApprovalGate, Decision};

struct Entry {
    gate: ApprovalGate,
    last_access: Instant,
}

/// TTL-expiring store of approval decisions.
pub struct ApprovalStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ApprovalStore {
    /// Create a store whose entries expire `ttl` after their last use.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a decision for `query` in a conversation, replacing any earlier
    /// decision for the same text.
    pub fn record(&self, conversation_id: &str, query: &str, decision: Decision) {
        let mut entries = self.entries.lock();
        Self::drain_expired(&mut entries, self.ttl);

        let entry = entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| Entry {
                gate: ApprovalGate::new(),
                last_access: Instant::now(),
            });
        entry.gate.record(query, decision);
        entry.last_access = Instant::now();
    }

    /// Decisions recorded for a conversation; empty when none or expired.
    pub fn gate(&self, conversation_id: &str) -> ApprovalGate {
        let mut entries = self.entries.lock();
        Self::drain_expired(&mut entries, self.ttl);

        match entries.get_mut(conversation_id) {
            Some(entry) => {
                entry.last_access = Instant::now();
                entry.gate.clone()
            }
            None => ApprovalGate::new(),
        }
    }

    /// Drop every expired conversation and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        Self::drain_expired(&mut self.entries.lock(), self.ttl)
    }

    /// Number of conversations with stored decisions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Get the configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn drain_expired(entries: &mut HashMap<String, Entry>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.last_access.elapsed() <= ttl);
        before - entries.len()
    }
}

impl std::fmt::Debug for ApprovalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalStore")
            .field("conversations", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querypilot_agent::ApprovalState;
    use std::thread;

    #[test]
    fn test_record_and_lookup() {
        let store = ApprovalStore::new(Duration::from_secs(60));
        store.record("conv-1", "SELECT 1", Decision::Approved("SELECT 1 LIMIT 1".into()));
        store.record("conv-1", "DROP TABLE t", Decision::Rejected);

        let gate = store.gate("conv-1");
        assert_eq!(gate.lookup("SELECT 1"), ApprovalState::Approved("SELECT 1 LIMIT 1".into()));
        assert_eq!(gate.lookup("DROP TABLE t"), ApprovalState::Rejected);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_conversations_are_isolated() {
        let store = ApprovalStore::new(Duration::from_secs(60));
        store.record("conv-1", "SELECT 1", Decision::Rejected);

        assert!(store.gate("conv-2").is_empty());
    }

    #[test]
    fn test_later_decision_replaces_earlier() {
        let store = ApprovalStore::new(Duration::from_secs(60));
        store.record("conv-1", "SELECT 1", Decision::Rejected);
        store.record("conv-1", " SELECT 1 ", Decision::Approved("SELECT 1".into()));

        let gate = store.gate("conv-1");
        assert_eq!(gate.len(), 1);
        assert_eq!(gate.lookup("SELECT 1"), ApprovalState::Approved("SELECT 1".into()));
    }

    #[test]
    fn test_expiration() {
        let store = ApprovalStore::new(Duration::from_millis(10));
        store.record("conv-1", "SELECT 1", Decision::Rejected);

        thread::sleep(Duration::from_millis(20));

        assert!(store.gate("conv-1").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_access_resets_timer() {
        let store = ApprovalStore::new(Duration::from_millis(50));
        store.record("conv-1", "SELECT 1", Decision::Rejected);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.gate("conv-1").len(), 1);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.gate("conv-1").len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let store = ApprovalStore::new(Duration::from_millis(10));
        store.record("conv-1", "SELECT 1", Decision::Rejected);
        store.record("conv-2", "SELECT 2", Decision::Rejected);

        thread::sleep(Duration::from_millis(20));

        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }
}
