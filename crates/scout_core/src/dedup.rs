use std::collections::HashSet;

/// Identities already emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    pub fn mark_seen(&mut self, identity: impl Into<String>) {
        self.seen.insert(identity.into());
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
