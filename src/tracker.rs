/// Session-scoped record of access points already written to the survey.
///
/// Keyed by BSSID. Entries are never removed; a new session starts with a
/// new registry.

use alloc::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: BTreeSet<[u8; 6]>,
}

impl DedupRegistry {
    pub const fn new() -> Self {
        Self {
            seen: BTreeSet::new(),
        }
    }

    pub fn contains(&self, bssid: &[u8; 6]) -> bool {
        self.seen.contains(bssid)
    }

    /// Record a BSSID. Returns false if it was already present.
    pub fn insert(&mut self, bssid: [u8; 6]) -> bool {
        self.seen.insert(bssid)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
