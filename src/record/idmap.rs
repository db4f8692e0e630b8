//! Per-vertex identifier map built by the reconcile phase.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ShellRecord, TargetId};

/// Source id -> target id for one vertex's outgoing neighbourhood.
///
/// An entry exists only if the neighbour was written and its shell reached
/// the shuffle. Absence is a normal outcome (filtered or failed neighbour).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMap {
    entries: HashMap<u64, TargetId>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a shell. On a conflicting duplicate the smaller target id wins,
    /// so the result never depends on arrival order. Returns false on conflict.
    pub fn record(&mut self, shell: ShellRecord) -> bool {
        match self.entries.get_mut(&shell.source_id) {
            None => {
                self.entries.insert(shell.source_id, shell.target_id);
                true
            }
            Some(existing) if *existing == shell.target_id => true,
            Some(existing) => {
                *existing = (*existing).min(shell.target_id);
                false
            }
        }
    }

    pub fn get(&self, source_id: u64) -> Option<TargetId> {
        self.entries.get(&source_id).copied()
    }

    pub fn contains(&self, source_id: u64) -> bool {
        self.entries.contains_key(&source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, TargetId)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<ShellRecord> for IdentifierMap {
    fn from_iter<I: IntoIterator<Item = ShellRecord>>(iter: I) -> Self {
        let mut map = IdentifierMap::new();
        for shell in iter {
            map.record(shell);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(source_id: u64, target: u64) -> ShellRecord {
        ShellRecord { source_id, target_id: TargetId(target) }
    }

    #[test]
    fn test_record_and_lookup() {
        let map: IdentifierMap = vec![shell(1, 10), shell(2, 20)].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(TargetId(10)));
        assert_eq!(map.get(3), None);
        assert!(!map.contains(3));
    }

    #[test]
    fn test_duplicate_same_value_is_not_conflict() {
        let mut map = IdentifierMap::new();
        assert!(map.record(shell(1, 10)));
        assert!(map.record(shell(1, 10)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_conflict_resolution_is_order_independent() {
        let a: IdentifierMap = vec![shell(1, 30), shell(1, 10)].into_iter().collect();
        let b: IdentifierMap = vec![shell(1, 10), shell(1, 30)].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.get(1), Some(TargetId(10)));
    }
}
