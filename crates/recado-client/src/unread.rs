//! Per-peer unread counters.
//!
//! Only two paths write here: the inbox listener increments, opening a
//! conversation resets. Both go through [`crate::state::ChatState`]'s lock
//! together with the open-conversation check.

use std::collections::HashMap;

use recado_shared::UserId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounters {
    counts: HashMap<UserId, u32>,
}

impl UnreadCounters {
    pub fn get(&self, peer: &UserId) -> u32 {
        self.counts.get(peer).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn has_unread(&self) -> bool {
        self.counts.values().any(|&n| n > 0)
    }

    /// Returns the new count for `peer`.
    pub(crate) fn increment(&mut self, peer: UserId) -> u32 {
        let count = self.counts.entry(peer).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Returns whether the count was non-zero before.
    pub(crate) fn reset(&mut self, peer: &UserId) -> bool {
        self.counts.remove(peer).is_some_and(|n| n > 0)
    }

    pub(crate) fn clear(&mut self) {
        self.counts.clear();
    }
}
