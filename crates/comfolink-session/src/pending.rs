use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A request waiting for its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub expected_kind: u16,
    pub submitted_at: Instant,
}

/// Requests waiting for a response, in submission order.
///
/// The protocol gives responses no per-request correlation id, so the
/// response kind is the only key: an inbound message settles the earliest
/// entry expecting its kind. Two outstanding requests of the same kind cannot
/// be told apart. If the device answers them out of order, the wrong one is
/// settled. Callers should keep at most one request per kind in flight.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: VecDeque<PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expected_kind: u16, submitted_at: Instant) {
        self.entries.push_back(PendingRequest {
            expected_kind,
            submitted_at,
        });
    }

    /// Remove and return the earliest entry expecting `kind`.
    pub fn resolve(&mut self, kind: u16) -> Option<PendingRequest> {
        let idx = self
            .entries
            .iter()
            .position(|entry| entry.expected_kind == kind)?;
        self.entries.remove(idx)
    }

    /// Entries submitted more than `age` before `now`. They stay in the list.
    pub fn stale(&self, now: Instant, age: Duration) -> impl Iterator<Item = &PendingRequest> {
        self.entries
            .iter()
            .filter(move |entry| now.saturating_duration_since(entry.submitted_at) > age)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_earliest_entry_of_kind() {
        let t0 = Instant::now();
        let mut pending = PendingRequests::new();
        pending.push(55, t0);
        pending.push(39, t0 + Duration::from_millis(1));
        pending.push(39, t0 + Duration::from_millis(2));
        pending.push(68, t0 + Duration::from_millis(3));

        let settled = pending.resolve(39).unwrap();
        assert_eq!(settled.submitted_at, t0 + Duration::from_millis(1));

        let kinds: Vec<u16> = pending.iter().map(|e| e.expected_kind).collect();
        assert_eq!(kinds, vec![55, 39, 68]);
    }

    #[test]
    fn unmatched_kind_leaves_list_alone() {
        let mut pending = PendingRequests::new();
        pending.push(53, Instant::now());

        assert!(pending.resolve(40).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn stale_entries_are_reported_not_removed() {
        let t0 = Instant::now();
        let mut pending = PendingRequests::new();
        pending.push(52, t0);
        pending.push(55, t0 + Duration::from_secs(10));

        let now = t0 + Duration::from_secs(20);
        let stale: Vec<u16> = pending
            .stale(now, Duration::from_secs(15))
            .map(|e| e.expected_kind)
            .collect();

        assert_eq!(stale, vec![52]);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn clear_empties_list() {
        let mut pending = PendingRequests::new();
        pending.push(53, Instant::now());
        pending.clear();
        assert!(pending.is_empty());
    }
}
