//! Bounded record of recently seen request identifiers.

use std::collections::{HashSet, VecDeque};

use crate::jobs::RequestId;

/// Fixed-capacity LRU of the most recent request ids, used to reject
/// resubmission of an in-flight or recently completed request.
///
/// In-flight ids are pinned and never evicted; only completed ids count
/// against the capacity, oldest first. A duplicate hit refreshes the
/// entry's recency.
pub struct DuplicateTracker {
    capacity: usize,
    in_flight: HashSet<RequestId>,
    recent: VecDeque<RequestId>,
    recent_set: HashSet<RequestId>,
}

impl DuplicateTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: HashSet::new(),
            recent: VecDeque::new(),
            recent_set: HashSet::new(),
        }
    }

    /// Whether `id` is already tracked; refreshes recency on a hit against
    /// the completed set.
    pub fn hit(&mut self, id: &RequestId) -> bool {
        if self.in_flight.contains(id) {
            return true;
        }
        if self.recent_set.contains(id) {
            self.touch(id);
            return true;
        }
        false
    }

    /// Record `id` as in flight. Caller must have checked [`hit`] first.
    pub fn begin(&mut self, id: RequestId) {
        self.in_flight.insert(id);
    }

    /// Transition `id` from in flight to recently completed, evicting the
    /// least recently used completed entries beyond capacity.
    pub fn complete(&mut self, id: &RequestId) {
        if self.in_flight.remove(id) {
            self.recent.push_back(*id);
            self.recent_set.insert(*id);
        }
        while self.recent.len() > self.capacity {
            if let Some(evicted) = self.recent.pop_front() {
                self.recent_set.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, id: &RequestId) {
        if let Some(pos) = self.recent.iter().position(|r| r == id) {
            self.recent.remove(pos);
            self.recent.push_back(*id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.in_flight.len() + self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_ids_are_duplicates() {
        let mut tracker = DuplicateTracker::new(4);
        let id = RequestId::new();
        assert!(!tracker.hit(&id));
        tracker.begin(id);
        assert!(tracker.hit(&id));
    }

    #[test]
    fn completed_ids_stay_duplicates_until_evicted() {
        let mut tracker = DuplicateTracker::new(2);
        let id = RequestId::new();
        tracker.begin(id);
        tracker.complete(&id);
        assert!(tracker.hit(&id));

        // Two more completions push the oldest entry out.
        for _ in 0..2 {
            let other = RequestId::new();
            tracker.begin(other);
            tracker.complete(&other);
        }
        assert!(!tracker.hit(&id));
        assert_eq!(tracker.tracked(), 2);
    }

    #[test]
    fn eviction_is_oldest_completed_first() {
        let mut tracker = DuplicateTracker::new(2);
        let first = RequestId::new();
        let second = RequestId::new();
        for id in [first, second] {
            tracker.begin(id);
            tracker.complete(&id);
        }

        let third = RequestId::new();
        tracker.begin(third);
        tracker.complete(&third);

        assert!(!tracker.hit(&first));
        assert!(tracker.hit(&second));
        assert!(tracker.hit(&third));
    }

    #[test]
    fn duplicate_hit_refreshes_recency() {
        let mut tracker = DuplicateTracker::new(2);
        let first = RequestId::new();
        let second = RequestId::new();
        for id in [first, second] {
            tracker.begin(id);
            tracker.complete(&id);
        }

        // Touch `first`, making `second` the LRU entry.
        assert!(tracker.hit(&first));

        let third = RequestId::new();
        tracker.begin(third);
        tracker.complete(&third);

        assert!(tracker.hit(&first));
        assert!(!tracker.hit(&second));
    }

    #[test]
    fn in_flight_ids_are_never_evicted() {
        let mut tracker = DuplicateTracker::new(1);
        let pinned = RequestId::new();
        tracker.begin(pinned);

        for _ in 0..3 {
            let other = RequestId::new();
            tracker.begin(other);
            tracker.complete(&other);
        }
        assert!(tracker.hit(&pinned));
    }
}
