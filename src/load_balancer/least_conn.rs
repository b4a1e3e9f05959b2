//! Least Connections load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Live connection counts for the targets of one PROXY rule.
///
/// Target ids are positions in the rule's target list.
#[derive(Debug)]
pub struct LeastConnections {
    counts: Arc<[AtomicUsize]>,
}

impl LeastConnections {
    pub fn new(targets: usize) -> Self {
        Self {
            counts: (0..targets).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Number of targets being balanced.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Current live connection count for a target.
    pub fn count(&self, id: usize) -> usize {
        self.counts
            .get(id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Select the target with the fewest live connections and count one
    /// more connection against it until the guard is dropped.
    ///
    /// Ties go to the lowest id. The increment only lands if the chosen
    /// counter still holds the value it was chosen on; otherwise the
    /// selection is retried, so concurrent picks never share a stale minimum.
    pub fn pick(&self) -> Option<TargetGuard> {
        loop {
            // min_by_key keeps the first of equal minimums.
            let (id, seen) = self
                .counts
                .iter()
                .map(|c| c.load(Ordering::Acquire))
                .enumerate()
                .min_by_key(|(_, count)| *count)?;

            if self.counts[id]
                .compare_exchange(seen, seen + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(TargetGuard {
                    counts: Arc::clone(&self.counts),
                    id,
                });
            }
        }
    }
}

/// A counted connection to one target. Releases its slot on drop.
#[derive(Debug)]
pub struct TargetGuard {
    counts: Arc<[AtomicUsize]>,
    id: usize,
}

impl TargetGuard {
    /// Position of the selected target in the rule's target list.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Live connections on the selected target, this one included.
    pub fn active(&self) -> usize {
        self.counts[self.id].load(Ordering::Acquire)
    }

    /// Release the connection now and return the target's remaining count.
    pub fn release(self) -> usize {
        let counts = Arc::clone(&self.counts);
        let id = self.id;
        drop(self);
        counts[id].load(Ordering::Acquire)
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.counts[self.id].fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(target_id = self.id, "Target connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new(2);

        // A:2, B:0
        let a1 = lb.pick().unwrap();
        let b_first = lb.pick().unwrap();
        assert_eq!((a1.id(), b_first.id()), (0, 1));
        let a2 = lb.pick().unwrap();
        assert_eq!(a2.id(), 0);
        drop(b_first);
        assert_eq!((lb.count(0), lb.count(1)), (2, 0));

        // Next dispatch must select B.
        let b = lb.pick().unwrap();
        assert_eq!(b.id(), 1);
        assert_eq!(lb.count(1), 1);

        // One A connection closes: A:1, B:1, tie goes to the lowest id.
        drop(a1);
        assert_eq!((lb.count(0), lb.count(1)), (1, 1));
        let tie = lb.pick().unwrap();
        assert_eq!(tie.id(), 0);
        assert_eq!(tie.active(), 2);

        drop((a2, b, tie));
        assert_eq!((lb.count(0), lb.count(1)), (0, 0));
    }

    #[test]
    fn single_target_always_picked() {
        let lb = LeastConnections::new(1);
        let g1 = lb.pick().unwrap();
        let g2 = lb.pick().unwrap();
        assert_eq!((g1.id(), g2.id()), (0, 0));
        assert_eq!(lb.count(0), 2);
    }

    #[test]
    fn empty_has_no_pick() {
        assert!(LeastConnections::new(0).pick().is_none());
    }

    #[test]
    fn guard_released_from_other_thread() {
        let lb = LeastConnections::new(2);
        let guard = lb.pick().unwrap();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert_eq!(lb.count(0), 0);
    }

    #[test]
    fn release_reports_remaining() {
        let lb = LeastConnections::new(1);
        let first = lb.pick().unwrap();
        let second = lb.pick().unwrap();
        assert_eq!(first.release(), 1);
        assert_eq!(second.release(), 0);
        assert_eq!(lb.count(0), 0);
    }

    #[test]
    fn concurrent_picks_stay_balanced() {
        let lb = Arc::new(LeastConnections::new(4));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = Arc::clone(&lb);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    lb.pick().unwrap()
                })
            })
            .collect();
        let guards: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Each pick took a counter at the current minimum, so eight picks
        // over four idle targets leave exactly two on each.
        assert_eq!((0..4).map(|id| lb.count(id)).collect::<Vec<_>>(), vec![2, 2, 2, 2]);
        drop(guards);
        assert_eq!((0..4).map(|id| lb.count(id)).sum::<usize>(), 0);
    }
}
