//! Deadlock detection by Banker's-style reduction.
//!
//! Run in "can every outstanding request eventually be satisfied" mode:
//! repeatedly pick an unfinished actor whose requests fit in `work`, pretend
//! it completes, and return its allocation to `work`. Whatever is left
//! unfinished when a full pass makes no progress is deadlocked.
//!
//! Cost is `O(n^2 * m)` for `n` actors and `m` resources. The functions here
//! own no state; callers hand in a consistent snapshot.

use crate::ledger::LedgerSnapshot;
use crate::table::ActorId;

/// Result of the reduction: which rows could finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    finish: Vec<bool>,
}

impl Analysis {
    /// True if any actor could not finish.
    pub fn deadlocked(&self) -> bool {
        self.finish.iter().any(|f| !f)
    }

    /// Rows that could not finish, in row order.
    pub fn stuck_rows(&self) -> Vec<usize> {
        self.finish
            .iter()
            .enumerate()
            .filter(|(_, f)| !**f)
            .map(|(row, _)| row)
            .collect()
    }
}

/// Run the reduction over raw matrices.
///
/// Rows of `request` or `allocation` shorter than `available` are treated as
/// zero-padded, so a malformed row can never index out of bounds.
pub fn analyze(allocation: &[Vec<u32>], request: &[Vec<u32>], available: &[u32]) -> Analysis {
    let n = allocation.len().max(request.len());
    let mut finish = vec![false; n];
    let mut work: Vec<u64> = available.iter().map(|&v| u64::from(v)).collect();

    loop {
        let mut progressed = false;
        for i in 0..n {
            if finish[i] {
                continue;
            }
            let wants = request.get(i).map(Vec::as_slice).unwrap_or(&[]);
            let can_finish = work
                .iter()
                .enumerate()
                .all(|(j, &w)| u64::from(wants.get(j).copied().unwrap_or(0)) <= w);
            if can_finish {
                if let Some(held) = allocation.get(i) {
                    for (w, &a) in work.iter_mut().zip(held) {
                        *w += u64::from(a);
                    }
                }
                finish[i] = true;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    Analysis { finish }
}

/// `true` iff the state contains a deadlock. Reports existence only; use
/// [`analyze`] or [`stuck_actors`] for membership.
pub fn detect(allocation: &[Vec<u32>], request: &[Vec<u32>], available: &[u32]) -> bool {
    analyze(allocation, request, available).deadlocked()
}

/// Run the detector over a ledger snapshot.
pub fn detect_snapshot(snapshot: &LedgerSnapshot) -> bool {
    detect(&snapshot.allocation, &snapshot.request, &snapshot.available)
}

/// Actor ids that could not finish in `snapshot`.
pub fn stuck_actors(snapshot: &LedgerSnapshot) -> Vec<ActorId> {
    analyze(&snapshot.allocation, &snapshot.request, &snapshot.available)
        .stuck_rows()
        .into_iter()
        .map(|row| snapshot.actor_at(row))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_state_when_one_actor_needs_nothing() {
        let allocation = vec![vec![1, 0], vec![0, 1]];
        let request = vec![vec![0, 0], vec![1, 0]];
        assert!(!detect(&allocation, &request, &[0, 0]));
    }

    #[test]
    fn circular_wait_is_deadlock() {
        let allocation = vec![vec![1, 0], vec![0, 1]];
        let request = vec![vec![0, 1], vec![1, 0]];
        assert!(detect(&allocation, &request, &[0, 0]));
    }

    #[test]
    fn empty_system_is_deadlock_free() {
        assert!(!detect(&[], &[], &[]));
        // Actors but no resources: nobody can be waiting.
        assert!(!detect(&[vec![], vec![]], &[vec![], vec![]], &[]));
    }

    #[test]
    fn idle_system_with_free_units() {
        let allocation = vec![vec![0, 0], vec![0, 0]];
        let request = vec![vec![0, 0], vec![0, 0]];
        assert!(!detect(&allocation, &request, &[2, 2]));
    }

    #[test]
    fn three_way_cycle() {
        let allocation = vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]];
        let request = vec![vec![0, 1, 0], vec![0, 0, 1], vec![1, 0, 0]];
        let analysis = analyze(&allocation, &request, &[0, 0, 0]);
        assert!(analysis.deadlocked());
        assert_eq!(analysis.stuck_rows(), vec![0, 1, 2]);
    }

    #[test]
    fn starvation_without_cycle_is_not_deadlock() {
        let allocation = vec![vec![1, 0], vec![0, 1], vec![0, 0]];
        let request = vec![vec![0, 0], vec![0, 0], vec![1, 1]];
        assert!(!detect(&allocation, &request, &[0, 0]));
    }

    #[test]
    fn partial_deadlock_reports_only_the_cycle_and_its_dependents() {
        // Rows 0 and 1 wait on each other; row 2 waits on both of them.
        let allocation = vec![vec![1, 0], vec![0, 1], vec![0, 0]];
        let request = vec![vec![0, 1], vec![1, 0], vec![1, 1]];
        let analysis = analyze(&allocation, &request, &[0, 0]);
        assert_eq!(analysis.stuck_rows(), vec![0, 1, 2]);

        // A bystander that needs nothing still finishes.
        let allocation = vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]];
        let request = vec![vec![0, 1, 0], vec![1, 0, 0], vec![0, 0, 0]];
        let analysis = analyze(&allocation, &request, &[0, 0, 0]);
        assert_eq!(analysis.stuck_rows(), vec![0, 1]);
    }

    #[test]
    fn shared_capacity_breaks_the_cycle() {
        // B has a spare unit, so actor 0 can finish and hand back A.
        let allocation = vec![vec![1, 0], vec![0, 1]];
        let request = vec![vec![0, 1], vec![1, 0]];
        assert!(!detect(&allocation, &request, &[0, 1]));
    }

    #[test]
    fn stuck_actors_uses_row_ids() {
        let snapshot = LedgerSnapshot {
            actors: vec![4, 7, 9],
            allocation: vec![vec![1, 0], vec![0, 1], vec![0, 0]],
            request: vec![vec![0, 1], vec![1, 0], vec![0, 0]],
            available: vec![0, 0],
        };
        assert!(detect_snapshot(&snapshot));
        assert_eq!(stuck_actors(&snapshot), vec![4, 7]);
    }
}
