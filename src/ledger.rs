//! Allocation/request ledger.
//!
//! Mirrors the resource table as three matrices the detector can reason over:
//!
//! - `allocation[i][r]`: 1 iff actor `i` holds a unit of `r`
//! - `request[i][r]`: 1 iff actor `i` has an ungranted ACQUIRE for `r`
//! - `available[r]`: `capacity(r) - |holders(r)|`
//!
//! Rows are ordered by ascending actor id, columns by resource-table order.
//! Every transition checks that each (actor, resource) pair is in exactly one
//! of idle, requesting, or held.

use crate::error::{InterlockError, Result};
use crate::table::{ActorId, ResourceId, ResourceTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where one (actor, resource) pair stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    Idle,
    Requesting,
    Held,
}

impl std::fmt::Display for PairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairState::Idle => write!(f, "idle"),
            PairState::Requesting => write!(f, "requesting"),
            PairState::Held => write!(f, "held"),
        }
    }
}

/// A consistent copy of the ledger matrices, handed to the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Actor id for each row. May be omitted in matrix files, in which case
    /// rows are numbered from 1.
    #[serde(default)]
    pub actors: Vec<ActorId>,
    pub allocation: Vec<Vec<u32>>,
    pub request: Vec<Vec<u32>>,
    pub available: Vec<u32>,
}

impl LedgerSnapshot {
    /// Actor id for `row`, falling back to `row + 1` when ids are absent.
    pub fn actor_at(&self, row: usize) -> ActorId {
        self.actors
            .get(row)
            .copied()
            .unwrap_or(row as ActorId + 1)
    }

    /// Check that the matrices agree on their dimensions.
    pub fn validate_shape(&self) -> Result<()> {
        let n = self.allocation.len();
        let m = self.available.len();
        if self.request.len() != n {
            return Err(InterlockError::UserError(format!(
                "allocation has {} rows but request has {}",
                n,
                self.request.len()
            )));
        }
        if !self.actors.is_empty() && self.actors.len() != n {
            return Err(InterlockError::UserError(format!(
                "{} actor ids given for {} rows",
                self.actors.len(),
                n
            )));
        }
        for (i, (a, r)) in self.allocation.iter().zip(&self.request).enumerate() {
            if a.len() != m || r.len() != m {
                return Err(InterlockError::UserError(format!(
                    "row {} does not have {} resource columns",
                    i, m
                )));
            }
        }
        Ok(())
    }
}

/// The allocation/request bookkeeping kept in lockstep with the table.
#[derive(Debug, Clone)]
pub struct Ledger {
    actors: Vec<ActorId>,
    rows: HashMap<ActorId, usize>,
    resources: Vec<String>,
    allocation: Vec<Vec<u32>>,
    request: Vec<Vec<u32>>,
    available: Vec<u32>,
}

impl Ledger {
    /// Size the matrices for `actors` x the table's resources.
    ///
    /// `available` starts at each resource's real remaining capacity, not at
    /// a fixed constant. Holdings already present in the table are mirrored.
    pub fn new(actors: &[ActorId], table: &ResourceTable) -> Self {
        let mut actors = actors.to_vec();
        actors.sort_unstable();
        actors.dedup();

        let m = table.len();
        let rows = actors
            .iter()
            .enumerate()
            .map(|(row, &actor)| (actor, row))
            .collect();
        let mut allocation = vec![vec![0; m]; actors.len()];
        for (row, &actor) in actors.iter().enumerate() {
            for id in table.held_by(actor) {
                allocation[row][id] = 1;
            }
        }

        Self {
            rows,
            resources: table.iter().map(|(_, r)| r.name.clone()).collect(),
            allocation,
            request: vec![vec![0; m]; actors.len()],
            available: table.iter().map(|(_, r)| r.available()).collect(),
            actors,
        }
    }

    pub fn actors(&self) -> &[ActorId] {
        &self.actors
    }

    pub fn available(&self) -> &[u32] {
        &self.available
    }

    /// Current state of one pair.
    pub fn state(&self, actor: ActorId, resource: ResourceId) -> Result<PairState> {
        let row = self.row(actor)?;
        let held = self.cell(&self.allocation, row, resource)? > 0;
        let requesting = self.cell(&self.request, row, resource)? > 0;
        Ok(match (held, requesting) {
            (true, _) => PairState::Held,
            (false, true) => PairState::Requesting,
            (false, false) => PairState::Idle,
        })
    }

    /// Idle -> requesting.
    pub fn mark_requesting(&mut self, actor: ActorId, resource: ResourceId) -> Result<()> {
        let row = self.expect_state(actor, resource, PairState::Idle)?;
        self.request[row][resource] = 1;
        Ok(())
    }

    /// Requesting -> held: clears the request, sets the allocation and takes
    /// one unit out of `available`.
    pub fn promote_to_held(&mut self, actor: ActorId, resource: ResourceId) -> Result<()> {
        let row = self.expect_state(actor, resource, PairState::Requesting)?;
        if self.available[resource] == 0 {
            return Err(self.transition_error(actor, resource, PairState::Requesting));
        }
        self.request[row][resource] = 0;
        self.allocation[row][resource] = 1;
        self.available[resource] -= 1;
        Ok(())
    }

    /// Held -> idle: clears the allocation and returns the unit.
    pub fn mark_released(&mut self, actor: ActorId, resource: ResourceId) -> Result<()> {
        let row = self.expect_state(actor, resource, PairState::Held)?;
        self.allocation[row][resource] = 0;
        self.available[resource] += 1;
        Ok(())
    }

    /// Requesting -> idle, without granting.
    pub fn withdraw_request(&mut self, actor: ActorId, resource: ResourceId) -> Result<()> {
        let row = self.expect_state(actor, resource, PairState::Requesting)?;
        self.request[row][resource] = 0;
        Ok(())
    }

    /// Drop every pending request of `actor`. Returns the columns cleared.
    pub fn clear_requests(&mut self, actor: ActorId) -> Result<Vec<ResourceId>> {
        let row = self.row(actor)?;
        let cleared = self.request[row]
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0)
            .map(|(id, _)| id)
            .collect();
        self.request[row].iter_mut().for_each(|v| *v = 0);
        Ok(cleared)
    }

    /// Columns `actor` currently holds according to the allocation matrix.
    pub fn holdings(&self, actor: ActorId) -> Result<Vec<ResourceId>> {
        let row = self.row(actor)?;
        Ok(self.allocation[row]
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0)
            .map(|(id, _)| id)
            .collect())
    }

    /// An owned copy of the matrices.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            actors: self.actors.clone(),
            allocation: self.allocation.clone(),
            request: self.request.clone(),
            available: self.available.clone(),
        }
    }

    /// Compare the ledger with the table it mirrors. Returns one message per
    /// violated invariant; an empty list means the views agree.
    pub fn verify_against(&self, table: &ResourceTable) -> Vec<String> {
        let mut violations = Vec::new();
        if table.len() != self.available.len() {
            violations.push(format!(
                "ledger tracks {} resources, table has {}",
                self.available.len(),
                table.len()
            ));
            return violations;
        }

        for (id, resource) in table.iter() {
            if resource.holders().len() as u32 > resource.capacity {
                violations.push(format!(
                    "{} has {} holders over capacity {}",
                    resource.name,
                    resource.holders().len(),
                    resource.capacity
                ));
            }
            if self.available[id] != resource.available() {
                violations.push(format!(
                    "available[{}] = {} but table has {} free",
                    resource.name,
                    self.available[id],
                    resource.available()
                ));
            }
            for (row, &actor) in self.actors.iter().enumerate() {
                let allocated = self.allocation[row][id] > 0;
                if allocated != resource.is_held_by(actor) {
                    violations.push(format!(
                        "allocation[{}][{}] = {} disagrees with holders",
                        actor, resource.name, self.allocation[row][id]
                    ));
                }
                if allocated && self.request[row][id] > 0 {
                    violations.push(format!(
                        "train {} both holds and requests {}",
                        actor, resource.name
                    ));
                }
            }
            for holder in resource.holders() {
                if !self.rows.contains_key(holder) {
                    violations.push(format!(
                        "{} is held by unregistered train {}",
                        resource.name, holder
                    ));
                }
            }
        }
        violations
    }

    fn row(&self, actor: ActorId) -> Result<usize> {
        self.rows
            .get(&actor)
            .copied()
            .ok_or(InterlockError::UnknownActor(actor))
    }

    fn cell(&self, matrix: &[Vec<u32>], row: usize, resource: ResourceId) -> Result<u32> {
        matrix[row]
            .get(resource)
            .copied()
            .ok_or_else(|| InterlockError::UnknownResource(format!("#{}", resource)))
    }

    fn expect_state(
        &self,
        actor: ActorId,
        resource: ResourceId,
        expected: PairState,
    ) -> Result<usize> {
        let state = self.state(actor, resource)?;
        if state != expected {
            return Err(self.transition_error(actor, resource, state));
        }
        self.row(actor)
    }

    fn transition_error(
        &self,
        actor: ActorId,
        resource: ResourceId,
        state: PairState,
    ) -> InterlockError {
        InterlockError::InvalidTransition {
            actor,
            resource: self
                .resources
                .get(resource)
                .cloned()
                .unwrap_or_else(|| format!("#{}", resource)),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::AcquireOutcome;

    fn setup() -> (ResourceTable, Ledger) {
        let table = ResourceTable::new([("A", 1), ("B", 2)]);
        let ledger = Ledger::new(&[2, 1], &table);
        (table, ledger)
    }

    #[test]
    fn available_starts_at_capacity() {
        let (_, ledger) = setup();
        assert_eq!(ledger.available(), &[1, 2]);
        assert_eq!(ledger.actors(), &[1, 2]);
    }

    #[test]
    fn available_reflects_existing_holders() {
        let mut table = ResourceTable::new([("A", 1), ("B", 3)]);
        table.try_acquire(1, 1).unwrap();
        let ledger = Ledger::new(&[1, 2], &table);
        assert_eq!(ledger.available(), &[1, 2]);
        assert_eq!(ledger.state(1, 1).unwrap(), PairState::Held);
        assert!(ledger.verify_against(&table).is_empty());
    }

    #[test]
    fn full_lifecycle_keeps_states_exclusive() {
        let (mut table, mut ledger) = setup();

        assert_eq!(ledger.state(1, 0).unwrap(), PairState::Idle);
        ledger.mark_requesting(1, 0).unwrap();
        assert_eq!(ledger.state(1, 0).unwrap(), PairState::Requesting);

        assert_eq!(table.try_acquire(1, 0).unwrap(), AcquireOutcome::Granted);
        ledger.promote_to_held(1, 0).unwrap();
        assert_eq!(ledger.state(1, 0).unwrap(), PairState::Held);
        assert_eq!(ledger.available(), &[0, 2]);
        assert!(ledger.verify_against(&table).is_empty());

        table.release(1, 0).unwrap();
        ledger.mark_released(1, 0).unwrap();
        assert_eq!(ledger.state(1, 0).unwrap(), PairState::Idle);
        assert_eq!(ledger.available(), &[1, 2]);
        assert!(ledger.verify_against(&table).is_empty());
    }

    #[test]
    fn invalid_transitions_are_refused() {
        let (_, mut ledger) = setup();

        let err = ledger.promote_to_held(1, 0).unwrap_err();
        assert!(matches!(
            err,
            InterlockError::InvalidTransition {
                state: PairState::Idle,
                ..
            }
        ));

        let err = ledger.mark_released(1, 1).unwrap_err();
        assert!(matches!(err, InterlockError::InvalidTransition { .. }));

        ledger.mark_requesting(1, 0).unwrap();
        assert!(ledger.mark_requesting(1, 0).is_err());
        assert_eq!(ledger.available(), &[1, 2]);
    }

    #[test]
    fn unknown_actor_is_reported() {
        let (_, mut ledger) = setup();
        assert_eq!(
            ledger.mark_requesting(9, 0).unwrap_err(),
            InterlockError::UnknownActor(9)
        );
    }

    #[test]
    fn withdraw_request_returns_to_idle() {
        let (_, mut ledger) = setup();
        ledger.mark_requesting(1, 1).unwrap();
        ledger.withdraw_request(1, 1).unwrap();
        assert_eq!(ledger.state(1, 1).unwrap(), PairState::Idle);
        assert!(ledger.withdraw_request(1, 1).is_err());
    }

    #[test]
    fn clear_requests_zeroes_the_row() {
        let (_, mut ledger) = setup();
        ledger.mark_requesting(2, 0).unwrap();
        ledger.mark_requesting(2, 1).unwrap();
        assert_eq!(ledger.clear_requests(2).unwrap(), vec![0, 1]);
        assert_eq!(ledger.snapshot().request[1], vec![0, 0]);
    }

    #[test]
    fn verify_detects_divergence() {
        let (mut table, ledger) = setup();
        table.try_acquire(1, 0).unwrap();
        let violations = ledger.verify_against(&table);
        assert!(violations.iter().any(|v| v.contains("available[A]")));
        assert!(violations.iter().any(|v| v.contains("allocation[1][A]")));
    }

    #[test]
    fn snapshot_shape_validation() {
        let good = LedgerSnapshot {
            actors: vec![],
            allocation: vec![vec![1, 0], vec![0, 1]],
            request: vec![vec![0, 1], vec![1, 0]],
            available: vec![0, 0],
        };
        assert!(good.validate_shape().is_ok());
        assert_eq!(good.actor_at(1), 2);

        let bad = LedgerSnapshot {
            request: vec![vec![0, 1]],
            ..good
        };
        assert!(bad.validate_shape().is_err());
    }
}
