//! The coordinator: the single admission authority for every ACQUIRE and
//! RELEASE.
//!
//! All shared mutable state (the resource table, the ledger, the wait queue
//! and the set of terminated actors) lives in one [`Mutex`]. Each public
//! operation takes that lock exactly once, so detection always runs over a
//! snapshot that is consistent across every actor and every resource.
//!
//! # Decision Order
//!
//! ACQUIRE: validate, mark the request pending, queue it, then settle.
//! RELEASE: release in the table, mirror into the ledger, then settle.
//!
//! Settling runs the detector over a fresh snapshot and recovers one victim
//! at a time until no deadlock remains (or no victim is actionable), and then
//! grants every queued request that now passes the capacity check, in
//! arrival order.

use crate::detector;
use crate::error::{InterlockError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::ledger::{Ledger, LedgerSnapshot, PairState};
use crate::protocol::{Notice, Request, RequestKind};
use crate::recovery::{self, RecoveryOutcome};
use crate::table::{
    AcquireOutcome, ActorId, ReleaseOutcome, ResourceId, ResourceKind, ResourceTable,
};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};


/// Running counters kept by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub grants: u64,
    pub releases: u64,
    pub deadlocks_detected: u64,
    /// Deadlocks that recovery could not act on.
    pub unresolved_deadlocks: u64,
    pub protocol_violations: u64,
    /// Table/ledger disagreements found while handling a request.
    pub invariant_violations: u64,
    /// Victims in the order they were chosen.
    pub victims: Vec<ActorId>,
}

/// Read-only view of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    pub name: String,
    pub capacity: u32,
    pub kind: ResourceKind,
    pub holders: Vec<ActorId>,
}

/// Read-only copy of the coordinator state.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorView {
    pub resources: Vec<ResourceView>,
    pub ledger: LedgerSnapshot,
    /// Queued ACQUIREs as `(actor, resource)`, oldest first.
    pub waiting: Vec<(ActorId, String)>,
    pub terminated: Vec<ActorId>,
    pub stats: CoordinatorStats,
}

struct State {
    table: ResourceTable,
    ledger: Ledger,
    waiting: VecDeque<(ActorId, ResourceId)>,
    terminated: BTreeSet<ActorId>,
    stats: CoordinatorStats,
}

/// Serializes admission decisions for a fixed set of actors and resources.
pub struct Coordinator {
    state: Mutex<State>,
    log: Arc<EventLog>,
}

impl Coordinator {
    /// Build a coordinator over `table` for the given actor ids.
    pub fn new(table: ResourceTable, actors: &[ActorId], log: Arc<EventLog>) -> Self {
        let ledger = Ledger::new(actors, &table);
        let resources: Vec<_> = table
            .iter()
            .map(|(_, r)| json!({ "name": r.name, "capacity": r.capacity, "kind": r.kind() }))
            .collect();
        log.record(
            Event::server(EventAction::Initialized, "Initialized intersections")
                .with_details(json!({ "resources": resources, "actors": ledger.actors() })),
        );

        Self {
            state: Mutex::new(State {
                table,
                ledger,
                waiting: VecDeque::new(),
                terminated: BTreeSet::new(),
                stats: CoordinatorStats::default(),
            }),
            log,
        }
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Dispatch one protocol message. SHUTDOWN is a no-op here; the service
    /// loop that owns the coordinator acts on it.
    pub fn handle(&self, request: &Request) -> Vec<Notice> {
        let resource = request.resource.as_deref().unwrap_or_default();
        match request.kind {
            RequestKind::Acquire => self.acquire(request.actor, resource),
            RequestKind::Release => self.release(request.actor, resource),
            RequestKind::Shutdown => Vec::new(),
        }
    }

    /// Handle an ACQUIRE. Returns the notices to deliver: possibly a GRANT for
    /// the caller, GRANTs for earlier waiters, and TERMINATED for victims.
    pub fn acquire(&self, actor: ActorId, resource: &str) -> Vec<Notice> {
        let mut state = self.lock();
        self.log.record(
            Event::server(
                EventAction::AcquireRequested,
                format!("Received request from Train{}: acquire {}", actor, resource),
            )
            .with_actor(actor)
            .with_resource(resource),
        );

        let id = match state.begin_acquire(actor, resource) {
            Ok(id) => id,
            Err(e) => {
                self.report_error(&mut state.stats, actor, resource, &e);
                return vec![Notice::rejected(actor, resource, e.to_string())];
            }
        };

        let mut notices = Vec::new();
        state.settle(&self.log, &mut notices);

        if state.waiting.contains(&(actor, id)) {
            let holders: Vec<ActorId> = state
                .table
                .get(id)
                .map(|r| r.holders().iter().copied().collect())
                .unwrap_or_default();
            self.log.record(
                Event::server(
                    EventAction::Waiting,
                    format!("Train{} waiting for {}", actor, resource),
                )
                .with_actor(actor)
                .with_resource(resource)
                .with_details(json!({ "holders": holders })),
            );
        }
        notices
    }

    /// Handle a RELEASE. Never blocks; a release of something not held is
    /// reported and ignored.
    pub fn release(&self, actor: ActorId, resource: &str) -> Vec<Notice> {
        let mut state = self.lock();
        self.log.record(
            Event::server(
                EventAction::ReleaseRequested,
                format!("Received request from Train{}: release {}", actor, resource),
            )
            .with_actor(actor)
            .with_resource(resource),
        );

        if let Err(e) = state.apply_release(actor, resource) {
            self.report_error(&mut state.stats, actor, resource, &e);
            return Vec::new();
        }
        self.log.record(
            Event::server(
                EventAction::Released,
                format!("Train{} released {}", actor, resource),
            )
            .with_actor(actor)
            .with_resource(resource),
        );

        let mut notices = Vec::new();
        state.settle(&self.log, &mut notices);
        notices
    }

    /// Copy of the current state.
    pub fn inspect(&self) -> CoordinatorView {
        let state = self.lock();
        CoordinatorView {
            resources: state
                .table
                .iter()
                .map(|(_, r)| ResourceView {
                    name: r.name.clone(),
                    capacity: r.capacity,
                    kind: r.kind(),
                    holders: r.holders().iter().copied().collect(),
                })
                .collect(),
            ledger: state.ledger.snapshot(),
            waiting: state
                .waiting
                .iter()
                .map(|&(actor, id)| (actor, state.table.name(id).to_string()))
                .collect(),
            terminated: state.terminated.iter().copied().collect(),
            stats: state.stats.clone(),
        }
    }

    /// Check the table/ledger invariants. Empty means consistent.
    pub fn verify(&self) -> Vec<String> {
        let state = self.lock();
        let mut violations = state.ledger.verify_against(&state.table);
        for &(actor, id) in &state.waiting {
            if state.ledger.state(actor, id).ok() != Some(PairState::Requesting) {
                violations.push(format!(
                    "train {} is queued for {} without a pending request",
                    actor,
                    state.table.name(id)
                ));
            }
        }
        violations
    }

    /// Caller mistakes are protocol violations. Anything else means the table
    /// and ledger disagree.
    fn report_error(
        &self,
        stats: &mut CoordinatorStats,
        actor: ActorId,
        resource: &str,
        error: &InterlockError,
    ) {
        let action = if error.is_protocol_violation() {
            stats.protocol_violations += 1;
            EventAction::ProtocolViolation
        } else {
            stats.invariant_violations += 1;
            EventAction::InvariantViolation
        };
        self.log.record(
            Event::server(action, format!("Error: {}", error))
                .with_actor(actor)
                .with_resource(resource),
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is consistent between operations, poisoned or not.
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl State {
    fn begin_acquire(&mut self, actor: ActorId, resource: &str) -> Result<ResourceId> {
        if self.terminated.contains(&actor) {
            return Err(InterlockError::ActorTerminated(actor));
        }
        let id = self.table.lookup(resource)?;
        match self.ledger.state(actor, id)? {
            PairState::Held => Err(InterlockError::AlreadyHeld {
                actor,
                resource: resource.to_string(),
            }),
            PairState::Requesting => Err(InterlockError::AlreadyRequested {
                actor,
                resource: resource.to_string(),
            }),
            PairState::Idle => {
                self.ledger.mark_requesting(actor, id)?;
                self.waiting.push_back((actor, id));
                Ok(id)
            }
        }
    }

    fn apply_release(&mut self, actor: ActorId, resource: &str) -> Result<()> {
        if self.terminated.contains(&actor) {
            return Err(InterlockError::ActorTerminated(actor));
        }
        let id = self.table.lookup(resource)?;
        // Unknown actors surface here before the table is touched.
        self.ledger.state(actor, id)?;
        match self.table.release(actor, id)? {
            ReleaseOutcome::NotHeld => Err(InterlockError::NotHeld {
                actor,
                resource: resource.to_string(),
            }),
            ReleaseOutcome::Released => {
                self.ledger.mark_released(actor, id)?;
                self.stats.releases += 1;
                Ok(())
            }
        }
    }

    /// Detect and recover until deadlock-free, then grant what fits.
    fn settle(&mut self, log: &EventLog, notices: &mut Vec<Notice>) {
        loop {
            let snapshot = self.ledger.snapshot();
            let analysis =
                detector::analyze(&snapshot.allocation, &snapshot.request, &snapshot.available);
            if !analysis.deadlocked() {
                log.record(Event::server(
                    EventAction::DeadlockCheck,
                    "Deadlock check triggered",
                ));
                break;
            }

            self.stats.deadlocks_detected += 1;
            let stuck: Vec<ActorId> = analysis
                .stuck_rows()
                .into_iter()
                .map(|row| snapshot.actor_at(row))
                .collect();
            log.record(
                Event::server(EventAction::DeadlockDetected, "Deadlock detected.")
                    .with_details(json!({ "stuck": stuck, "snapshot": snapshot })),
            );

            match recovery::recover(&mut self.ledger, &mut self.table, log) {
                Ok(RecoveryOutcome::Victim { actor, .. }) => {
                    self.terminated.insert(actor);
                    self.waiting.retain(|&(waiter, _)| waiter != actor);
                    self.stats.victims.push(actor);
                    notices.push(Notice::terminated(actor));
                }
                Ok(RecoveryOutcome::NoActionableVictim) => {
                    self.stats.unresolved_deadlocks += 1;
                    break;
                }
                Err(e) => {
                    log.record(Event::server(
                        EventAction::InvariantViolation,
                        format!("Recovery failed: {}", e),
                    ));
                    self.stats.unresolved_deadlocks += 1;
                    break;
                }
            }
        }

        self.grant_waiters(log, notices);
    }

    fn grant_waiters(&mut self, log: &EventLog, notices: &mut Vec<Notice>) {
        let mut still_waiting = VecDeque::with_capacity(self.waiting.len());
        while let Some((actor, id)) = self.waiting.pop_front() {
            match self.grant(actor, id) {
                Ok(AcquireOutcome::Granted) => {
                    let name = self.table.name(id).to_string();
                    log.record(
                        Event::server(
                            EventAction::Granted,
                            format!("Granted {} to Train{}", name, actor),
                        )
                        .with_actor(actor)
                        .with_resource(name.clone()),
                    );
                    notices.push(Notice::grant(actor, name));
                }
                Ok(AcquireOutcome::Blocked) => still_waiting.push_back((actor, id)),
                Err(e) => {
                    // Dropped from the queue, so drop it from the ledger too.
                    log.record(
                        Event::server(
                            EventAction::InvariantViolation,
                            format!("Could not grant {}: {}", self.table.name(id), e),
                        )
                        .with_actor(actor),
                    );
                    self.stats.invariant_violations += 1;
                    if let Err(e) = self.ledger.withdraw_request(actor, id) {
                        self.stats.invariant_violations += 1;
                        log.record(
                            Event::server(
                                EventAction::InvariantViolation,
                                format!("Could not withdraw request: {}", e),
                            )
                            .with_actor(actor)
                            .with_resource(self.table.name(id)),
                        );
                    }
                    notices.push(Notice::rejected(actor, self.table.name(id), e.to_string()));
                }
            }
        }
        self.waiting = still_waiting;
    }

    fn grant(&mut self, actor: ActorId, id: ResourceId) -> Result<AcquireOutcome> {
        let outcome = self.table.try_acquire(actor, id)?;
        if outcome == AcquireOutcome::Granted {
            if let Err(e) = self.ledger.promote_to_held(actor, id) {
                self.table.release(actor, id)?;
                return Err(e);
            }
            self.stats.grants += 1;
        }
        Ok(outcome)
    }
}
