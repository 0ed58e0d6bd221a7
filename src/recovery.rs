//! Deadlock recovery by victim termination.
//!
//! Victim policy: the actor holding the most allocated units, ties going to
//! the lowest actor id. This is a greedy choice. It does not search for the
//! smallest set of actors whose removal breaks every cycle, and it does not
//! check that the chosen victim sits on the cycle that was found. Callers
//! re-run detection after each recovery and call [`recover`] again while a
//! deadlock remains.

use crate::detector;
use crate::error::Result;
use crate::events::{Event, EventAction, EventLog};
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::table::{ActorId, ReleaseOutcome, ResourceTable};
use serde::Serialize;
use serde_json::json;

/// What one call to [`recover`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// `actor` was stripped of its holds and pending requests.
    Victim {
        actor: ActorId,
        released: Vec<String>,
        abandoned: Vec<String>,
    },
    /// Nobody holds anything, so there is nothing to take back.
    NoActionableVictim,
}

impl RecoveryOutcome {
    pub fn victim(&self) -> Option<ActorId> {
        match self {
            RecoveryOutcome::Victim { actor, .. } => Some(*actor),
            RecoveryOutcome::NoActionableVictim => None,
        }
    }
}

/// Pick the victim from a snapshot. `None` when every row holds zero units.
pub fn select_victim(snapshot: &LedgerSnapshot) -> Option<ActorId> {
    let mut best: Option<(usize, u64)> = None;
    for (row, held) in snapshot.allocation.iter().enumerate() {
        let total: u64 = held.iter().map(|&v| u64::from(v)).sum();
        // Strict comparison keeps the first (lowest id) row on ties.
        if best.is_none_or(|(_, max)| total > max) {
            best = Some((row, total));
        }
    }
    match best {
        Some((row, total)) if total > 0 => Some(snapshot.actor_at(row)),
        _ => None,
    }
}

/// Resolve one victim.
///
/// Every unit the victim holds is released through the table, bypassing the
/// victim's own release path, and mirrored into the ledger. The victim's
/// whole request row is cleared, not only the request that triggered
/// detection. The caller must hold the coordinator lock for the duration.
pub fn recover(
    ledger: &mut Ledger,
    table: &mut ResourceTable,
    log: &EventLog,
) -> Result<RecoveryOutcome> {
    let snapshot = ledger.snapshot();
    let Some(victim) = select_victim(&snapshot) else {
        log.record(Event::server(
            EventAction::NoActionableVictim,
            "Deadlock detected, no actionable victim.",
        ));
        return Ok(RecoveryOutcome::NoActionableVictim);
    };

    log.record(
        Event::server(
            EventAction::VictimSelected,
            format!("Recovering from deadlock: Terminating Train{}", victim),
        )
        .with_actor(victim),
    );

    let mut released = Vec::new();
    for id in ledger.holdings(victim)? {
        let name = table.name(id).to_string();
        if table.release(victim, id)? == ReleaseOutcome::NotHeld {
            // Table and ledger disagree. The ledger follows the table.
            log.record(
                Event::server(
                    EventAction::ProtocolViolation,
                    format!("Train{} was not a holder of {} during recovery", victim, name),
                )
                .with_actor(victim)
                .with_resource(name.clone()),
            );
        } else {
            log.record(
                Event::server(
                    EventAction::ForceReleased,
                    format!("Force-releasing {} from Train{}", name, victim),
                )
                .with_actor(victim)
                .with_resource(name.clone()),
            );
        }
        ledger.mark_released(victim, id)?;
        released.push(name);
    }

    let abandoned: Vec<String> = ledger
        .clear_requests(victim)?
        .into_iter()
        .map(|id| table.name(id).to_string())
        .collect();

    log.record(
        Event::server(
            EventAction::ActorTerminated,
            format!("Train{} released all locks.", victim),
        )
        .with_actor(victim)
        .with_details(json!({ "released": released, "abandoned": abandoned })),
    );

    Ok(RecoveryOutcome::Victim {
        actor: victim,
        released,
        abandoned,
    })
}

/// Victims recovery would choose for `snapshot`, in order, and whether that
/// leaves the state deadlock-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryPlan {
    pub victims: Vec<ActorId>,
    pub resolved: bool,
}

/// Replay detect-and-recover on a copy of `snapshot` without touching any
/// table. Each victim's allocation returns to `available` and its rows are
/// zeroed, exactly as [`recover`] does to the live ledger.
pub fn plan(snapshot: &LedgerSnapshot) -> RecoveryPlan {
    let mut state = snapshot.clone();
    let mut victims = Vec::new();

    while detector::detect_snapshot(&state) {
        let Some(victim) = select_victim(&state) else {
            return RecoveryPlan {
                victims,
                resolved: false,
            };
        };
        let Some(row) = (0..state.allocation.len()).find(|&row| state.actor_at(row) == victim)
        else {
            break;
        };
        for (free, held) in state.available.iter_mut().zip(&mut state.allocation[row]) {
            *free = free.saturating_add(*held);
            *held = 0;
        }
        if let Some(wants) = state.request.get_mut(row) {
            wants.iter_mut().for_each(|w| *w = 0);
        }
        victims.push(victim);
    }

    RecoveryPlan {
        victims,
        resolved: !detector::detect_snapshot(&state),
    }
}
