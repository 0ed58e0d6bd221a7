//! Implementation of the `interlock detect` command.
//!
//! Runs the detector on allocation/request/available matrices read from a
//! file, without a simulation:
//!
//! ```yaml
//! allocation: [[1, 0], [0, 1]]
//! request:    [[0, 1], [1, 0]]
//! available:  [0, 0]
//! ```

use crate::cli::DetectArgs;
use crate::detector;
use crate::error::{InterlockError, Result};
use crate::ledger::LedgerSnapshot;
use crate::recovery::{self, RecoveryPlan};
use crate::table::ActorId;
use serde::Serialize;
use std::path::Path;

/// What the detector and the recovery policy say about one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct DetectReport {
    deadlocked: bool,
    stuck: Vec<ActorId>,
    /// First victim recovery would choose.
    victim: Option<ActorId>,
    plan: RecoveryPlan,
}

/// Execute the `interlock detect` command.
pub fn cmd_detect(args: DetectArgs) -> Result<()> {
    let snapshot = load_snapshot(&args.file)?;
    let report = analyze(&snapshot);

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| {
            InterlockError::UserError(format!("failed to serialize analysis: {}", e))
        })?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "{} actor(s), {} resource(s)",
        snapshot.allocation.len(),
        snapshot.available.len()
    );
    if !report.deadlocked {
        println!("No deadlock.");
        return Ok(());
    }

    println!("Deadlock detected.");
    println!("  Stuck:  {}", join_ids(&report.stuck));
    match report.victim {
        Some(victim) => println!("  Victim: {}", victim),
        None => println!("  Victim: none (no actor holds anything)"),
    }
    if report.plan.victims.len() > 1 {
        println!("  Full recovery terminates: {}", join_ids(&report.plan.victims));
    }
    if !report.plan.resolved {
        println!("  Recovery cannot resolve this state.");
    }
    Ok(())
}

fn analyze(snapshot: &LedgerSnapshot) -> DetectReport {
    let deadlocked = detector::detect_snapshot(snapshot);
    DetectReport {
        deadlocked,
        stuck: detector::stuck_actors(snapshot),
        victim: if deadlocked {
            recovery::select_victim(snapshot)
        } else {
            None
        },
        plan: recovery::plan(snapshot),
    }
}

/// Read a matrix file. `.json` files are parsed as JSON, everything else as YAML.
fn load_snapshot(path: &Path) -> Result<LedgerSnapshot> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        InterlockError::UserError(format!(
            "failed to read matrix file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let snapshot: LedgerSnapshot = if is_json {
        serde_json::from_str(&content).map_err(|e| {
            InterlockError::ParseError(format!("failed to parse '{}': {}", path.display(), e))
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            InterlockError::ParseError(format!("failed to parse '{}': {}", path.display(), e))
        })?
    };

    snapshot.validate_shape()?;
    Ok(snapshot)
}

fn join_ids(ids: &[ActorId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
