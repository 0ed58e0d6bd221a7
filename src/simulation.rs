//! Thread-per-train simulation driven through the coordinator.
//!
//! One service thread owns the receiving end of the request channel and
//! serializes every [`Request`] through the [`Coordinator`]; each train runs
//! on its own thread and waits on a private reply channel. SHUTDOWN is sent
//! only after every train thread has joined, so the service loop always drains
//! the last RELEASEs before it stops.

use crate::config::{Config, RouteMode};
use crate::coordinator::{Coordinator, CoordinatorStats};
use crate::error::{InterlockError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::parser::{Inputs, RouteSpec};
use crate::protocol::{Reply, Request, RequestKind};
use crate::table::ActorId;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Per-run knobs taken from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    pub mode: RouteMode,
    pub hold: Duration,
    pub start_delay: Duration,
}

impl From<&Config> for SimulationOptions {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.route_mode,
            hold: Duration::from_millis(config.hold_ms),
            start_delay: Duration::from_millis(config.start_delay_ms),
        }
    }
}

/// How a train's thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainOutcome {
    Completed,
    Terminated,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub mode: RouteMode,
    pub completed: Vec<ActorId>,
    pub victims: Vec<ActorId>,
    pub deadlocks_detected: u64,
    pub unresolved_deadlocks: u64,
    pub protocol_violations: u64,
    pub grants: u64,
    pub releases: u64,
    /// Holders of every intersection when the run ended.
    pub holders: BTreeMap<String, Vec<ActorId>>,
    /// Empty unless table and ledger disagree.
    pub invariant_violations: Vec<String>,
    pub final_tick: u64,
}

impl SimulationReport {
    fn build(
        mode: RouteMode,
        coordinator: &Coordinator,
        outcomes: &BTreeMap<ActorId, TrainOutcome>,
    ) -> Self {
        let view = coordinator.inspect();
        let CoordinatorStats {
            grants,
            releases,
            deadlocks_detected,
            unresolved_deadlocks,
            protocol_violations,
            invariant_violations: request_errors,
            victims,
        } = view.stats;

        let mut invariant_violations = coordinator.verify();
        if request_errors > 0 {
            invariant_violations.push(format!(
                "{} request(s) found the table and ledger out of step",
                request_errors
            ));
        }

        // A train can finish its route before its TERMINATED notice arrives.
        // The coordinator's verdict wins.
        let terminated: BTreeSet<ActorId> = view.terminated.into_iter().collect();

        Self {
            mode,
            completed: outcomes
                .iter()
                .filter(|(actor, outcome)| {
                    **outcome == TrainOutcome::Completed && !terminated.contains(*actor)
                })
                .map(|(&actor, _)| actor)
                .collect(),
            victims,
            deadlocks_detected,
            unresolved_deadlocks,
            protocol_violations,
            grants,
            releases,
            holders: view
                .resources
                .into_iter()
                .map(|r| (r.name, r.holders))
                .collect(),
            invariant_violations,
            final_tick: coordinator.log().clock().now(),
        }
    }

    /// True if nothing is still held at the end of the run.
    pub fn all_released(&self) -> bool {
        self.holders.values().all(|h| h.is_empty())
    }
}

/// Run every train in `inputs` to completion or termination.
pub fn run(
    inputs: &Inputs,
    options: SimulationOptions,
    log: Arc<EventLog>,
) -> Result<SimulationReport> {
    let coordinator = Arc::new(Coordinator::new(
        inputs.table(),
        &inputs.actors(),
        Arc::clone(&log),
    ));

    let (request_tx, request_rx) = mpsc::channel::<Request>();
    let mut reply_txs = HashMap::new();
    let mut reply_rxs = Vec::new();
    for route in &inputs.routes {
        let (tx, rx) = mpsc::channel::<Reply>();
        reply_txs.insert(route.actor, tx);
        reply_rxs.push(rx);
    }

    let server = spawn_named("server".to_string(), {
        let coordinator = Arc::clone(&coordinator);
        move || serve(&coordinator, request_rx, reply_txs)
    })?;

    let mut trains = Vec::with_capacity(inputs.routes.len());
    for (i, (route, replies)) in inputs.routes.iter().zip(reply_rxs).enumerate() {
        if i > 0 && !options.start_delay.is_zero() {
            thread::sleep(options.start_delay);
        }
        let train = Train {
            route: route.clone(),
            requests: request_tx.clone(),
            replies,
            log: Arc::clone(&log),
            options,
            held: Vec::new(),
        };
        let handle = spawn_named(format!("train-{}", route.actor), move || train.run())?;
        trains.push((route.actor, handle));
    }

    let mut outcomes = BTreeMap::new();
    let mut failures = Vec::new();
    for (actor, handle) in trains {
        match join(handle) {
            Ok(outcome) => {
                outcomes.insert(actor, outcome);
            }
            Err(e) => failures.push(format!("train {}: {}", actor, e)),
        }
    }

    request_tx
        .send(Request::shutdown())
        .map_err(|_| InterlockError::SimulationError("coordinator stopped early".to_string()))?;
    join(server)?;

    if !failures.is_empty() {
        return Err(InterlockError::SimulationError(failures.join("; ")));
    }

    let report = SimulationReport::build(options.mode, &coordinator, &outcomes);
    log.record(
        Event::server(EventAction::SimulationComplete, "All trains finished.").with_details(
            json!({
                "completed": report.completed,
                "victims": report.victims,
                "deadlocks_detected": report.deadlocks_detected,
            }),
        ),
    );
    log.flush()?;
    Ok(report)
}

fn spawn_named<T, F>(name: String, f: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| {
            InterlockError::SimulationError(format!("failed to spawn thread '{}': {}", name, e))
        })
}

fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
    handle
        .join()
        .map_err(|_| InterlockError::SimulationError(format!("thread '{}' panicked", name)))?
}

/// Coordinator service loop. Returns when SHUTDOWN arrives or every sender is
/// gone.
fn serve(
    coordinator: &Coordinator,
    requests: Receiver<Request>,
    replies: HashMap<ActorId, Sender<Reply>>,
) -> Result<()> {
    while let Ok(request) = requests.recv() {
        if request.kind == RequestKind::Shutdown {
            coordinator
                .log()
                .record(Event::server(EventAction::Shutdown, "Shutting down."));
            break;
        }

        for notice in coordinator.handle(&request) {
            // A train that already exited has dropped its receiver.
            if let Some(tx) = replies.get(&notice.actor) {
                let _ = tx.send(notice.reply);
            }
        }
    }
    Ok(())
}

enum Step {
    Granted,
    Skipped,
    Terminated,
}

struct Train {
    route: RouteSpec,
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    log: Arc<EventLog>,
    options: SimulationOptions,
    /// Intersections granted and not yet released, in grant order.
    held: Vec<String>,
}

impl Train {
    fn run(mut self) -> Result<TrainOutcome> {
        let result = match self.options.mode {
            RouteMode::StepWise => self.run_step_wise(),
            RouteMode::HoldAll => self.run_hold_all(),
        };

        match result {
            Ok(TrainOutcome::Completed) => {
                self.release_all()?;
                self.note(EventAction::RouteCompleted, "Completed route.".to_string());
                Ok(TrainOutcome::Completed)
            }
            Ok(TrainOutcome::Terminated) => {
                // Recovery already took every unit this train held.
                self.held.clear();
                self.note(
                    EventAction::ActorTerminated,
                    "Terminated by deadlock recovery.".to_string(),
                );
                Ok(TrainOutcome::Terminated)
            }
            Err(e) => {
                let _ = self.release_all();
                Err(e)
            }
        }
    }

    fn run_step_wise(&mut self) -> Result<TrainOutcome> {
        for resource in self.route.route.clone() {
            match self.acquire(&resource)? {
                Step::Granted => {
                    if let Step::Terminated = self.hold()? {
                        return Ok(TrainOutcome::Terminated);
                    }
                    self.release(&resource)?;
                }
                Step::Skipped => {}
                Step::Terminated => return Ok(TrainOutcome::Terminated),
            }
        }
        Ok(TrainOutcome::Completed)
    }

    fn run_hold_all(&mut self) -> Result<TrainOutcome> {
        let mut first = true;
        for resource in self.route.route.clone() {
            match self.acquire(&resource)? {
                Step::Granted if first => {
                    first = false;
                    if let Step::Terminated = self.hold()? {
                        return Ok(TrainOutcome::Terminated);
                    }
                }
                Step::Granted | Step::Skipped => {}
                Step::Terminated => return Ok(TrainOutcome::Terminated),
            }
        }
        match self.hold()? {
            Step::Terminated => Ok(TrainOutcome::Terminated),
            _ => Ok(TrainOutcome::Completed),
        }
    }

    fn acquire(&mut self, resource: &str) -> Result<Step> {
        self.send(Request::acquire(self.route.actor, resource))?;
        self.note(
            EventAction::AcquireRequested,
            format!("Sent ACQUIRE for {}.", resource),
        );

        let reply = self.replies.recv().map_err(|_| self.hung_up())?;
        Ok(self.on_reply(reply))
    }

    /// Hold for the configured time, waking early if terminated.
    fn hold(&mut self) -> Result<Step> {
        match self.replies.recv_timeout(self.options.hold) {
            Ok(reply) => Ok(self.on_reply(reply)),
            Err(RecvTimeoutError::Timeout) => Ok(Step::Granted),
            Err(RecvTimeoutError::Disconnected) => Err(self.hung_up()),
        }
    }

    fn on_reply(&mut self, reply: Reply) -> Step {
        match reply {
            Reply::Grant { resource } => {
                self.note(EventAction::Granted, format!("Acquired {}.", resource));
                self.held.push(resource);
                Step::Granted
            }
            Reply::Rejected { resource, reason } => {
                self.note(
                    EventAction::ProtocolViolation,
                    format!("Request for {} rejected: {}", resource, reason),
                );
                Step::Skipped
            }
            Reply::Terminated => Step::Terminated,
        }
    }

    fn release(&mut self, resource: &str) -> Result<()> {
        self.send(Request::release(self.route.actor, resource))?;
        self.held.retain(|r| r != resource);
        self.note(
            EventAction::ReleaseRequested,
            format!("Released {}.", resource),
        );
        Ok(())
    }

    fn release_all(&mut self) -> Result<()> {
        for resource in std::mem::take(&mut self.held) {
            self.release(&resource)?;
        }
        Ok(())
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests.send(request).map_err(|_| self.hung_up())
    }

    fn hung_up(&self) -> InterlockError {
        InterlockError::SimulationError(format!(
            "coordinator hung up on {}",
            self.route.name
        ))
    }

    fn note(&self, action: EventAction, message: String) {
        self.log.record(Event::train(self.route.actor, action, message));
    }
}
