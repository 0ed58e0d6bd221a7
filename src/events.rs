//! Event logging subsystem for interlock.
//!
//! Every coordination decision and every actor step is recorded as an
//! [`Event`]. Events are stamped with wall-clock time and with a tick of the
//! shared [`SimClock`], which is created by the caller and injected into the
//! log so the coordination core never owns a clock of its own.
//!
//! # Formats
//!
//! - `text`: `[HH:MM:SS] SOURCE: message`, one line per event
//! - `ndjson`: one JSON object per line
//!
//! ```text
//! [00:00:04] SERVER: Granted IntersectionA to Train1
//! {"ts":"...","tick":4,"source":"SERVER","action":"granted","actor":1,...}
//! ```
//!
//! Write failures are reported to stderr and swallowed; logging never decides
//! the outcome of an ACQUIRE or RELEASE.

use crate::config::LogFormat;
use crate::error::{InterlockError, Result};
use crate::table::ActorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Source name used for coordinator events.
pub const SERVER_SOURCE: &str = "SERVER";

/// Shared simulation clock. Each logged event advances it by one second of
/// simulated time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    ticks: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock and return the new value.
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Render a tick as `[HH:MM:SS]`.
    pub fn format(tick: u64) -> String {
        let hours = tick / 3600;
        let minutes = (tick % 3600) / 60;
        let seconds = tick % 60;
        format!("[{:02}:{:02}:{:02}]", hours, minutes, seconds)
    }
}

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Resources loaded and ledger sized
    Initialized,
    /// ACQUIRE sent or received
    AcquireRequested,
    /// RELEASE sent or received
    ReleaseRequested,
    /// GRANT issued or received
    Granted,
    /// ACQUIRE queued behind a full resource
    Waiting,
    /// Unit handed back to the table
    Released,
    /// Double-acquire, release-not-held, unknown resource or actor
    ProtocolViolation,
    /// Table and ledger bookkeeping disagree
    InvariantViolation,
    /// Detector ran without finding a deadlock
    DeadlockCheck,
    DeadlockDetected,
    VictimSelected,
    /// Unit taken from a victim by recovery
    ForceReleased,
    /// Deadlock found but no victim holds anything
    NoActionableVictim,
    ActorTerminated,
    RouteCompleted,
    Shutdown,
    SimulationComplete,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventAction::Initialized => "initialized",
            EventAction::AcquireRequested => "acquire_requested",
            EventAction::ReleaseRequested => "release_requested",
            EventAction::Granted => "granted",
            EventAction::Waiting => "waiting",
            EventAction::Released => "released",
            EventAction::ProtocolViolation => "protocol_violation",
            EventAction::InvariantViolation => "invariant_violation",
            EventAction::DeadlockCheck => "deadlock_check",
            EventAction::DeadlockDetected => "deadlock_detected",
            EventAction::VictimSelected => "victim_selected",
            EventAction::ForceReleased => "force_released",
            EventAction::NoActionableVictim => "no_actionable_victim",
            EventAction::ActorTerminated => "actor_terminated",
            EventAction::RouteCompleted => "route_completed",
            EventAction::Shutdown => "shutdown",
            EventAction::SimulationComplete => "simulation_complete",
        };
        write!(f, "{}", s)
    }
}

/// A single log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Wall-clock time the event was recorded.
    pub ts: DateTime<Utc>,

    /// Simulation clock value assigned when recorded.
    pub tick: u64,

    /// `SERVER` or `TRAIN<id>`.
    pub source: String,

    pub action: EventAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Human-readable line used by the text format.
    pub message: String,

    /// Name of the recording thread, when thread tagging is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Event {
    /// An event emitted by the coordinator.
    pub fn server(action: EventAction, message: impl Into<String>) -> Self {
        Self::new(SERVER_SOURCE.to_string(), action, message)
    }

    /// An event emitted by an actor's own thread.
    pub fn train(actor: ActorId, action: EventAction, message: impl Into<String>) -> Self {
        Self::new(format!("TRAIN{}", actor), action, message).with_actor(actor)
    }

    fn new(source: String, action: EventAction, message: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            tick: 0,
            source,
            action,
            actor: None,
            resource: None,
            message: message.into(),
            thread: None,
            details: Value::Null,
        }
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            InterlockError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }

    /// Render the event as a text log line.
    pub fn to_text_line(&self) -> String {
        match &self.thread {
            Some(thread) => format!(
                "{} [{}] {}: {}",
                SimClock::format(self.tick),
                thread,
                self.source,
                self.message
            ),
            None => format!(
                "{} {}: {}",
                SimClock::format(self.tick),
                self.source,
                self.message
            ),
        }
    }

    fn render(&self, format: LogFormat) -> Result<String> {
        match format {
            LogFormat::Text => Ok(self.to_text_line()),
            LogFormat::Ndjson => self.to_ndjson_line(),
        }
    }
}

#[derive(Debug)]
enum Sink {
    File { path: PathBuf, file: File },
    Memory(Vec<Event>),
    Discard,
}

/// Append-only event log shared by the coordinator and every actor thread.
#[derive(Debug)]
pub struct EventLog {
    clock: SimClock,
    format: LogFormat,
    tag_thread: bool,
    echo: bool,
    sink: Mutex<Sink>,
}

impl EventLog {
    /// Log to `path`, appending. Parent directories are created on demand.
    pub fn to_file<P: AsRef<Path>>(path: P, clock: SimClock, format: LogFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                InterlockError::UserError(format!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                InterlockError::UserError(format!(
                    "failed to open log file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self::with_sink(clock, format, Sink::File { path, file }))
    }

    /// Keep events in memory; read them back with [`EventLog::events`].
    pub fn in_memory(clock: SimClock) -> Self {
        Self::with_sink(clock, LogFormat::Text, Sink::Memory(Vec::new()))
    }

    /// Drop every event (the clock still advances).
    pub fn discard(clock: SimClock) -> Self {
        Self::with_sink(clock, LogFormat::Text, Sink::Discard)
    }

    fn with_sink(clock: SimClock, format: LogFormat, sink: Sink) -> Self {
        Self {
            clock,
            format,
            tag_thread: false,
            echo: false,
            sink: Mutex::new(sink),
        }
    }

    /// Also print each rendered line to stderr.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Tag each event with the name of the thread that recorded it.
    pub fn with_thread_tag(mut self, tag: bool) -> Self {
        self.tag_thread = tag;
        self
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Stamp and record an event.
    pub fn record(&self, mut event: Event) {
        if self.tag_thread {
            event.thread = std::thread::current().name().map(str::to_string);
        }

        let mut sink = self.sink.lock().unwrap_or_else(|poison| poison.into_inner());
        event.tick = self.clock.tick();
        event.ts = Utc::now();

        if self.echo {
            eprintln!("{}", event.to_text_line());
        }

        match &mut *sink {
            Sink::File { path, file } => {
                let written = event
                    .render(self.format)
                    .and_then(|line| {
                        writeln!(file, "{}", line).map_err(|e| {
                            InterlockError::UserError(format!(
                                "failed to write event to '{}': {}",
                                path.display(),
                                e
                            ))
                        })
                    });
                if let Err(e) = written {
                    eprintln!("Warning: {}", e);
                }
            }
            Sink::Memory(events) => events.push(event),
            Sink::Discard => {}
        }
    }

    /// Events held by an in-memory log. Empty for other sinks.
    pub fn events(&self) -> Vec<Event> {
        let sink = self.sink.lock().unwrap_or_else(|poison| poison.into_inner());
        match &*sink {
            Sink::Memory(events) => events.clone(),
            _ => Vec::new(),
        }
    }

    /// Flush a file sink to disk.
    pub fn flush(&self) -> Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Sink::File { path, file } = &mut *sink {
            file.flush().map_err(|e| {
                InterlockError::UserError(format!(
                    "failed to flush log file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_clock_format() {
        assert_eq!(SimClock::format(0), "[00:00:00]");
        assert_eq!(SimClock::format(61), "[00:01:01]");
        assert_eq!(SimClock::format(3_725), "[01:02:05]");
    }

    #[test]
    fn test_clock_is_shared_between_clones() {
        let clock = SimClock::new();
        let other = clock.clone();
        assert_eq!(clock.tick(), 1);
        assert_eq!(other.tick(), 2);
        assert_eq!(clock.now(), 2);
    }

    #[test]
    fn test_train_event_sets_source_and_actor() {
        let event = Event::train(3, EventAction::AcquireRequested, "Sent ACQUIRE for A")
            .with_resource("A");
        assert_eq!(event.source, "TRAIN3");
        assert_eq!(event.actor, Some(3));
        assert_eq!(event.resource.as_deref(), Some("A"));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::server(EventAction::DeadlockDetected, "Deadlock detected.")
            .with_details(json!({"stuck": [1, 2]}));

        let json_line = event.to_ndjson_line().unwrap();
        assert!(!json_line.contains('\n'));
        assert!(json_line.contains("\"deadlock_detected\""));

        let parsed: Event = serde_json::from_str(&json_line).unwrap();
        assert_eq!(parsed.action, EventAction::DeadlockDetected);
        assert_eq!(parsed.details["stuck"][1], 2);
    }

    #[test]
    fn test_event_without_actor_omits_field() {
        let json_line = Event::server(EventAction::Shutdown, "bye")
            .to_ndjson_line()
            .unwrap();
        let parsed: Value = serde_json::from_str(&json_line).unwrap();
        assert!(parsed.get("actor").is_none());
        assert!(parsed.get("details").is_none());
    }

    #[test]
    fn test_memory_log_stamps_ticks_in_order() {
        let log = EventLog::in_memory(SimClock::new());
        log.record(Event::server(EventAction::Initialized, "Initialized intersections"));
        log.record(Event::train(1, EventAction::Granted, "Granted A"));

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 1);
        assert_eq!(events[1].tick, 2);
        assert_eq!(
            events[1].to_text_line(),
            "[00:00:02] TRAIN1: Granted A".to_string()
        );
    }

    #[test]
    fn test_file_log_text_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("simulation.log");

        let log = EventLog::to_file(&path, SimClock::new(), LogFormat::Text).unwrap();
        log.record(Event::server(EventAction::Initialized, "Initialized intersections"));
        log.record(Event::server(EventAction::SimulationComplete, "Simulation complete."));
        log.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[00:00:01] SERVER: Initialized intersections",
                "[00:00:02] SERVER: Simulation complete."
            ]
        );
    }

    #[test]
    fn test_file_log_ndjson_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.ndjson");

        {
            let log = EventLog::to_file(&path, SimClock::new(), LogFormat::Ndjson).unwrap();
            log.record(Event::server(EventAction::Initialized, "first"));
        }
        {
            let log = EventLog::to_file(&path, SimClock::new(), LogFormat::Ndjson).unwrap();
            log.record(Event::train(2, EventAction::RouteCompleted, "Completed route."));
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Event = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, EventAction::RouteCompleted);
        assert_eq!(second.actor, Some(2));
    }

    #[test]
    fn test_thread_tag() {
        let log = EventLog::in_memory(SimClock::new()).with_thread_tag(true);
        let handle = std::thread::Builder::new()
            .name("train-5".to_string())
            .spawn(move || {
                log.record(Event::train(5, EventAction::Granted, "Granted B"));
                log
            })
            .unwrap();
        let log = handle.join().unwrap();
        let events = log.events();
        assert_eq!(events[0].thread.as_deref(), Some("train-5"));
        assert_eq!(events[0].to_text_line(), "[00:00:01] [train-5] TRAIN5: Granted B");
    }
}
