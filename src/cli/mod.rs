//! CLI argument parsing for interlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::config::RouteMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Interlock: train and intersection simulation with deadlock detection and
/// recovery.
///
/// Trains run as threads and request intersections from a single coordinator.
/// Every decision runs a Banker's-style reduction over the allocation and
/// request matrices; a detected deadlock is broken by terminating the train
/// holding the most intersections.
#[derive(Parser, Debug)]
#[command(name = "interlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for interlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the simulation.
    ///
    /// Parses the intersections and trains files, starts one thread per train,
    /// and writes every coordination decision to the event log.
    Run(RunArgs),

    /// Parse and validate the input files without running anything.
    Check(CheckArgs),

    /// Run the deadlock detector on a matrix file.
    ///
    /// The file is YAML or JSON with `allocation`, `request` and `available`
    /// (and optionally `actors`).
    Detect(DetectArgs),

    /// Write a default `interlock.yaml` to the current directory.
    Init(InitArgs),
}

/// Options shared by commands that read the input files.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Config file (default: ./interlock.yaml if present).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Intersections file, overrides `resources_file`.
    #[arg(long)]
    pub resources: Option<PathBuf>,

    /// Trains file, overrides `routes_file`.
    #[arg(long)]
    pub routes: Option<PathBuf>,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Event log file, overrides `log_file`.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// How trains walk their routes, overrides `route_mode`.
    #[arg(long, value_enum)]
    pub mode: Option<RouteMode>,

    /// Milliseconds a train holds an intersection, overrides `hold_ms`.
    #[arg(long)]
    pub hold_ms: Option<u64>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `check` command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Arguments for the `detect` command.
#[derive(Parser, Debug)]
pub struct DetectArgs {
    /// YAML or JSON file holding the matrices.
    pub file: PathBuf,

    /// Print the analysis as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `init` command.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `interlock.yaml`.
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_minimal() {
        let cli = Cli::try_parse_from(["interlock", "run"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert!(args.input.config.is_none());
            assert!(args.mode.is_none());
            assert!(args.hold_ms.is_none());
            assert!(!args.json);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_full() {
        let cli = Cli::try_parse_from([
            "interlock",
            "run",
            "--config",
            "sim.yaml",
            "--resources",
            "data/intersections.txt",
            "--routes",
            "data/trains.txt",
            "--log",
            "out.log",
            "--mode",
            "step_wise",
            "--hold-ms",
            "25",
            "--json",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.input.config, Some(PathBuf::from("sim.yaml")));
            assert_eq!(
                args.input.resources,
                Some(PathBuf::from("data/intersections.txt"))
            );
            assert_eq!(args.input.routes, Some(PathBuf::from("data/trains.txt")));
            assert_eq!(args.log, Some(PathBuf::from("out.log")));
            assert_eq!(args.mode, Some(RouteMode::StepWise));
            assert_eq!(args.hold_ms, Some(25));
            assert!(args.json);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_rejects_unknown_mode() {
        let result = Cli::try_parse_from(["interlock", "run", "--mode", "teleport"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["interlock", "check", "--routes", "t.txt"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert_eq!(args.input.routes, Some(PathBuf::from("t.txt")));
            assert!(args.input.resources.is_none());
        } else {
            panic!("Expected Check command");
        }
    }

    #[test]
    fn parse_detect_requires_file() {
        assert!(Cli::try_parse_from(["interlock", "detect"]).is_err());

        let cli = Cli::try_parse_from(["interlock", "detect", "state.yaml", "--json"]).unwrap();
        if let Command::Detect(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("state.yaml"));
            assert!(args.json);
        } else {
            panic!("Expected Detect command");
        }
    }

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["interlock", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(InitArgs { force: false })));

        let cli = Cli::try_parse_from(["interlock", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Command::Init(InitArgs { force: true })));
    }
}
