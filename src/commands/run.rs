//! Implementation of the `interlock run` command.

use super::{print_warnings, resolve_config};
use crate::cli::RunArgs;
use crate::config::{Config, RouteMode};
use crate::error::{InterlockError, Result};
use crate::events::{EventLog, SimClock};
use crate::parser;
use crate::simulation::{self, SimulationOptions, SimulationReport};
use std::sync::Arc;

/// Execute the `interlock run` command.
///
/// Deadlocks are expected and resolved during the run; the command fails only
/// if the inputs are unusable, a thread dies, or the final state is
/// inconsistent.
pub fn cmd_run(args: RunArgs) -> Result<()> {
    let config = apply_overrides(resolve_config(&args.input)?, &args);
    let inputs = parser::load_inputs(&config)?;
    print_warnings(&inputs.warnings);

    let log = EventLog::to_file(&config.log_file, SimClock::new(), config.log_format)?
        .with_echo(config.echo_log)
        .with_thread_tag(config.tag_thread);
    let report = simulation::run(&inputs, SimulationOptions::from(&config), Arc::new(log))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| {
            InterlockError::UserError(format!("failed to serialize report: {}", e))
        })?;
        println!("{}", json);
    } else {
        print_report(&report, &config);
    }

    if !report.invariant_violations.is_empty() {
        return Err(InterlockError::SimulationError(format!(
            "final state is inconsistent: {}",
            report.invariant_violations.join("; ")
        )));
    }
    Ok(())
}

fn apply_overrides(mut config: Config, args: &RunArgs) -> Config {
    if let Some(path) = &args.log {
        config.log_file = path.display().to_string();
    }
    if let Some(mode) = args.mode {
        config.route_mode = mode;
    }
    if let Some(hold_ms) = args.hold_ms {
        config.hold_ms = hold_ms;
    }
    config
}

fn print_report(report: &SimulationReport, config: &Config) {
    println!("Simulation complete ({}).", report.mode);
    println!();
    println!("  Completed:          {}", join_ids(&report.completed));
    println!("  Victims:            {}", join_ids(&report.victims));
    println!("  Deadlocks detected: {}", report.deadlocks_detected);
    if report.unresolved_deadlocks > 0 {
        println!("  Unresolved:         {}", report.unresolved_deadlocks);
    }
    println!("  Protocol errors:    {}", report.protocol_violations);
    println!("  Grants / releases:  {} / {}", report.grants, report.releases);
    println!("  Simulated time:     {}", SimClock::format(report.final_tick));
    println!();

    if !report.all_released() {
        println!("Still held:");
        for (name, holders) in &report.holders {
            if !holders.is_empty() {
                println!("  {:<20} {}", name, join_ids(holders));
            }
        }
        println!();
    }

    println!("Event log: {}", config.log_file);
}

fn join_ids(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| format!("Train{}", id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::InputArgs;

    fn run_args() -> RunArgs {
        RunArgs {
            input: InputArgs::default(),
            log: None,
            mode: None,
            hold_ms: None,
            json: false,
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = RunArgs {
            log: Some("out/run.log".into()),
            mode: Some(RouteMode::StepWise),
            hold_ms: Some(1),
            ..run_args()
        };
        let config = apply_overrides(Config::default(), &args);
        assert_eq!(config.log_file, "out/run.log");
        assert_eq!(config.route_mode, RouteMode::StepWise);
        assert_eq!(config.hold_ms, 1);
    }

    #[test]
    fn absent_overrides_keep_config_values() {
        let config = apply_overrides(Config::default(), &run_args());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn ids_render_as_train_names() {
        assert_eq!(join_ids(&[]), "-");
        assert_eq!(join_ids(&[1, 3]), "Train1, Train3");
    }
}
