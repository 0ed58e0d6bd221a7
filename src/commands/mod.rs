//! Command implementations for interlock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the config resolution shared by `run` and `check`.

mod check;
mod detect;
mod init;
mod run;

use crate::cli::{Command, InputArgs};
use crate::config::Config;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run::cmd_run(args),
        Command::Check(args) => check::cmd_check(args),
        Command::Detect(args) => detect::cmd_detect(args),
        Command::Init(args) => init::cmd_init(args),
    }
}

/// Load the config and apply the input file overrides from the command line.
fn resolve_config(input: &InputArgs) -> Result<Config> {
    let mut config = Config::resolve(input.config.as_deref())?;
    if let Some(path) = &input.resources {
        config.resources_file = path.display().to_string();
    }
    if let Some(path) = &input.routes {
        config.routes_file = path.display().to_string();
    }
    config.validate()?;
    Ok(config)
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn command_line_paths_override_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("interlock.yaml");
        std::fs::write(
            &config_path,
            "resources_file: a.txt\nroutes_file: b.txt\nhold_ms: 3\n",
        )
        .unwrap();

        let input = InputArgs {
            config: Some(config_path.clone()),
            resources: Some(PathBuf::from("override.txt")),
            routes: None,
        };
        let config = resolve_config(&input).unwrap();
        assert_eq!(config.resources_file, "override.txt");
        assert_eq!(config.routes_file, "b.txt");
        assert_eq!(config.hold_ms, 3);
    }
}
