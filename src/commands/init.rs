//! Implementation of the `interlock init` command.
//!
//! Writes `interlock.yaml` with every setting at its default value so it can
//! be edited in place. An existing file is left alone unless `--force` is
//! given.

use crate::cli::InitArgs;
use crate::config::{CONFIG_FILE_NAME, Config};
use crate::error::{InterlockError, Result};
use std::fs;
use std::path::Path;

/// Execute the `interlock init` command.
pub fn cmd_init(args: InitArgs) -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);
    write_default_config(path, args.force)?;

    println!("Wrote {}.", path.display());
    println!();
    println!("Next steps:");
    println!("  1. List intersections in intersections.txt (Name:capacity)");
    println!("  2. List train routes in trains.txt (Train:A,B,...)");
    println!("  3. Run `interlock check`, then `interlock run`");
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(InterlockError::UserError(format!(
            "'{}' already exists.\n\nUse `interlock init --force` to overwrite it.",
            path.display()
        )));
    }

    let yaml = Config::default().to_yaml()?;
    let content = format!(
        "# interlock configuration. Unknown keys are ignored.\n{}",
        yaml
    );
    fs::write(path, content).map_err(|e| {
        InterlockError::UserError(format!(
            "failed to write config file '{}': {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_loadable_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        write_default_config(&path, false).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "hold_ms: 1\n").unwrap();

        let err = write_default_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(Config::load(&path).unwrap().hold_ms, 1);

        write_default_config(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap().hold_ms, 100);
    }
}
