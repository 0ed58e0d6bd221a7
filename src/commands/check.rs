//! Implementation of the `interlock check` command.
//!
//! Parses both input files, cross-checks them, and prints what a run would
//! start with. Nothing is simulated and no log is written.

use super::{print_warnings, resolve_config};
use crate::cli::CheckArgs;
use crate::error::Result;
use crate::parser;

/// Execute the `interlock check` command.
pub fn cmd_check(args: CheckArgs) -> Result<()> {
    let config = resolve_config(&args.input)?;
    let inputs = parser::load_inputs(&config)?;
    print_warnings(&inputs.warnings);

    let table = inputs.table();
    println!("Intersections ({}):", table.len());
    for (_, resource) in table.iter() {
        println!(
            "  {:<20} capacity {:>2}  {}",
            resource.name,
            resource.capacity,
            resource.kind()
        );
    }
    println!();

    println!("Trains ({}):", inputs.routes.len());
    for route in &inputs.routes {
        println!(
            "  {:>3} {:<16} {}",
            route.actor,
            route.name,
            route.route.join(" -> ")
        );
    }
    println!();

    if inputs.warnings.is_empty() {
        println!("Inputs are valid.");
    } else {
        println!(
            "Inputs are usable; {} line(s) were skipped.",
            inputs.warnings.len()
        );
    }
    Ok(())
}
