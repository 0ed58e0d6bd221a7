//! Parsing of the intersections and trains input files.
//!
//! Both files are line oriented:
//!
//! ```text
//! # intersections.txt          # trains.txt
//! IntersectionA:1              Train1:IntersectionA,IntersectionB
//! IntersectionB:2              Train2:IntersectionB, IntersectionA
//! ```
//!
//! Blank lines and `#` comments are skipped. Malformed lines are skipped and
//! reported as warnings; only whole-input problems (unreadable file, nothing
//! usable, a route through an unknown intersection) are errors.

use crate::config::Config;
use crate::error::{InterlockError, Result};
use crate::table::{ActorId, ResourceTable};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("Invalid name regex"));

/// One intersection definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    pub name: String,
    pub capacity: u32,
}

/// One train and the intersections it visits, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSpec {
    /// Assigned `1..=n` in file order.
    pub actor: ActorId,
    pub name: String,
    pub route: Vec<String>,
}

/// Parsed entries plus the lines that were skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome<T> {
    pub items: Vec<T>,
    pub warnings: Vec<String>,
}

/// Both input files, parsed and cross-checked.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub resources: Vec<ResourceSpec>,
    pub routes: Vec<RouteSpec>,
    pub warnings: Vec<String>,
}

impl Inputs {
    /// Build a fresh resource table from the parsed intersections.
    pub fn table(&self) -> ResourceTable {
        ResourceTable::new(self.resources.iter().map(|r| (r.name.as_str(), r.capacity)))
    }

    pub fn actors(&self) -> Vec<ActorId> {
        self.routes.iter().map(|r| r.actor).collect()
    }
}

/// Returns true if `name` is usable as an intersection or train name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

/// Significant lines with their 1-based line numbers.
fn content_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse intersection definitions of the form `Name:capacity`.
///
/// A name defined twice keeps its last capacity.
pub fn parse_resources_str(content: &str, max_capacity: u32) -> ParseOutcome<ResourceSpec> {
    let mut items: Vec<ResourceSpec> = Vec::new();
    let mut warnings = Vec::new();

    for (line_no, line) in content_lines(content) {
        let Some((name, capacity)) = line.split_once(':') else {
            warnings.push(format!("line {}: skipping invalid line '{}'", line_no, line));
            continue;
        };
        let name = name.trim();
        if !is_valid_name(name) {
            warnings.push(format!(
                "line {}: skipping intersection with invalid name '{}'",
                line_no, name
            ));
            continue;
        }
        let capacity: u32 = match capacity.trim().parse() {
            Ok(c) => c,
            Err(_) => {
                warnings.push(format!(
                    "line {}: could not parse capacity for intersection '{}'",
                    line_no, name
                ));
                continue;
            }
        };
        if capacity == 0 || capacity > max_capacity {
            warnings.push(format!(
                "line {}: capacity {} for '{}' is outside 1..={}",
                line_no, capacity, name, max_capacity
            ));
            continue;
        }

        if let Some(existing) = items.iter_mut().find(|r| r.name == name) {
            warnings.push(format!(
                "line {}: intersection '{}' redefined, capacity {} replaces {}",
                line_no, name, capacity, existing.capacity
            ));
            existing.capacity = capacity;
        } else {
            items.push(ResourceSpec {
                name: name.to_string(),
                capacity,
            });
        }
    }

    ParseOutcome { items, warnings }
}

/// Parse train routes of the form `Train:R1,R2,...`.
///
/// Whitespace inside route entries is removed. Trains with an empty route are
/// skipped.
pub fn parse_routes_str(content: &str) -> ParseOutcome<RouteSpec> {
    let mut items: Vec<RouteSpec> = Vec::new();
    let mut warnings = Vec::new();

    for (line_no, line) in content_lines(content) {
        let Some((name, route)) = line.split_once(':') else {
            warnings.push(format!("line {}: skipping invalid line '{}'", line_no, line));
            continue;
        };
        let name = name.trim();
        if !is_valid_name(name) {
            warnings.push(format!(
                "line {}: skipping train with invalid name '{}'",
                line_no, name
            ));
            continue;
        }

        let route: Vec<String> = route
            .split(',')
            .map(|entry| entry.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|entry| !entry.is_empty())
            .collect();
        if route.is_empty() {
            warnings.push(format!(
                "line {}: skipping train '{}' with an empty route",
                line_no, name
            ));
            continue;
        }

        items.push(RouteSpec {
            actor: items.len() as ActorId + 1,
            name: name.to_string(),
            route,
        });
    }

    ParseOutcome { items, warnings }
}

fn read_input(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        InterlockError::ParseError(format!(
            "failed to read {} file '{}': {}",
            what,
            path.display(),
            e
        ))
    })
}

/// Read and parse an intersections file.
pub fn read_resources<P: AsRef<Path>>(
    path: P,
    max_capacity: u32,
) -> Result<ParseOutcome<ResourceSpec>> {
    let content = read_input(path.as_ref(), "intersections")?;
    Ok(parse_resources_str(&content, max_capacity))
}

/// Read and parse a trains file.
pub fn read_routes<P: AsRef<Path>>(path: P) -> Result<ParseOutcome<RouteSpec>> {
    let content = read_input(path.as_ref(), "trains")?;
    Ok(parse_routes_str(&content))
}

/// Check that parsed inputs describe a runnable simulation.
pub fn cross_validate(
    resources: &[ResourceSpec],
    routes: &[RouteSpec],
    max_resources: usize,
) -> Result<()> {
    if resources.is_empty() || routes.is_empty() {
        return Err(InterlockError::ParseError(format!(
            "failed to parse input files: found {} intersection(s) and {} train(s)",
            resources.len(),
            routes.len()
        )));
    }

    if resources.len() > max_resources {
        return Err(InterlockError::ParseError(format!(
            "too many intersections: {} defined, at most {} allowed",
            resources.len(),
            max_resources
        )));
    }

    for train in routes {
        for entry in &train.route {
            if !resources.iter().any(|r| &r.name == entry) {
                return Err(InterlockError::ParseError(format!(
                    "train '{}' routes through unknown intersection '{}'",
                    train.name, entry
                )));
            }
        }
    }

    Ok(())
}

/// Read both input files named by `config` and cross-check them.
pub fn load_inputs(config: &Config) -> Result<Inputs> {
    let resources = read_resources(&config.resources_file, config.max_capacity)?;
    let routes = read_routes(&config.routes_file)?;

    cross_validate(&resources.items, &routes.items, config.max_resources)?;

    let mut warnings = Vec::new();
    warnings.extend(
        resources
            .warnings
            .into_iter()
            .map(|w| format!("{}: {}", config.resources_file, w)),
    );
    warnings.extend(
        routes
            .warnings
            .into_iter()
            .map(|w| format!("{}: {}", config.routes_file, w)),
    );

    Ok(Inputs {
        resources: resources.items,
        routes: routes.items,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;
    use tempfile::TempDir;

    #[test]
    fn parses_intersections() {
        let outcome = parse_resources_str("IntersectionA:1\nIntersectionB: 3\n", 10);
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            outcome.items,
            vec![
                ResourceSpec {
                    name: "IntersectionA".to_string(),
                    capacity: 1
                },
                ResourceSpec {
                    name: "IntersectionB".to_string(),
                    capacity: 3
                },
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let outcome = parse_resources_str("\n# main line\n  \nA:1\n", 10);
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn malformed_intersection_lines_become_warnings() {
        let content = "NoColon\nB:two\nC:0\nD:11\nbad name:1\nE:2\n";
        let outcome = parse_resources_str(content, 10);

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].name, "E");
        assert_eq!(outcome.warnings.len(), 5);
        assert!(outcome.warnings[0].starts_with("line 1: skipping invalid line"));
        assert!(outcome.warnings[1].contains("could not parse capacity"));
        assert!(outcome.warnings[2].contains("outside 1..=10"));
        assert!(outcome.warnings[4].contains("invalid name 'bad name'"));
    }

    #[test]
    fn redefined_intersection_keeps_last_capacity() {
        let outcome = parse_resources_str("A:1\nB:1\nA:2\n", 10);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].name, "A");
        assert_eq!(outcome.items[0].capacity, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("redefined"));
    }

    #[test]
    fn parses_routes_and_assigns_ids_in_order() {
        let content =
            "Train1:IntersectionA,IntersectionB\nTrain2: IntersectionB , Intersection A\n";
        let outcome = parse_routes_str(content);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].actor, 1);
        assert_eq!(outcome.items[0].route, vec!["IntersectionA", "IntersectionB"]);
        assert_eq!(outcome.items[1].actor, 2);
        assert_eq!(outcome.items[1].name, "Train2");
        assert_eq!(outcome.items[1].route, vec!["IntersectionB", "IntersectionA"]);
    }

    #[test]
    fn skipped_routes_do_not_consume_ids() {
        let outcome = parse_routes_str("Train1\nTrain2:\nTrain3:A\n");
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].actor, 1);
        assert_eq!(outcome.items[0].name, "Train3");
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[1].contains("empty route"));
    }

    #[test]
    fn cross_validation_rejects_unknown_intersection() {
        let resources = parse_resources_str("A:1\n", 10).items;
        let routes = parse_routes_str("Train1:A,B\n").items;

        let err = cross_validate(&resources, &routes, 50).unwrap_err();
        assert_eq!(
            err.to_string(),
            "train 'Train1' routes through unknown intersection 'B'"
        );
        assert_eq!(err.exit_code(), exit_codes::INPUT_FAILURE);
    }

    #[test]
    fn cross_validation_rejects_empty_and_oversized_inputs() {
        let resources = parse_resources_str("A:1\nB:1\n", 10).items;
        let routes = parse_routes_str("Train1:A\n").items;

        let err = cross_validate(&[], &routes, 50).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse input files"));
        assert!(cross_validate(&resources, &[], 50).is_err());

        let err = cross_validate(&resources, &routes, 1).unwrap_err();
        assert!(err.to_string().contains("too many intersections"));

        assert!(cross_validate(&resources, &routes, 2).is_ok());
    }

    #[test]
    fn load_inputs_reads_both_files() {
        let dir = TempDir::new().unwrap();
        let resources_file = dir.path().join("intersections.txt");
        let routes_file = dir.path().join("trains.txt");
        std::fs::write(&resources_file, "A:1\nB:2\nbroken\n").unwrap();
        std::fs::write(&routes_file, "Train1:A,B\nTrain2:B,A\n").unwrap();

        let config = Config {
            resources_file: resources_file.display().to_string(),
            routes_file: routes_file.display().to_string(),
            ..Config::default()
        };
        let inputs = load_inputs(&config).unwrap();

        assert_eq!(inputs.actors(), vec![1, 2]);
        assert_eq!(inputs.warnings.len(), 1);
        assert!(inputs.warnings[0].contains("intersections.txt: line 3"));

        let table = inputs.table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("B").unwrap(), 1);
        let capacities: Vec<u32> = table.iter().map(|(_, r)| r.capacity).collect();
        assert_eq!(capacities, vec![1, 2]);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = read_routes("/nonexistent/trains.txt").unwrap_err();
        assert!(err.to_string().contains("failed to read trains file"));
        assert_eq!(err.exit_code(), exit_codes::INPUT_FAILURE);
    }
}
