use crate::graph::{is_connected, Config, Graph};
use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::warn;

/// A bundled MAPF problem: a graph plus per-agent start/goal vertices.
/// Constructed either from a map file + scenario file (`from_files`) or
/// directly from index lists (`from_graph`), the latter mirroring the
/// reference test suite's raw-index constructor.
#[derive(Debug, Clone)]
pub struct Instance {
    pub graph: Graph,
    pub starts: Config,
    pub goals: Config,
    pub n: usize,
}

impl Instance {
    /// Builds an instance from an already-parsed graph and raw vertex id
    /// lists, validating it before returning.
    pub fn from_graph(graph: Graph, starts: Config, goals: Config) -> Result<Self> {
        let n = starts.len();
        let instance = Instance {
            graph,
            starts,
            goals,
            n,
        };
        instance.validate()?;
        Ok(instance)
    }

    /// Builds an instance from a map file and a `.scen` file, taking the
    /// first `n` rows of the scenario in file order (the reference
    /// implementation's `Instance(scen_name, map_name, N)` semantics --
    /// not a bucket-randomized sample, see the scenario reader below).
    pub fn from_files(map_path: &str, scen_path: &str, n: usize) -> Result<Self> {
        let graph = Graph::from_file(map_path)?;
        let routes = read_scenario(scen_path)?;
        if routes.len() < n {
            return Err(anyhow!(
                "scenario {scen_path} has only {} rows, need {n}",
                routes.len()
            ));
        }

        let mut starts = Vec::with_capacity(n);
        let mut goals = Vec::with_capacity(n);
        for route in routes.into_iter().take(n) {
            let start = graph
                .u
                .get(graph.width * route.start_y + route.start_x)
                .copied()
                .flatten()
                .with_context(|| {
                    format!(
                        "scenario start ({}, {}) is blocked or out of bounds",
                        route.start_x, route.start_y
                    )
                })?;
            let goal = graph
                .u
                .get(graph.width * route.goal_y + route.goal_x)
                .copied()
                .flatten()
                .with_context(|| {
                    format!(
                        "scenario goal ({}, {}) is blocked or out of bounds",
                        route.goal_x, route.goal_y
                    )
                })?;
            starts.push(start);
            goals.push(goal);
        }

        Instance::from_graph(graph, starts, goals)
    }

    /// Structural validity: equal-length start/goal lists sized `n`, every
    /// vertex id in range. Does *not* require per-agent start-goal
    /// connectivity -- an unreachable goal is a solver-time failure (an
    /// empty plan), not a construction-time error.
    pub fn is_valid(&self) -> bool {
        if self.starts.len() != self.n || self.goals.len() != self.n {
            return false;
        }
        let size = self.graph.size();
        if self.starts.iter().any(|&v| v >= size) || self.goals.iter().any(|&v| v >= size) {
            return false;
        }
        true
    }

    fn validate(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(anyhow!(
                "instance is malformed: {} starts, {} goals, n={}, graph has {} vertices",
                self.starts.len(),
                self.goals.len(),
                self.n,
                self.graph.size()
            ));
        }
        if !is_connected(&self.graph) {
            warn!("map graph is not fully connected; some instances on it may be unsolvable");
        }
        Ok(())
    }
}

struct Route {
    start_x: usize,
    start_y: usize,
    goal_x: usize,
    goal_y: usize,
}

/// Parses a MovingAI-format `.scen` file: a `version` header line followed
/// by rows of `bucket map width height start_x start_y goal_x goal_y
/// optimal_length`, in file order.
fn read_scenario(path: &str) -> Result<Vec<Route>> {
    let file = File::open(path).with_context(|| format!("opening scenario file {path}"))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let _version = lines
        .next()
        .with_context(|| format!("scenario file {path} is empty"))??;

    let mut routes = Vec::new();
    for line in lines {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            return Err(anyhow!("malformed scenario row in {path}: {line}"));
        }
        routes.push(Route {
            start_x: parts[4].parse().context("start_x is not an integer")?,
            start_y: parts[5].parse().context("start_y is not an integer")?,
            goal_x: parts[6].parse().context("goal_x is not an integer")?,
            goal_y: parts[7].parse().context("goal_y is not an integer")?,
        });
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const EMPTY_8X8: &str = "type octile\nheight 8\nwidth 8\nmap\n........\n........\n........\n........\n........\n........\n........\n........\n";

    #[test]
    fn raw_index_construction_mirrors_reference_test_style() {
        let f = write_tmp(EMPTY_8X8);
        let graph = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        let instance = Instance::from_graph(graph, vec![0, 63], vec![63, 0]).unwrap();
        assert_eq!(instance.n, 2);
        assert!(instance.is_valid());
    }

    #[test]
    fn out_of_bounds_goal_is_rejected() {
        let f = write_tmp(EMPTY_8X8);
        let graph = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        assert!(Instance::from_graph(graph, vec![0], vec![999]).is_err());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let f = write_tmp(EMPTY_8X8);
        let graph = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        assert!(Instance::from_graph(graph, vec![0, 1], vec![2]).is_err());
    }

    #[test]
    fn scenario_file_is_read_in_file_order() {
        let map_f = write_tmp(EMPTY_8X8);
        let scen = "version 1\n\
                     0\tmap.map\t8\t8\t0\t0\t7\t7\t9.9\n\
                     0\tmap.map\t8\t8\t1\t0\t6\t7\t9.9\n";
        let scen_f = write_tmp(scen);

        let instance =
            Instance::from_files(map_f.path().to_str().unwrap(), scen_f.path().to_str().unwrap(), 2)
                .unwrap();
        assert_eq!(instance.n, 2);
        assert_eq!(instance.starts[0], 0);
        assert_eq!(instance.goals[0], 63);
        assert_eq!(instance.starts[1], 1);
    }

    #[test]
    fn requesting_more_agents_than_scenario_rows_errors() {
        let map_f = write_tmp(EMPTY_8X8);
        let scen = "version 1\n0\tmap.map\t8\t8\t0\t0\t7\t7\t9.9\n";
        let scen_f = write_tmp(scen);
        assert!(Instance::from_files(
            map_f.path().to_str().unwrap(),
            scen_f.path().to_str().unwrap(),
            5
        )
        .is_err());
    }
}
