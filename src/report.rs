use crate::dist_table::DistTable;
use crate::graph::{is_same_config, Solution};
use crate::instance::Instance;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Independently re-checks a plan (C6): start/goal match, connectivity of
/// every move, no vertex conflicts, no swap conflicts. An empty solution
/// is trivially feasible (an honest "not solved" answer, not a defect).
/// Mirrors the reference `is_feasible_solution` exactly, including its
/// check order (so the first-found violation logged matches).
pub fn is_feasible_solution(instance: &Instance, solution: &Solution) -> bool {
    if solution.is_empty() {
        return true;
    }

    if !is_same_config(&solution[0], &instance.starts) {
        warn!("invalid starts");
        return false;
    }
    if !is_same_config(solution.last().unwrap(), &instance.goals) {
        warn!("invalid goals");
        return false;
    }

    for t in 1..solution.len() {
        for i in 0..instance.n {
            let v_i_from = solution[t - 1][i];
            let v_i_to = solution[t][i];
            if v_i_from != v_i_to && !instance.graph.vertices[v_i_to].neighbors.contains(&v_i_from)
            {
                warn!(agent = i, t, "invalid move");
                return false;
            }

            for j in (i + 1)..instance.n {
                let v_j_from = solution[t - 1][j];
                let v_j_to = solution[t][j];
                if v_j_to == v_i_to {
                    warn!(agent_i = i, agent_j = j, vertex = v_i_to, t, "vertex conflict");
                    return false;
                }
                if v_j_to == v_i_from && v_j_from == v_i_to {
                    warn!(agent_i = i, agent_j = j, t, "edge conflict");
                    return false;
                }
            }
        }
    }

    true
}

/// Makespan: number of transitions in the plan (`solution.len() - 1`).
pub fn get_makespan(solution: &Solution) -> usize {
    solution.len().saturating_sub(1)
}

/// Per-agent path cost: the last timestep at which the agent is not at its
/// goal, plus one (0 if it starts at goal and never leaves).
fn agent_cost(solution: &Solution, goal: usize, i: usize) -> usize {
    for t in (0..solution.len()).rev() {
        if solution[t][i] != goal {
            return t + 1;
        }
    }
    0
}

pub fn get_sum_of_costs(solution: &Solution, instance: &Instance) -> usize {
    (0..instance.n)
        .map(|i| agent_cost(solution, instance.goals[i], i))
        .sum()
}

/// Sum, over every transition, of the per-step edge cost (see
/// `Lacam::edge_cost`): an agent contributes 1 to a step unless it is at its
/// goal on *both* ends of that step. This is the quantity the high-level
/// search's `g` actually accumulates, so `sum_of_loss` of a returned plan
/// equals that plan's `g`. A looser measure than sum-of-costs, since it
/// keeps counting even if an agent revisits its goal after leaving.
pub fn get_sum_of_loss(solution: &Solution, instance: &Instance) -> usize {
    let mut loss = 0;
    for w in solution.windows(2) {
        let (from, to) = (&w[0], &w[1]);
        for i in 0..instance.n {
            if from[i] != instance.goals[i] || to[i] != instance.goals[i] {
                loss += 1;
            }
        }
    }
    loss
}

pub fn get_makespan_lower_bound(instance: &Instance, dist: &mut DistTable) -> usize {
    (0..instance.n)
        .map(|i| dist.get(i, instance.starts[i]))
        .max()
        .unwrap_or(0)
}

pub fn get_sum_of_costs_lower_bound(instance: &Instance, dist: &mut DistTable) -> usize {
    (0..instance.n).map(|i| dist.get(i, instance.starts[i])).sum()
}

/// Everything `make_log`/`print_stats` reported, generalized from the
/// CBS-family CSV columns the teacher's `Stats` carries to LaCAM*-family
/// ones (loop count, anytime/swap/hindrance flags instead of CBS's
/// op_*/sub_optimal flags).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub solved: bool,
    pub comp_time_ms: f64,
    pub makespan: usize,
    pub makespan_lb: usize,
    pub sum_of_costs: usize,
    pub sum_of_costs_lb: usize,
    pub sum_of_loss: usize,
    pub loop_cnt: usize,
    pub seed: u64,
}

impl Report {
    pub fn new(
        instance: &Instance,
        solution: &Solution,
        dist: &mut DistTable,
        comp_time_ms: f64,
        loop_cnt: usize,
        seed: u64,
    ) -> Self {
        Report {
            solved: !solution.is_empty(),
            comp_time_ms,
            makespan: get_makespan(solution),
            makespan_lb: get_makespan_lower_bound(instance, dist),
            sum_of_costs: get_sum_of_costs(solution, instance),
            sum_of_costs_lb: get_sum_of_costs_lower_bound(instance, dist),
            sum_of_loss: get_sum_of_loss(solution, instance),
            loop_cnt,
            seed,
        }
    }

    /// Machine-readable form of the same fields `log`/`append_csv` emit,
    /// for callers that want to pipe results into another tool rather than
    /// scrape the CSV.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn log(&self) {
        info!(
            comp_time_ms = self.comp_time_ms,
            makespan = self.makespan,
            makespan_lb = self.makespan_lb,
            sum_of_costs = self.sum_of_costs,
            sum_of_costs_lb = self.sum_of_costs_lb,
            sum_of_loss = self.sum_of_loss,
            loop_cnt = self.loop_cnt,
            "solved"
        );
    }

    /// Writes (or appends to) a CSV row, one call per solved instance, in
    /// the teacher's `stat.rs`-style append-mode convention.
    pub fn append_csv(&self, path: &Path, map_name: &str, scen_name: &str, n: usize) -> std::io::Result<()> {
        let is_new = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if is_new {
            writeln!(
                file,
                "map_name,scen_name,agents,solver,low_level,solved,loop_cnt,anytime,swap,hindrance,seed,sum_of_loss,comp_time_ms"
            )?;
        }
        writeln!(
            file,
            "{map_name},{scen_name},{n},lacam_star,pibt,{},{},{},{},{},{},{},{}",
            self.solved,
            self.loop_cnt,
            "-",
            "-",
            "-",
            self.seed,
            self.sum_of_loss,
            self.comp_time_ms,
        )?;
        Ok(())
    }
}
