use crate::deadline::Deadline;
use crate::dist_table::DistTable;
use crate::graph::{is_same_config, Config, Graph, Solution, VertexId};
use crate::instance::Instance;
use crate::pibt::Pibt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// A partial constraint on the next joint configuration: agents in `who`
/// must land on the paired vertex in `where_`. The root `LNode` (depth 0)
/// constrains nothing.
#[derive(Debug, Clone)]
pub struct LNode {
    pub who: Vec<usize>,
    pub where_: Vec<VertexId>,
    pub depth: usize,
}

impl LNode {
    fn root() -> Self {
        LNode {
            who: Vec::new(),
            where_: Vec::new(),
            depth: 0,
        }
    }

    fn child(parent: &LNode, i: usize, v: VertexId) -> Self {
        let mut who = parent.who.clone();
        let mut where_ = parent.where_.clone();
        who.push(i);
        where_.push(v);
        LNode {
            who,
            where_,
            depth: parent.depth + 1,
        }
    }
}

/// A node of the high-level search graph, keyed by its `Config`. Owned by
/// an arena (`Lacam::arena`) and referenced by index everywhere else, since
/// `neighbors`/`parent` form a DAG (anytime rewiring reparents nodes) that
/// doesn't fit an owning tree.
pub struct HNode {
    pub q: Config,
    pub parent: Option<usize>,
    pub neighbors: HashSet<usize>,
    pub g: i64,
    pub h: i64,
    pub f: i64,
    pub depth: usize,
    pub priorities: Vec<f64>,
    pub order: Vec<usize>,
    pub search_tree: VecDeque<LNode>,
}

/// Tuning constants, set once before `solve` (see the distilled spec's §6
/// table). Kept as constructor parameters rather than process-wide statics:
/// idiomatic Rust favors threading configuration through rather than
/// mutating globals, and it lets a single process run solvers with
/// different settings concurrently without interference.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub anytime: bool,
    pub random_insert_prob1: f64,
    pub random_insert_prob2: f64,
    pub swap: bool,
    pub hindrance: bool,
    pub multi_thread_dist_init: bool,
    pub verbose: u8,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            anytime: false,
            random_insert_prob1: 0.001,
            random_insert_prob2: 0.001,
            swap: true,
            hindrance: true,
            multi_thread_dist_init: true,
            verbose: 0,
        }
    }
}

/// Outcome of a `solve` call: the plan (possibly empty if unsolved within
/// the deadline) plus diagnostics used by tests and verbose logging.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub solution: Solution,
    pub loop_cnt: usize,
    /// Cost of the best plan found, if any (`H_goal.g` in the reference).
    pub g_star: Option<i64>,
    /// `true` when OPEN emptied before the deadline (so, in anytime mode,
    /// `g_star` is provably optimal).
    pub exhausted: bool,
}

struct Lacam<'g> {
    graph: &'g Graph,
    goals: Config,
    n: usize,
    deadline: Deadline,
    rng: StdRng,
    pibt: Pibt<'g>,
    opts: SolverOptions,

    arena: Vec<HNode>,
    open: VecDeque<usize>,
    explored: HashMap<Config, usize>,
    h_goal: Option<usize>,
    loop_cnt: usize,
}

impl<'g> Lacam<'g> {
    fn new_hnode(
        &mut self,
        q: Config,
        dist: &mut DistTable,
        parent: Option<usize>,
        g: i64,
    ) -> usize {
        let h: i64 = (0..self.n).map(|i| dist.get(i, q[i]) as i64).sum();
        let depth = parent.map(|p| self.arena[p].depth + 1).unwrap_or(0);

        let mut priorities = vec![0.0f64; self.n];
        for i in 0..self.n {
            priorities[i] = match parent {
                None => dist.get(i, q[i]) as f64 / 10000.0,
                Some(p) => {
                    if dist.get(i, q[i]) != 0 {
                        self.arena[p].priorities[i] + 1.0
                    } else {
                        let pr = self.arena[p].priorities[i];
                        pr - pr.trunc()
                    }
                }
            };
        }
        let mut order: Vec<usize> = (0..self.n).collect();
        order.sort_by(|&a, &b| priorities[b].partial_cmp(&priorities[a]).unwrap());

        let mut search_tree = VecDeque::new();
        search_tree.push_back(LNode::root());

        let node = HNode {
            q,
            parent,
            neighbors: HashSet::new(),
            g,
            h,
            f: g + h,
            depth,
            priorities,
            order,
            search_tree,
        };
        let idx = self.arena.len();
        self.arena.push(node);
        if let Some(p) = parent {
            self.arena[p].neighbors.insert(idx);
        }
        idx
    }

    fn edge_cost(&self, q1: &Config, q2: &Config) -> i64 {
        let mut cost = 0;
        for i in 0..self.n {
            if q1[i] != self.goals[i] || q2[i] != self.goals[i] {
                cost += 1;
            }
        }
        cost
    }

    /// `rewrite`: no-op unless anytime. Propagates cheaper paths through
    /// the neighbors DAG with a FIFO Dijkstra relaxation -- sufficient
    /// because edge costs are non-negative integers bounded by `n`.
    fn rewrite(&mut self, dist: &mut DistTable, h_from: usize, h_to: usize) {
        let _ = dist;
        if !self.opts.anytime {
            return;
        }
        self.arena[h_from].neighbors.insert(h_to);

        let mut queue = VecDeque::new();
        queue.push_back(h_from);
        while let Some(n_from) = queue.pop_front() {
            let neighbors: Vec<usize> = self.arena[n_from].neighbors.iter().copied().collect();
            for n_to in neighbors {
                let g_val = self.arena[n_from].g
                    + self.edge_cost(&self.arena[n_from].q.clone(), &self.arena[n_to].q.clone());
                if g_val < self.arena[n_to].g {
                    self.arena[n_to].g = g_val;
                    self.arena[n_to].f = g_val + self.arena[n_to].h;
                    self.arena[n_to].parent = Some(n_from);
                    self.arena[n_to].depth = self.arena[n_from].depth + 1;
                    queue.push_back(n_to);
                    if let Some(goal_idx) = self.h_goal {
                        if self.arena[n_to].f < self.arena[goal_idx].f {
                            self.open.push_front(n_to);
                        }
                    }
                }
            }
        }
    }

    fn solve(&mut self, starts: Config, dist: &mut DistTable) -> SolveReport {
        debug!("lacam begins");
        let h_init = self.new_hnode(starts, dist, None, 0);
        self.open.push_front(h_init);
        self.explored
            .insert(self.arena[h_init].q.clone(), h_init);

        while !self.open.is_empty() && !self.deadline.is_expired() {
            self.loop_cnt += 1;

            if self.h_goal.is_some() {
                let r: f64 = self.rng.gen_range(0.0..1.0);
                if r < self.opts.random_insert_prob2 / 2.0 {
                    self.open.push_front(h_init);
                } else if r < self.opts.random_insert_prob2 {
                    let pick = self.rng.gen_range(0..self.open.len());
                    let h = self.open[pick];
                    self.open.push_front(h);
                }
            }

            let h = *self.open.front().unwrap();

            if let Some(goal_idx) = self.h_goal {
                if self.arena[h].g >= self.arena[goal_idx].g {
                    self.open.pop_front();
                    self.open.push_front(h_init);
                    continue;
                }
            }

            if self.h_goal.is_none() && is_same_config(&self.arena[h].q, &self.goals) {
                self.h_goal = Some(h);
                debug!(g = self.arena[h].g, depth = self.arena[h].depth, "found solution");
                if !self.opts.anytime {
                    break;
                }
                continue;
            }

            if self.arena[h].search_tree.is_empty() {
                self.open.pop_front();
                continue;
            }
            let l = self.arena[h].search_tree.pop_front().unwrap();

            if l.depth < self.n {
                let i = self.arena[h].order[l.depth];
                let v_from = self.arena[h].q[i];
                self.graph.vertices[v_from].shuffle_actions(&mut self.rng);
                let actions = self.graph.vertices[v_from].actions();
                for u in actions {
                    self.arena[h].search_tree.push_back(LNode::child(&l, i, u));
                }
            }

            let mut q_to: Vec<Option<VertexId>> = vec![None; self.n];
            for d in 0..l.depth {
                q_to[l.who[d]] = Some(l.where_[d]);
            }
            let q_from = self.arena[h].q.clone();
            let order = self.arena[h].order.clone();
            let ok = self
                .pibt
                .set_new_config(&mut self.rng, dist, &q_from, &mut q_to, &order);
            if !ok {
                continue;
            }
            let q_to: Config = q_to.into_iter().map(|v| v.unwrap()).collect();

            match self.explored.get(&q_to) {
                None => {
                    let g_val = self.arena[h].g + self.edge_cost(&q_from, &q_to);
                    let h_new = self.new_hnode(q_to.clone(), dist, Some(h), g_val);
                    self.open.push_front(h_new);
                    self.explored.insert(q_to, h_new);
                }
                Some(&h_known) => {
                    self.rewrite(dist, h, h_known);
                    if self.rng.gen_range(0.0..1.0) >= self.opts.random_insert_prob1 {
                        self.open.push_front(h_known);
                    } else {
                        self.open.push_front(h_init);
                    }
                }
            }
        }

        let exhausted = self.open.is_empty();
        let mut solution = Vec::new();
        let mut g_star = None;
        if let Some(goal_idx) = self.h_goal {
            g_star = Some(self.arena[goal_idx].g);
            let mut cur = Some(goal_idx);
            while let Some(idx) = cur {
                solution.push(self.arena[idx].q.clone());
                cur = self.arena[idx].parent;
            }
            solution.reverse();
        }

        SolveReport {
            solution,
            loop_cnt: self.loop_cnt,
            g_star,
            exhausted,
        }
    }
}

/// Driver entry point (C5): builds the distance oracle, runs the
/// high-level/low-level search, and returns the plan found (possibly
/// empty if the instance is unsolvable or the deadline fired first).
pub fn solve(
    instance: &Instance,
    deadline: &Deadline,
    seed: u64,
    opts: &SolverOptions,
) -> SolveReport {
    let mut dist = DistTable::new(&instance.graph, &instance.goals, opts.multi_thread_dist_init);
    let pibt = Pibt::new(
        &instance.graph,
        instance.goals.clone(),
        opts.swap,
        opts.hindrance,
    );
    let mut lacam = Lacam {
        graph: &instance.graph,
        goals: instance.goals.clone(),
        n: instance.n,
        deadline: *deadline,
        rng: StdRng::seed_from_u64(seed),
        pibt,
        opts: opts.clone(),
        arena: Vec::new(),
        open: VecDeque::new(),
        explored: HashMap::new(),
        h_goal: None,
        loop_cnt: 0,
    };
    lacam.solve(instance.starts.clone(), &mut dist)
}

/// Sanity-check a produced plan without reusing solver internals -- this is
/// intentionally independent code (C6), used both by tests and by the CLI
/// as a last gate before emitting a plan. Delegates to
/// `crate::report::is_feasible_solution` for the actual rule checks; kept
/// here only as a thin re-export so `lacam::solve`'s callers can find both
/// together.
pub use crate::report::is_feasible_solution;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::config_hash;
    use crate::instance::Instance;

    fn empty_grid(w: usize, h: usize) -> Graph {
        let mut map = format!("type octile\nheight {h}\nwidth {w}\nmap\n");
        for _ in 0..h {
            map.push_str(&".".repeat(w));
            map.push('\n');
        }
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        f.write_all(map.as_bytes()).unwrap();
        Graph::from_file(f.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn two_agent_8x8_feasible_plan() {
        let g = empty_grid(8, 8);
        let starts: Config = vec![0, 8];
        let goals: Config = vec![9, 1];
        let instance = Instance::from_graph(g, starts, goals).unwrap();

        let report = solve(&instance, &Deadline::new(2000.0), 0, &SolverOptions::default());
        assert!(!report.solution.is_empty());
        assert!(is_feasible_solution(&instance, &report.solution));
        let soc: usize = (0..instance.n)
            .map(|i| {
                report
                    .solution
                    .iter()
                    .rposition(|q| q[i] != instance.goals[i])
                    .map(|t| t + 1)
                    .unwrap_or(0)
            })
            .sum();
        assert!(soc <= 4);
    }

    #[test]
    fn three_agent_8x8_feasible_plan() {
        let g = empty_grid(8, 8);
        let starts: Config = vec![0, 5, 10];
        let goals: Config = vec![2, 4, 11];
        let instance = Instance::from_graph(g, starts, goals).unwrap();

        let report = solve(&instance, &Deadline::new(2000.0), 0, &SolverOptions::default());
        assert!(!report.solution.is_empty());
        assert!(is_feasible_solution(&instance, &report.solution));
    }

    #[test]
    fn impossible_2x1_returns_empty_plan_without_panicking() {
        let g = empty_grid(2, 1);
        let starts: Config = vec![0, 1];
        let goals: Config = vec![1, 0];
        let instance = Instance::from_graph(g, starts, goals).unwrap();

        let mut opts = SolverOptions::default();
        opts.swap = false;
        let report = solve(&instance, &Deadline::new(50.0), 4, &opts);
        assert!(report.solution.is_empty());
    }

    #[test]
    fn anytime_mode_still_yields_a_feasible_plan() {
        let g = empty_grid(8, 8);
        let starts: Config = vec![0, 5, 10, 20, 30];
        let goals: Config = vec![63, 58, 53, 43, 33];
        let instance = Instance::from_graph(g, starts, goals).unwrap();

        let mut opts = SolverOptions::default();
        opts.anytime = true;
        let report = solve(&instance, &Deadline::new(300.0), 7, &opts);
        assert!(!report.solution.is_empty());
        assert!(is_feasible_solution(&instance, &report.solution));
    }

    #[test]
    fn determinism_same_seed_same_plan_and_loop_cnt() {
        let g1 = empty_grid(8, 8);
        let g2 = empty_grid(8, 8);
        let starts: Config = vec![0, 5, 10];
        let goals: Config = vec![2, 4, 11];
        let i1 = Instance::from_graph(g1, starts.clone(), goals.clone()).unwrap();
        let i2 = Instance::from_graph(g2, starts, goals).unwrap();

        let r1 = solve(&i1, &Deadline::unbounded(), 123, &SolverOptions::default());
        let r2 = solve(&i2, &Deadline::unbounded(), 123, &SolverOptions::default());
        assert_eq!(r1.solution.len(), r2.solution.len());
        assert_eq!(r1.loop_cnt, r2.loop_cnt);
        for (a, b) in r1.solution.iter().zip(r2.solution.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn hash_is_used_consistently_in_explored_map() {
        let a: Config = vec![1, 2, 3];
        let b: Config = vec![1, 2, 3];
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn g_star_matches_sum_of_loss_of_the_returned_plan() {
        let g = empty_grid(8, 8);
        let starts: Config = vec![0, 5, 10];
        let goals: Config = vec![2, 4, 11];
        let instance = Instance::from_graph(g, starts, goals).unwrap();

        let report = solve(&instance, &Deadline::new(2000.0), 0, &SolverOptions::default());
        assert!(!report.solution.is_empty());
        let loss = crate::report::get_sum_of_loss(&report.solution, &instance);
        assert_eq!(report.g_star, Some(loss as i64));
    }
}
