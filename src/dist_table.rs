use crate::graph::{Graph, VertexId};
use std::collections::VecDeque;

/// For each agent `i`, shortest-path distance (in edges) from any vertex to
/// `goals[i]`. Entries start at the sentinel `graph.size()` ("not yet
/// known") and only ever decrease -- once set below sentinel they are the
/// true distance and never change again.
pub struct DistTable<'g> {
    graph: &'g Graph,
    sentinel: usize,
    table: Vec<Vec<usize>>,
    /// Lazy-mode BFS frontiers, one per agent; empty/unused in eager mode.
    frontiers: Vec<VecDeque<VertexId>>,
}

impl<'g> DistTable<'g> {
    /// `multi_thread_init = true` eagerly floods every agent's goal to
    /// completion (one OS thread per agent, joined before returning).
    /// `false` builds lazy per-agent frontiers that are advanced on demand
    /// in `get`. Both modes are observationally equivalent: a value
    /// returned by the lazy mode is always the same value the eager mode
    /// would have computed for that (agent, vertex) pair.
    pub fn new(graph: &'g Graph, goals: &[VertexId], multi_thread_init: bool) -> Self {
        let k = graph.size();
        let n = goals.len();
        let sentinel = k;

        if multi_thread_init {
            let table = std::thread::scope(|scope| {
                let handles: Vec<_> = goals
                    .iter()
                    .map(|&goal| scope.spawn(move || Self::bfs_full(graph, goal, sentinel)))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            DistTable {
                graph,
                sentinel,
                table,
                frontiers: Vec::new(),
            }
        } else {
            let mut table = vec![vec![sentinel; k]; n];
            let mut frontiers = Vec::with_capacity(n);
            for (i, &goal) in goals.iter().enumerate() {
                table[i][goal] = 0;
                let mut frontier = VecDeque::new();
                frontier.push_back(goal);
                frontiers.push(frontier);
            }
            DistTable {
                graph,
                sentinel,
                table,
                frontiers,
            }
        }
    }

    fn bfs_full(graph: &Graph, goal: VertexId, sentinel: usize) -> Vec<usize> {
        let mut dist = vec![sentinel; graph.size()];
        dist[goal] = 0;
        let mut open = VecDeque::new();
        open.push_back(goal);
        while let Some(n) = open.pop_front() {
            let d_n = dist[n];
            for &m in &graph.vertices[n].neighbors {
                if d_n + 1 >= dist[m] {
                    continue;
                }
                dist[m] = d_n + 1;
                open.push_back(m);
            }
        }
        dist
    }

    /// `dist(i, v)`, computing more of agent `i`'s lazy frontier if needed.
    /// Idempotent: once a value is known, repeated queries do no further work.
    pub fn get(&mut self, i: usize, v: VertexId) -> usize {
        if self.table[i][v] < self.sentinel {
            return self.table[i][v];
        }
        if self.frontiers.is_empty() {
            // eager mode and still sentinel: truly unreachable.
            return self.sentinel;
        }
        while let Some(n) = self.frontiers[i].front().copied() {
            let d_n = self.table[i][n];
            for &m in &self.graph.vertices[n].neighbors {
                if d_n + 1 >= self.table[i][m] {
                    continue;
                }
                self.table[i][m] = d_n + 1;
                self.frontiers[i].push_back(m);
            }
            self.frontiers[i].pop_front();
            if n == v {
                return d_n;
            }
        }
        self.sentinel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use std::io::Write;

    fn small_graph() -> (Graph, tempfile::NamedTempFile) {
        let map = "type octile\nheight 1\nwidth 5\nmap\n.....\n";
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(map.as_bytes()).unwrap();
        let g = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        (g, f)
    }

    #[test]
    fn eager_and_lazy_agree() {
        let (g, _f) = small_graph();
        let goals = vec![4usize];
        let mut eager = DistTable::new(&g, &goals, true);
        let mut lazy = DistTable::new(&g, &goals, false);
        for v in 0..g.size() {
            assert_eq!(eager.get(0, v), lazy.get(0, v));
        }
        assert_eq!(eager.get(0, 0), 4);
    }

    #[test]
    fn lazy_is_idempotent() {
        let (g, _f) = small_graph();
        let goals = vec![4usize];
        let mut lazy = DistTable::new(&g, &goals, false);
        let first = lazy.get(0, 2);
        let second = lazy.get(0, 2);
        assert_eq!(first, second);
        assert_eq!(first, 2);
    }

    #[test]
    fn unreachable_vertex_is_sentinel() {
        // Two islands split by a wall.
        let map = "type octile\nheight 1\nwidth 3\nmap\n.T.\n";
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(map.as_bytes()).unwrap();
        let g = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        let goals = vec![0usize]; // vertex 0 is (0,0)
        let mut lazy = DistTable::new(&g, &goals, false);
        // vertex 1 is (2,0), unreachable from (0,0).
        assert_eq!(lazy.get(0, 1), g.size());
    }
}
