use anyhow::{bail, Context, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Dense id for a vertex, `0..graph.size()`.
pub type VertexId = usize;

/// Joint position of all agents at one timestep: `Config[i]` is agent `i`'s vertex.
pub type Config = Vec<VertexId>;

/// A single agent's path: one vertex per timestep.
pub type Path = Vec<VertexId>;

/// A full plan: one `Config` per timestep, `Solution[0]` are the starts.
pub type Solution = Vec<Config>;

/// A walkable grid cell. Immutable once the graph is built, except for
/// `actions`, which the high-level searcher shuffles in place (see
/// `Lacam`'s main loop) -- the shuffle is intentionally visible to every
/// other agent that reads this vertex's action list afterward.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    /// `width * y + x` in the source grid.
    pub index: usize,
    pub x: usize,
    pub y: usize,
    pub neighbors: Vec<VertexId>,
    actions: RefCell<Vec<VertexId>>,
}

impl Vertex {
    pub fn actions(&self) -> Vec<VertexId> {
        self.actions.borrow().clone()
    }

    pub(crate) fn shuffle_actions<R: rand::Rng + ?Sized>(&self, rng: &mut R) {
        use rand::seq::SliceRandom;
        self.actions.borrow_mut().shuffle(rng);
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    /// Non-blocked vertices, dense and ordered by id.
    pub vertices: Vec<Vertex>,
    /// `width * height` slots, `None` where blocked.
    pub u: Vec<Option<VertexId>>,
    pub width: usize,
    pub height: usize,
}

impl Graph {
    pub fn size(&self) -> usize {
        self.vertices.len()
    }

    pub fn manhattan(&self, a: VertexId, b: VertexId) -> usize {
        let va = &self.vertices[a];
        let vb = &self.vertices[b];
        va.x.abs_diff(vb.x) + va.y.abs_diff(vb.y)
    }

    /// Parses a MovingAI-style map: `type ...`, `height H`, `width W`, `map`,
    /// then H rows of W characters. `.` is walkable; `T`/`@` and anything
    /// else is blocked. Vertex ids are assigned in row-major scan order over
    /// the non-blocked cells, matching the reference lacam implementation --
    /// this is why a map's first walkable cell does not necessarily get the
    /// neighbor ids one would expect from its grid index.
    pub fn from_file(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening map file {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let _type = lines
            .next()
            .context("map file missing type line")??;
        let height: usize = lines
            .next()
            .context("map file missing height line")??
            .split_whitespace()
            .last()
            .context("malformed height line")?
            .parse()
            .context("height is not an integer")?;
        let width: usize = lines
            .next()
            .context("map file missing width line")??
            .split_whitespace()
            .last()
            .context("malformed width line")?
            .parse()
            .context("width is not an integer")?;
        let _map_marker = lines.next().context("map file missing 'map' line")??;

        let mut u = vec![None; width * height];
        let mut vertices = Vec::new();

        for y in 0..height {
            let row = lines
                .next()
                .with_context(|| format!("map file missing row {y}"))??;
            let row: Vec<char> = row.chars().collect();
            for x in 0..width {
                let ch = row.get(x).copied().unwrap_or('@');
                if ch == 'T' || ch == '@' {
                    continue;
                }
                let id = vertices.len();
                let index = width * y + x;
                vertices.push(Vertex {
                    id,
                    index,
                    x,
                    y,
                    neighbors: Vec::new(),
                    actions: RefCell::new(Vec::new()),
                });
                u[index] = Some(id);
            }
        }

        if vertices.is_empty() {
            bail!("map file {path} has no walkable cells");
        }

        // Edges: left, right, down, up -- fixed order, determinism depends on it.
        let mut neighbor_lists: Vec<Vec<VertexId>> = vec![Vec::new(); vertices.len()];
        for y in 0..height {
            for x in 0..width {
                let Some(v_id) = u[width * y + x] else {
                    continue;
                };
                let mut neighbors = Vec::new();
                if x > 0 {
                    if let Some(n) = u[width * y + (x - 1)] {
                        neighbors.push(n);
                    }
                }
                if x < width - 1 {
                    if let Some(n) = u[width * y + (x + 1)] {
                        neighbors.push(n);
                    }
                }
                if y < height - 1 {
                    if let Some(n) = u[width * (y + 1) + x] {
                        neighbors.push(n);
                    }
                }
                if y > 0 {
                    if let Some(n) = u[width * (y - 1) + x] {
                        neighbors.push(n);
                    }
                }
                neighbor_lists[v_id] = neighbors;
            }
        }

        for (v, neighbors) in vertices.iter_mut().zip(neighbor_lists.into_iter()) {
            let mut actions = neighbors.clone();
            actions.push(v.id);
            v.neighbors = neighbors;
            v.actions = RefCell::new(actions);
        }

        Ok(Graph {
            vertices,
            u,
            width,
            height,
        })
    }
}

/// One-shot BFS reachability check from `vertices[0]`. Graphs are not
/// required to be connected (see `Instance`), but this is a cheap sanity
/// check worth logging.
pub fn is_connected(g: &Graph) -> bool {
    if g.vertices.is_empty() {
        return true;
    }
    let mut closed = vec![false; g.size()];
    let mut open = VecDeque::new();
    open.push_back(0usize);
    let mut cnt = 0;
    while let Some(u) = open.pop_front() {
        if closed[u] {
            continue;
        }
        closed[u] = true;
        cnt += 1;
        for &v in &g.vertices[u].neighbors {
            if !closed[v] {
                open.push_back(v);
            }
        }
    }
    cnt == g.size()
}

/// Pointwise id equality between two configurations.
pub fn is_same_config(c1: &Config, c2: &Config) -> bool {
    c1.len() == c2.len() && c1.iter().zip(c2.iter()).all(|(a, b)| a == b)
}

/// Order-sensitive fold of agent-indexed vertex ids, mirroring the
/// reference implementation's `ConfigHasher` (boost::hash_combine-style).
/// Does not depend on any object address -- only on `VertexId`s, which are
/// dense integers assigned at graph-construction time. `Config` is a plain
/// `Vec<usize>` in this crate, so `std::collections::HashMap<Config, _>`
/// (used for the high-level search's transposition table) already hashes
/// structurally without needing this function; it's kept as a public
/// utility for callers that want a stable, cheap fingerprint without
/// pulling in a whole `Config` as a map key.
pub fn config_hash(c: &Config) -> u64 {
    let mut hash = c.len() as u64;
    for &v in c {
        hash ^= (v as u64)
            .wrapping_add(0x9e3779b9)
            .wrapping_add(hash << 6)
            .wrapping_add(hash >> 2);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_map(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const EMPTY_8X8: &str = "type octile\nheight 8\nwidth 8\nmap\n........\n........\n........\n........\n........\n........\n........\n........\n";

    #[test]
    fn empty_grid_dimensions_and_neighbors() {
        let f = write_map(EMPTY_8X8);
        let g = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(g.width, 8);
        assert_eq!(g.height, 8);
        assert_eq!(g.size(), 64);
        // vertex 0 is (0,0): only right (1) and down (8) neighbors.
        let mut ns = g.vertices[0].neighbors.clone();
        ns.sort();
        assert_eq!(ns, vec![1, 8]);
        assert_eq!(g.vertices[0].actions(), vec![1, 8, 0]);
    }

    #[test]
    fn blocked_cells_are_not_vertices() {
        let map = "type octile\nheight 3\nwidth 3\nmap\n.T.\n...\n.@.\n";
        let f = write_map(map);
        let g = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(g.size(), 7);
        assert!(g.u[1].is_none()); // 'T' at (1,0)
        assert!(g.u[7].is_none()); // '@' at (1,2)
    }

    #[test]
    fn connectivity_check() {
        let f = write_map(EMPTY_8X8);
        let g = Graph::from_file(f.path().to_str().unwrap()).unwrap();
        assert!(is_connected(&g));

        // Two disjoint 1x1 islands split by a wall down the middle column.
        let split = "type octile\nheight 1\nwidth 3\nmap\n.T.\n";
        let f2 = write_map(split);
        let g2 = Graph::from_file(f2.path().to_str().unwrap()).unwrap();
        assert!(!is_connected(&g2));
    }

    #[test]
    fn config_equality_and_hash_consistency() {
        let a: Config = vec![1, 2, 3];
        let b: Config = vec![1, 2, 3];
        let c: Config = vec![3, 2, 1];
        assert!(is_same_config(&a, &b));
        assert_eq!(config_hash(&a), config_hash(&b));
        assert!(!is_same_config(&a, &c));
        assert_ne!(config_hash(&a), config_hash(&c));
    }
}
