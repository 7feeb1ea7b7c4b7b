//! Cluster adjacency-and-cost graph and gateway (first-hop) resolution
//! (spec §4.10).

pub const INFINITY: u8 = u8::MAX;

/// `M` vertices, symmetric edge costs, per-vertex costs, and a validity
/// bitmap (an invalid vertex can't be used as an intermediate hop or as a
/// reachable destination).
pub struct AdjacencyGraph<const M: usize> {
    edges: [[u8; M]; M],
    vertex_cost: [u8; M],
    valid: [bool; M],
}

impl<const M: usize> AdjacencyGraph<M> {
    pub fn new() -> Self {
        let mut edges = [[INFINITY; M]; M];
        for i in 0..M {
            edges[i][i] = 0;
        }
        Self { edges, vertex_cost: [0; M], valid: [true; M] }
    }

    pub fn set_edge(&mut self, a: usize, b: usize, cost: u8) {
        self.edges[a][b] = cost;
        self.edges[b][a] = cost;
    }

    pub fn set_vertex_cost(&mut self, v: usize, cost: u8) {
        self.vertex_cost[v] = cost;
    }

    pub fn set_valid(&mut self, v: usize, valid: bool) {
        self.valid[v] = valid;
    }

    pub fn is_valid(&self, v: usize) -> bool {
        self.valid[v]
    }

    /// Weight of the edge `u -> v` including `v`'s vertex cost; `dst`'s own
    /// cost is excluded by the caller never asking for the weight of an
    /// edge ending at `dst` plus `dst`'s cost again (the Dijkstra loop
    /// simply never looks past a settled `dst`).
    fn weight(&self, u: usize, v: usize) -> Option<u16> {
        let edge = self.edges[u][v];
        if edge == INFINITY {
            return None;
        }
        Some(edge as u16 + self.vertex_cost[v] as u16)
    }

    /// Dijkstra from `src`, restricted to valid vertices, returning the
    /// first-hop neighbor of `src` on a shortest path to `dst`. `None` if
    /// `dst` is invalid, `src == dst`, or `dst` is unreachable.
    pub fn resolve_gateway_vertex(&self, src: usize, dst: usize) -> Option<usize> {
        if src == dst || !self.valid[dst] || !self.valid[src] {
            return None;
        }

        let mut dist = [u16::MAX; M];
        let mut first_hop: [Option<usize>; M] = [None; M];
        let mut settled = [false; M];
        dist[src] = 0;

        loop {
            let u = (0..M)
                .filter(|&v| self.valid[v] && !settled[v] && dist[v] != u16::MAX)
                .min_by_key(|&v| (dist[v], v))?;

            if u == dst {
                log::info!("gateway resolved: {src} -> {dst} via {:?}", first_hop[dst]);
                return first_hop[dst];
            }
            settled[u] = true;

            for v in 0..M {
                if v == u || !self.valid[v] || settled[v] {
                    continue;
                }
                let Some(w) = self.weight(u, v) else { continue };
                let candidate = dist[u].saturating_add(w);
                let better = candidate < dist[v] || (candidate == dist[v] && first_hop_tiebreak(first_hop[v], first_hop_for(src, u, v, &first_hop)));
                if better {
                    dist[v] = candidate;
                    first_hop[v] = Some(if u == src { v } else { first_hop[u].unwrap_or(v) });
                }
            }
        }
    }
}

/// First hop candidate if `v` were reached via `u`: `v` itself when `u` is
/// `src`, otherwise whatever first hop got `u` there.
fn first_hop_for<const M: usize>(src: usize, u: usize, v: usize, first_hop: &[Option<usize>; M]) -> Option<usize> {
    if u == src {
        Some(v)
    } else {
        first_hop[u]
    }
}

/// Tie-break equal-cost paths by preferring the smaller first-hop vertex
/// index (spec §4.10 "Tie-break by smaller vertex index").
fn first_hop_tiebreak(current: Option<usize>, candidate: Option<usize>) -> bool {
    match (current, candidate) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(c), Some(n)) => n < c,
    }
}

impl<const M: usize> Default for AdjacencyGraph<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A=0 B=1 C=2
    #[test]
    fn gateway_bypass_prefers_cheaper_path_through_c() {
        let mut graph: AdjacencyGraph<3> = AdjacencyGraph::new();
        graph.set_edge(0, 1, 10);
        graph.set_edge(0, 2, 4);
        graph.set_edge(2, 1, 4);

        assert_eq!(graph.resolve_gateway_vertex(0, 1), Some(2));

        graph.set_valid(2, false);
        assert_eq!(graph.resolve_gateway_vertex(0, 1), Some(1));
    }

    // A=0 B=1 C=2 D=3
    #[test]
    fn vertex_cost_tips_cheapest_path() {
        let mut graph: AdjacencyGraph<4> = AdjacencyGraph::new();
        graph.set_edge(0, 1, 5);
        graph.set_edge(1, 3, 5);
        graph.set_vertex_cost(1, 1);

        graph.set_edge(0, 2, 2);
        graph.set_edge(2, 3, 2);
        graph.set_vertex_cost(2, 8);

        assert_eq!(graph.resolve_gateway_vertex(0, 3), Some(1));
    }

    #[test]
    fn unreachable_destination_is_none() {
        let graph: AdjacencyGraph<3> = AdjacencyGraph::new();
        assert_eq!(graph.resolve_gateway_vertex(0, 1), None);
    }
}
