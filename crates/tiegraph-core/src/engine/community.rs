//! Girvan–Newman community splitting on the undirected projection.
//!
//! Each level repeatedly removes the edge of highest betweenness until the
//! number of connected components grows. Betweenness is recomputed after every
//! removal (Brandes' algorithm, unweighted).

use std::collections::VecDeque;

use super::adjacency::Adjacency;

/// Communities of one level, each a sorted list of node indices.
pub type Communities = Vec<Vec<usize>>;

/// Undirected working copy that supports edge removal.
struct SplitGraph {
    adj: Vec<Vec<usize>>,
    edges: usize,
}

impl SplitGraph {
    fn new(graph: &Adjacency) -> Self {
        let adj: Vec<Vec<usize>> = (0..graph.node_count())
            .map(|i| graph.neighbors(i).to_vec())
            .collect();
        let edges = graph.undirected_edge_count();
        Self { adj, edges }
    }

    fn remove(&mut self, a: usize, b: usize) {
        self.adj[a].retain(|&x| x != b);
        self.adj[b].retain(|&x| x != a);
        self.edges -= 1;
    }

    fn components(&self) -> Communities {
        let n = self.adj.len();
        let mut seen = vec![false; n];
        let mut out = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut members = Vec::new();
            while let Some(u) = stack.pop() {
                members.push(u);
                for &w in &self.adj[u] {
                    if !seen[w] {
                        seen[w] = true;
                        stack.push(w);
                    }
                }
            }
            members.sort_unstable();
            out.push(members);
        }
        out
    }

    /// Brandes edge betweenness; entries are `(a, b, score)` with `a < b`.
    fn edge_betweenness(&self) -> Vec<(usize, usize, f64)> {
        let n = self.adj.len();
        let mut scores: Vec<(usize, usize, f64)> = Vec::with_capacity(self.edges);
        let mut slot = rustc_hash::FxHashMap::default();
        for a in 0..n {
            for &b in &self.adj[a] {
                if a < b {
                    slot.insert((a, b), scores.len());
                    scores.push((a, b, 0.0));
                }
            }
        }

        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        let mut delta = vec![0.0f64; n];
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        for s in 0..n {
            sigma.iter_mut().for_each(|x| *x = 0.0);
            dist.iter_mut().for_each(|x| *x = -1);
            delta.iter_mut().for_each(|x| *x = 0.0);
            preds.iter_mut().for_each(Vec::clear);

            let mut order = Vec::with_capacity(n);
            let mut queue = VecDeque::new();
            sigma[s] = 1.0;
            dist[s] = 0;
            queue.push_back(s);
            while let Some(v) = queue.pop_front() {
                order.push(v);
                for &w in &self.adj[v] {
                    if dist[w] < 0 {
                        dist[w] = dist[v] + 1;
                        queue.push_back(w);
                    }
                    if dist[w] == dist[v] + 1 {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }
            while let Some(w) = order.pop() {
                for &v in &preds[w] {
                    let c = sigma[v] / sigma[w] * (1.0 + delta[w]);
                    let key = if v < w { (v, w) } else { (w, v) };
                    if let Some(&i) = slot.get(&key) {
                        scores[i].2 += c;
                    }
                    delta[v] += c;
                }
            }
        }
        scores
    }

    /// Removes highest-betweenness edges until the component count grows.
    fn split_once(&mut self) -> Communities {
        let before = self.components().len();
        loop {
            if self.edges == 0 {
                return self.components();
            }
            let betweenness = self.edge_betweenness();
            let mut best: Option<(usize, usize, f64)> = None;
            for (a, b, score) in betweenness {
                if best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((a, b, score));
                }
            }
            if let Some((a, b, _)) = best {
                self.remove(a, b);
            }
            let after = self.components();
            if after.len() > before {
                return after;
            }
        }
    }
}

/// Communities after `levels` Girvan–Newman splits.
///
/// An edgeless graph yields one singleton community per node. Requesting more
/// levels than the graph can be split into returns the finest level reached.
pub fn girvan_newman(graph: &Adjacency, levels: usize) -> Communities {
    let mut work = SplitGraph::new(graph);
    if work.edges == 0 {
        return work.components();
    }
    let mut current = work.components();
    for _ in 0..levels.max(1) {
        if work.edges == 0 {
            break;
        }
        current = work.split_once();
    }
    current
}

/// Maps each node index to the position of its community, if any.
pub fn membership(node_count: usize, communities: &Communities) -> Vec<Option<usize>> {
    let mut out = vec![None; node_count];
    for (c, members) in communities.iter().enumerate() {
        for &m in members {
            if m < node_count {
                out[m] = Some(c);
            }
        }
    }
    out
}
