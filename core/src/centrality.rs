//! Centrality metrics over the provider graph.
//!
//! Betweenness centrality finds brokers: providers sitting on many shortest
//! paths between other providers, a proxy for patient-brokering
//! intermediaries. Degree gives the "most connected" ranking.
//!
//! Brandes' algorithm on the unweighted graph: O(V·E) time, O(V + E) memory
//! per source. Graphs above `betweenness_node_ceiling` should be sharded by
//! region before calling this.

use crate::{config::GraphConfig, graph::ProviderGraph, types::ProviderId};
use std::collections::{BTreeMap, VecDeque};

pub struct CentralityAnalyzer {
    node_ceiling: usize,
}

impl CentralityAnalyzer {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            node_ceiling: config.betweenness_node_ceiling,
        }
    }

    /// Normalized betweenness per provider, in [0, 1].
    pub fn betweenness(&self, graph: &ProviderGraph) -> BTreeMap<ProviderId, f64> {
        let n = graph.node_count();
        if n > self.node_ceiling {
            log::warn!(
                "Betweenness over {n} providers exceeds the {} node ceiling; shard by region",
                self.node_ceiling
            );
        }

        let raw = brandes(graph);

        // Undirected: every pair was counted from both ends.
        let scale = if n > 2 {
            1.0 / ((n - 1) * (n - 2)) as f64
        } else {
            0.0
        };
        graph
            .nodes()
            .iter()
            .zip(raw)
            .map(|(node, c)| (node.provider_id, c * scale))
            .collect()
    }

    /// Providers by descending degree; ties by ascending provider id.
    pub fn most_connected(&self, graph: &ProviderGraph, top_n: usize) -> Vec<(ProviderId, usize)> {
        let mut ranked: Vec<(ProviderId, usize)> = graph
            .nodes()
            .iter()
            .map(|node| (node.provider_id, node.degree))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        ranked
    }

    /// Highest betweenness first; ties by ascending provider id.
    /// Providers with zero betweenness are not brokers and are left out.
    pub fn top_brokers(
        &self,
        scores: &BTreeMap<ProviderId, f64>,
        top_n: usize,
    ) -> Vec<(ProviderId, f64)> {
        let mut ranked: Vec<(ProviderId, f64)> = scores
            .iter()
            .filter(|(_, &s)| s > 0.0)
            .map(|(&id, &s)| (id, s))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        ranked
    }
}

/// Raw (unnormalized, double-counted) betweenness indexed like the graph's nodes.
fn brandes(graph: &ProviderGraph) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0f64; n];

    for s in 0..n {
        let mut stack: Vec<usize> = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];

        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);

        // Forward BFS, counting shortest paths.
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &(w, _) in graph.neighbors(v) {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        // Backward pass: accumulate dependencies.
        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    centrality
}
