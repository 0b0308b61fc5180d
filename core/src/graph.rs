//! Provider relationship graph.
//!
//! An undirected, weighted, adjacency-list graph stored as an arena: nodes
//! live in a Vec and are addressed by index, with a provider-id → index map
//! for lookups. Neighbor lookups are O(1) per node.
//!
//! RULES:
//!   - No self-loops. `add_weighted_edge(a, a, ..)` is rejected.
//!   - One edge per unordered pair; edges are stored with `provider_a < provider_b`.
//!   - Node order is insertion order. GraphBuilder inserts in ascending
//!     provider id, which makes every traversal below deterministic.

use crate::{
    model::round4,
    types::{DateRange, ProviderId},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGraphNode {
    pub provider_id:   ProviderId,
    pub name:          String,
    /// Facility category, used as the node type label.
    pub facility_type: String,
    pub state:         String,
    /// Externally supplied display score, if one was available at build time.
    pub risk_score:    Option<f64>,
    pub degree:        usize,
}

impl ProviderGraphNode {
    /// A node carrying only an id, for graphs assembled by hand.
    pub fn bare(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            name:          format!("Provider {provider_id}"),
            facility_type: String::new(),
            state:         String::new(),
            risk_score:    None,
            degree:        0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGraphEdge {
    pub provider_a:    ProviderId,
    pub provider_b:    ProviderId,
    /// Distinct shared beneficiaries.
    pub weight:        u32,
    /// Combined amount both providers billed for those beneficiaries.
    pub shared_amount: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderGraph {
    nodes:      Vec<ProviderGraphNode>,
    index:      HashMap<ProviderId, usize>,
    /// Per node: (neighbor index, edge index).
    adjacency:  Vec<Vec<(usize, usize)>>,
    edges:      Vec<ProviderGraphEdge>,
    edge_index: HashMap<(usize, usize), usize>,
    /// Service-date window the edges were counted over; None means all claims.
    window:     Option<DateRange>,
}

impl ProviderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph whose edges will be counted over `window`.
    pub fn over_window(window: Option<DateRange>) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn window(&self) -> Option<DateRange> {
        self.window
    }

    /// Insert a node, or return the existing index for that provider.
    pub fn add_node(&mut self, node: ProviderGraphNode) -> usize {
        if let Some(&idx) = self.index.get(&node.provider_id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.provider_id, idx);
        self.nodes.push(ProviderGraphNode { degree: 0, ..node });
        self.adjacency.push(Vec::new());
        idx
    }

    /// Connect two providers. Missing endpoints are added as bare nodes.
    /// Adding a pair that already has an edge adds to its weight.
    /// Returns false (and changes nothing) for a self-loop.
    pub fn add_weighted_edge(
        &mut self,
        a: ProviderId,
        b: ProviderId,
        weight: u32,
        shared_amount: f64,
    ) -> bool {
        if a == b {
            return false;
        }
        let ia = self.add_node(ProviderGraphNode::bare(a));
        let ib = self.add_node(ProviderGraphNode::bare(b));
        let key = (ia.min(ib), ia.max(ib));

        if let Some(&e) = self.edge_index.get(&key) {
            let edge = &mut self.edges[e];
            edge.weight += weight;
            edge.shared_amount += shared_amount;
            return true;
        }

        let e = self.edges.len();
        self.edges.push(ProviderGraphEdge {
            provider_a: a.min(b),
            provider_b: a.max(b),
            weight,
            shared_amount,
        });
        self.edge_index.insert(key, e);
        self.adjacency[ia].push((ib, e));
        self.adjacency[ib].push((ia, e));
        self.nodes[ia].degree += 1;
        self.nodes[ib].degree += 1;
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ProviderGraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ProviderGraphEdge] {
        &self.edges
    }

    pub fn node(&self, idx: usize) -> &ProviderGraphNode {
        &self.nodes[idx]
    }

    pub fn index_of(&self, provider_id: ProviderId) -> Option<usize> {
        self.index.get(&provider_id).copied()
    }

    pub fn contains(&self, provider_id: ProviderId) -> bool {
        self.index.contains_key(&provider_id)
    }

    /// (neighbor index, edge index) pairs.
    pub fn neighbors(&self, idx: usize) -> &[(usize, usize)] {
        &self.adjacency[idx]
    }

    pub fn degree(&self, idx: usize) -> usize {
        self.adjacency[idx].len()
    }

    pub fn edge(&self, edge_idx: usize) -> &ProviderGraphEdge {
        &self.edges[edge_idx]
    }

    /// Sum of incident edge weights.
    pub fn weighted_degree(&self, idx: usize) -> f64 {
        self.adjacency[idx]
            .iter()
            .map(|&(_, e)| f64::from(self.edges[e].weight))
            .sum()
    }

    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| f64::from(e.weight)).sum()
    }

    /// Edges over possible edges for an undirected simple graph.
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n < 2 {
            return 0.0;
        }
        let possible = (n * (n - 1)) as f64 / 2.0;
        self.edges.len() as f64 / possible
    }

    /// Connected components of the subgraph induced by `members`.
    /// Each component is sorted by index; components are ordered by their
    /// smallest index.
    pub fn components_within(&self, members: &[usize]) -> Vec<Vec<usize>> {
        let mut in_set = vec![false; self.nodes.len()];
        for &m in members {
            in_set[m] = true;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut sorted = members.to_vec();
        sorted.sort_unstable();

        let mut components = Vec::new();
        for &start in &sorted {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(v) = queue.pop_front() {
                for &(w, _) in &self.adjacency[v] {
                    if in_set[w] && !seen[w] {
                        seen[w] = true;
                        component.push(w);
                        queue.push_back(w);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// The induced subgraph within `depth` hops of a provider.
    /// None when the provider is not in the graph.
    pub fn ego_network(&self, provider_id: ProviderId, depth: u32) -> Option<EgoNetwork> {
        let center = self.index_of(provider_id)?;

        let mut hops: Vec<Option<u32>> = vec![None; self.nodes.len()];
        hops[center] = Some(0);
        let mut reached = vec![center];
        let mut queue = VecDeque::from([center]);
        while let Some(v) = queue.pop_front() {
            let h = hops[v].unwrap_or(0);
            if h >= depth {
                continue;
            }
            for &(w, _) in &self.adjacency[v] {
                if hops[w].is_none() {
                    hops[w] = Some(h + 1);
                    reached.push(w);
                    queue.push_back(w);
                }
            }
        }

        let mut nodes: Vec<EgoNode> = reached
            .iter()
            .map(|&i| {
                let n = &self.nodes[i];
                EgoNode {
                    provider_id:   n.provider_id,
                    name:          n.name.clone(),
                    facility_type: n.facility_type.clone(),
                    state:         n.state.clone(),
                    risk_score:    n.risk_score.map(round4),
                    degree:        n.degree,
                    hops:          hops[i].unwrap_or(0),
                }
            })
            .collect();
        nodes.sort_by_key(|n| (n.hops, n.provider_id));

        let mut edges: Vec<EgoEdge> = self
            .edges
            .iter()
            .filter(|e| {
                let a = self.index[&e.provider_a];
                let b = self.index[&e.provider_b];
                hops[a].is_some() && hops[b].is_some()
            })
            .map(|e| EgoEdge {
                source:        e.provider_a,
                target:        e.provider_b,
                weight:        e.weight,
                shared_amount: round4(e.shared_amount),
            })
            .collect();
        edges.sort_by_key(|e| (e.source, e.target));

        Some(EgoNetwork {
            center_provider_id: provider_id,
            depth,
            nodes,
            edges,
        })
    }
}

// ── Ego network (visualisation payload) ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgoNode {
    pub provider_id:   ProviderId,
    pub name:          String,
    pub facility_type: String,
    pub state:         String,
    pub risk_score:    Option<f64>,
    pub degree:        usize,
    pub hops:          u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgoEdge {
    pub source:        ProviderId,
    pub target:        ProviderId,
    pub weight:        u32,
    pub shared_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgoNetwork {
    pub nodes:              Vec<EgoNode>,
    pub edges:              Vec<EgoEdge>,
    pub center_provider_id: ProviderId,
    pub depth:              u32,
}
