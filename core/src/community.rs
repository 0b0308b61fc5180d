//! Community detection and fraud-ring scoring.
//!
//! Partitioning is weighted Louvain. In each level every node repeatedly
//! moves to the neighbouring community with the largest modularity gain
//! until a full pass moves nothing; communities then collapse into single
//! nodes and the next level starts. The visiting order is shuffled by a
//! SeededRng and gain ties go to the lowest community label, so a fixed
//! graph and config always give the same partition.
//!
//! A community whose members are not connected inside the community (a node
//! that bridged it may have moved away) is split into its connected parts,
//! so every ring member is reachable from every other member.
//!
//! Ring fraud score (0-100):
//!   40 × internal edge density
//! + 30 × min(1, mean internal edge weight / (4 × min_shared_patients))
//! + 30 × share of members whose display score exceeds high_risk_member_score

use crate::{
    config::GraphConfig,
    graph::{EgoNetwork, ProviderGraph},
    model::{round4, SuspicionLevel},
    rng::{RngStream, SeededRng},
    types::ProviderId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const DENSITY_POINTS: f64 = 40.0;
const WEIGHT_POINTS: f64 = 30.0;
const HIGH_RISK_POINTS: f64 = 30.0;
/// Mean edge weight, as a multiple of the edge threshold, that earns full weight points.
const WEIGHT_SATURATION_MULTIPLE: f64 = 4.0;
/// Gains must beat the incumbent by this much to move a node.
const GAIN_EPSILON: f64 = 1e-12;
const MAX_LEVELS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRing {
    pub ring_id:             String,
    /// Ascending provider ids.
    pub members:             Vec<ProviderId>,
    pub fraud_score:         f64,
    pub suspicion_level:     SuspicionLevel,
    pub internal_edges:      usize,
    pub internal_density:    f64,
    /// Sum of shared-beneficiary counts over internal edges.
    pub total_shared_weight: f64,
    pub high_risk_members:   usize,
    /// Member with the largest internal weighted degree; ties go to the
    /// earliest node (lowest id for graphs from GraphBuilder).
    pub anchor_provider_id:  ProviderId,
}

impl FraudRing {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, provider_id: ProviderId) -> bool {
        self.members.binary_search(&provider_id).is_ok()
    }
}

pub struct FraudRingDetector {
    config: GraphConfig,
}

impl FraudRingDetector {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Rings of at least `min_size` providers, most suspicious first.
    /// Ring ids (`ring-001`, ...) follow that order.
    pub fn detect_rings(&self, graph: &ProviderGraph, min_size: usize) -> Vec<FraudRing> {
        let partition = self.partition(graph);
        self.rings_from_partition(graph, &partition, min_size)
    }

    /// Score an already computed partition.
    pub fn rings_from_partition(
        &self,
        graph: &ProviderGraph,
        partition: &[Vec<usize>],
        min_size: usize,
    ) -> Vec<FraudRing> {
        let mut rings: Vec<FraudRing> = partition
            .iter()
            .filter(|members| members.len() >= min_size.max(2))
            .map(|members| self.score_community(graph, members))
            .collect();

        rings.sort_by(|a, b| {
            b.fraud_score
                .total_cmp(&a.fraud_score)
                .then(a.members[0].cmp(&b.members[0]))
        });
        for (i, ring) in rings.iter_mut().enumerate() {
            ring.ring_id = format!("ring-{:03}", i + 1);
        }

        log::debug!(
            "Ring detection: {} rings of {}+ providers over {} nodes",
            rings.len(),
            min_size,
            graph.node_count()
        );
        rings
    }

    /// Rings using the configured `min_ring_size`.
    pub fn detect_rings_default(&self, graph: &ProviderGraph) -> Vec<FraudRing> {
        self.detect_rings(graph, self.config.min_ring_size)
    }

    /// Induced subgraph within `depth` hops of a provider.
    pub fn get_ego_network(
        &self,
        graph: &ProviderGraph,
        provider_id: ProviderId,
        depth: u32,
    ) -> Option<EgoNetwork> {
        graph.ego_network(provider_id, depth)
    }

    /// Every community as a sorted list of node indices, connected within
    /// itself, ordered by smallest index. Singletons included.
    pub fn partition(&self, graph: &ProviderGraph) -> Vec<Vec<usize>> {
        if graph.is_empty() {
            return Vec::new();
        }

        let labels = self.louvain(graph);

        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, &label) in labels.iter().enumerate() {
            grouped.entry(label).or_default().push(node);
        }

        let mut communities: Vec<Vec<usize>> = grouped
            .into_values()
            .flat_map(|members| graph.components_within(&members))
            .collect();
        communities.sort_by_key(|c| c[0]);
        communities
    }

    /// Community label per graph node: local moving, then aggregation of
    /// each community into one node, repeated until a level merges nothing.
    fn louvain(&self, graph: &ProviderGraph) -> Vec<usize> {
        let mut level = Level::from_graph(graph);
        let mut assignment: Vec<usize> = (0..graph.node_count()).collect();
        let two_m = 2.0 * graph.total_weight();
        if two_m <= 0.0 {
            return assignment;
        }

        let mut rng = SeededRng::new(self.config.partition_seed, RngStream::Partition);
        for depth in 0..MAX_LEVELS {
            let labels = self.local_moving(&level, two_m, &mut rng);
            let (compact, count) = renumber(&labels);
            log::trace!("Louvain level {depth}: {} nodes -> {count} communities", level.len());
            if count == level.len() {
                break;
            }
            for a in assignment.iter_mut() {
                *a = compact[*a];
            }
            level = level.aggregate(&compact, count);
        }
        assignment
    }

    /// Community label per level node after local moving converges.
    fn local_moving(&self, level: &Level, two_m: f64, rng: &mut SeededRng) -> Vec<usize> {
        let n = level.len();
        let mut community: Vec<usize> = (0..n).collect();

        let k: Vec<f64> = (0..n).map(|i| level.strength(i)).collect();
        let mut sigma_tot = k.clone();

        let mut order: Vec<usize> = (0..n).collect();
        rng.shuffle(&mut order);

        for pass in 0..self.config.max_passes {
            let mut moved = 0usize;

            for &i in &order {
                let current = community[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &level.adjacency[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }

                // Take i out of its community, then find where it gains most.
                sigma_tot[current] -= k[i];
                let mut best = current;
                let mut best_gain =
                    links.get(&current).copied().unwrap_or(0.0) - sigma_tot[current] * k[i] / two_m;

                for (&c, &w_ic) in &links {
                    if c == current {
                        continue;
                    }
                    let gain = w_ic - sigma_tot[c] * k[i] / two_m;
                    if gain > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = gain;
                    }
                }

                sigma_tot[best] += k[i];
                if best != current {
                    community[i] = best;
                    moved += 1;
                }
            }

            log::trace!("Local moving pass {pass}: {moved} moves");
            if moved == 0 {
                break;
            }
        }

        community
    }

    fn score_community(&self, graph: &ProviderGraph, members: &[usize]) -> FraudRing {
        let member_set: HashSet<usize> = members.iter().copied().collect();
        let size = members.len();

        let mut internal_edges = 0usize;
        let mut total_weight = 0.0;
        let mut anchor = members[0];
        let mut anchor_strength = f64::MIN;

        for &i in members {
            let mut strength = 0.0;
            for &(j, e) in graph.neighbors(i) {
                if member_set.contains(&j) {
                    let w = f64::from(graph.edge(e).weight);
                    strength += w;
                    if i < j {
                        internal_edges += 1;
                        total_weight += w;
                    }
                }
            }
            // Members are sorted by index; strict > keeps the earliest on ties.
            if strength > anchor_strength {
                anchor = i;
                anchor_strength = strength;
            }
        }

        let possible = (size * (size - 1)) as f64 / 2.0;
        let density = if possible > 0.0 {
            internal_edges as f64 / possible
        } else {
            0.0
        };

        let weight_factor = if internal_edges > 0 {
            let mean_weight = total_weight / internal_edges as f64;
            let saturation =
                WEIGHT_SATURATION_MULTIPLE * f64::from(self.config.min_shared_patients.max(1));
            (mean_weight / saturation).min(1.0)
        } else {
            0.0
        };

        let high_risk_members = members
            .iter()
            .filter(|&&i| {
                graph
                    .node(i)
                    .risk_score
                    .is_some_and(|s| s > self.config.high_risk_member_score)
            })
            .count();
        let high_risk_share = high_risk_members as f64 / size as f64;

        let fraud_score = (DENSITY_POINTS * density
            + WEIGHT_POINTS * weight_factor
            + HIGH_RISK_POINTS * high_risk_share)
            .clamp(0.0, 100.0);
        let fraud_score = round4(fraud_score);

        let mut member_ids: Vec<ProviderId> =
            members.iter().map(|&i| graph.node(i).provider_id).collect();
        member_ids.sort_unstable();

        FraudRing {
            ring_id: String::new(),
            members: member_ids,
            fraud_score,
            suspicion_level: SuspicionLevel::from_fraud_score(fraud_score, &self.config.ring_bands),
            internal_edges,
            internal_density: round4(density),
            total_shared_weight: total_weight,
            high_risk_members,
            anchor_provider_id: graph.node(anchor).provider_id,
        }
    }
}

// ── Louvain levels ───────────────────────────────────────────────────────────

/// One Louvain level: a weighted undirected graph whose nodes are the
/// communities of the level below. `internal[i]` is the edge weight folded
/// inside node i.
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    internal:  Vec<f64>,
}

impl Level {
    fn from_graph(graph: &ProviderGraph) -> Self {
        let adjacency = (0..graph.node_count())
            .map(|i| {
                graph
                    .neighbors(i)
                    .iter()
                    .map(|&(j, e)| (j, f64::from(graph.edge(e).weight)))
                    .collect()
            })
            .collect();
        Self {
            adjacency,
            internal: vec![0.0; graph.node_count()],
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Weighted degree, counting folded weight from both ends.
    fn strength(&self, i: usize) -> f64 {
        self.adjacency[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.internal[i]
    }

    fn aggregate(&self, compact: &[usize], count: usize) -> Self {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut internal = vec![0.0; count];

        for (i, neighbors) in self.adjacency.iter().enumerate() {
            let ci = compact[i];
            internal[ci] += self.internal[i];
            for &(j, w) in neighbors {
                let cj = compact[j];
                if ci == cj {
                    // Seen once from each end.
                    internal[ci] += w / 2.0;
                } else {
                    *links[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }

        Self {
            adjacency: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            internal,
        }
    }
}

/// Relabel communities 0..count in order of their first node.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let compact = labels
        .iter()
        .map(|&label| {
            let next = mapping.len();
            *mapping.entry(label).or_insert(next)
        })
        .collect();
    (compact, mapping.len())
}
