//! Network insights: one report composed from the graph, centrality and ring
//! detection, plus the per-provider network context the scorer consumes.
//!
//! Every float leaving this module is rounded to BOUNDARY_PRECISION places.

use crate::{
    address::{cluster_by_address, AddressCluster},
    centrality::CentralityAnalyzer,
    community::{FraudRing, FraudRingDetector},
    config::EngineConfig,
    error::RiskResult,
    graph::ProviderGraph,
    graph_builder::GraphBuilder,
    model::{round4, Provider, SuspicionLevel},
    store::{ClaimStore, SharedBeneficiaryRow},
    types::{DateRange, ProviderId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A community is cross-region when at least this share of its internal
/// edges link providers in different regions.
const CROSS_REGION_EDGE_SHARE: f64 = 0.5;
const TOP_SHARED_BENEFICIARIES: usize = 5;

// ── Report shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub id:   ProviderId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralProvider {
    pub provider_id:     ProviderId,
    pub name:            String,
    pub degree:          usize,
    pub weighted_degree: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerProvider {
    pub provider_id: ProviderId,
    pub name:        String,
    pub betweenness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingMember {
    pub provider_id:   ProviderId,
    pub name:          String,
    pub facility_type: String,
    pub state:         String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRingReport {
    pub ring_id:                  String,
    pub anchor_provider:          ProviderRef,
    /// The ring's fraud score.
    pub risk_score:               f64,
    /// The ring's suspicion band.
    pub confidence:               SuspicionLevel,
    pub internal_density:         f64,
    pub total_shared_weight:      f64,
    pub high_risk_members:        usize,
    pub member_providers:         Vec<RingMember>,
    pub top_shared_beneficiaries: Vec<SharedBeneficiaryRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRegionCluster {
    pub provider_ids:            Vec<ProviderId>,
    pub regions:                 Vec<String>,
    pub provider_count:          usize,
    pub cross_region_edge_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInsights {
    pub total_providers:         usize,
    pub total_connections:       usize,
    pub density:                 f64,
    /// Number of communities with two or more providers.
    pub communities:             usize,
    pub most_central_providers:  Vec<CentralProvider>,
    pub top_betweenness_brokers: Vec<BrokerProvider>,
    pub fraud_rings:             Vec<FraudRingReport>,
    pub shared_address_clusters: Vec<AddressCluster>,
    pub cross_region_clusters:   Vec<CrossRegionCluster>,
}

/// Derived results of one graph run, held for the duration of a request.
#[derive(Debug, Clone, Default)]
pub struct NetworkAnalysis {
    pub partition:   Vec<Vec<usize>>,
    pub rings:       Vec<FraudRing>,
    pub betweenness: BTreeMap<ProviderId, f64>,
}

// ── Reporter ─────────────────────────────────────────────────────────────────

pub struct NetworkInsightsReporter {
    config:     EngineConfig,
    centrality: CentralityAnalyzer,
    detector:   FraudRingDetector,
}

impl NetworkInsightsReporter {
    pub fn new(config: &EngineConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            config:     config.clone(),
            centrality: CentralityAnalyzer::new(&config.graph),
            detector:   FraudRingDetector::new(&config.graph),
        })
    }

    pub fn analyze(&self, graph: &ProviderGraph) -> NetworkAnalysis {
        let partition = self.detector.partition(graph);
        let rings = self
            .detector
            .rings_from_partition(graph, &partition, self.config.graph.min_ring_size);
        NetworkAnalysis {
            partition,
            rings,
            betweenness: self.centrality.betweenness(graph),
        }
    }

    pub fn generate_insights(
        &self,
        store: &dyn ClaimStore,
        graph: &ProviderGraph,
    ) -> RiskResult<NetworkInsights> {
        let analysis = self.analyze(graph);
        let providers = store.providers()?;
        let by_id: HashMap<ProviderId, &Provider> =
            providers.iter().map(|p| (p.provider_id, p)).collect();
        let top_n = self.config.graph.top_n;

        let most_central_providers = self
            .centrality
            .most_connected(graph, top_n)
            .into_iter()
            .map(|(id, degree)| CentralProvider {
                provider_id: id,
                name: display_name(graph, id),
                degree,
                weighted_degree: graph
                    .index_of(id)
                    .map(|i| round4(graph.weighted_degree(i)))
                    .unwrap_or(0.0),
            })
            .collect();

        let top_betweenness_brokers = self
            .centrality
            .top_brokers(&analysis.betweenness, top_n)
            .into_iter()
            .map(|(id, b)| BrokerProvider {
                provider_id: id,
                name:        display_name(graph, id),
                betweenness: round4(b),
            })
            .collect();

        let fraud_rings = analysis
            .rings
            .iter()
            .map(|ring| self.ring_report(store, graph, ring))
            .collect::<RiskResult<Vec<_>>>()?;

        let communities = analysis.partition.iter().filter(|c| c.len() >= 2).count();
        let cross_region_clusters = cross_region_clusters(graph, &analysis.partition, &by_id);

        let insights = NetworkInsights {
            total_providers: graph.node_count(),
            total_connections: graph.edge_count(),
            density: round4(graph.density()),
            communities,
            most_central_providers,
            top_betweenness_brokers,
            fraud_rings,
            shared_address_clusters: cluster_by_address(&providers),
            cross_region_clusters,
        };
        log::info!(
            "Network insights: {} providers, {} connections, {} rings",
            insights.total_providers,
            insights.total_connections,
            insights.fraud_rings.len()
        );
        Ok(insights)
    }

    pub fn ring_report(
        &self,
        store: &dyn ClaimStore,
        graph: &ProviderGraph,
        ring: &FraudRing,
    ) -> RiskResult<FraudRingReport> {
        let member_providers = ring
            .members
            .iter()
            .map(|&id| match graph.index_of(id).map(|i| graph.node(i)) {
                Some(node) => RingMember {
                    provider_id:   id,
                    name:          node.name.clone(),
                    facility_type: node.facility_type.clone(),
                    state:         node.state.clone(),
                },
                None => RingMember {
                    provider_id:   id,
                    name:          format!("Provider {id}"),
                    facility_type: String::new(),
                    state:         String::new(),
                },
            })
            .collect();

        let top_shared_beneficiaries = store
            .top_shared_beneficiaries(&ring.members, graph.window(), TOP_SHARED_BENEFICIARIES)?
            .into_iter()
            .map(|row| SharedBeneficiaryRow {
                total_amount: round4(row.total_amount),
                ..row
            })
            .collect();

        Ok(FraudRingReport {
            ring_id: ring.ring_id.clone(),
            anchor_provider: ProviderRef {
                id:   ring.anchor_provider_id,
                name: display_name(graph, ring.anchor_provider_id),
            },
            risk_score: round4(ring.fraud_score),
            confidence: ring.suspicion_level,
            internal_density: round4(ring.internal_density),
            total_shared_weight: round4(ring.total_shared_weight),
            high_risk_members: ring.high_risk_members,
            member_providers,
            top_shared_beneficiaries,
        })
    }
}

fn display_name(graph: &ProviderGraph, id: ProviderId) -> String {
    graph
        .index_of(id)
        .map(|i| graph.node(i).name.clone())
        .unwrap_or_else(|| format!("Provider {id}"))
}

fn cross_region_clusters(
    graph: &ProviderGraph,
    partition: &[Vec<usize>],
    providers: &HashMap<ProviderId, &Provider>,
) -> Vec<CrossRegionCluster> {
    let region_of = |idx: usize| -> String {
        let node = graph.node(idx);
        providers
            .get(&node.provider_id)
            .and_then(|p| p.region.clone())
            .unwrap_or_else(|| node.state.clone())
    };

    let mut clusters: Vec<CrossRegionCluster> = Vec::new();
    for members in partition.iter().filter(|c| c.len() >= 2) {
        let regions: Vec<String> = members.iter().map(|&i| region_of(i)).collect();
        let distinct: BTreeSet<&String> = regions.iter().collect();
        if distinct.len() < 2 {
            continue;
        }

        let position: HashMap<usize, usize> =
            members.iter().enumerate().map(|(pos, &i)| (i, pos)).collect();
        let mut internal = 0usize;
        let mut crossing = 0usize;
        for (pos, &i) in members.iter().enumerate() {
            for &(j, _) in graph.neighbors(i) {
                if let Some(&other) = position.get(&j) {
                    if i < j {
                        internal += 1;
                        if regions[pos] != regions[other] {
                            crossing += 1;
                        }
                    }
                }
            }
        }
        if internal == 0 {
            continue;
        }
        let share = crossing as f64 / internal as f64;
        if share < CROSS_REGION_EDGE_SHARE {
            continue;
        }

        let mut provider_ids: Vec<ProviderId> =
            members.iter().map(|&i| graph.node(i).provider_id).collect();
        provider_ids.sort_unstable();
        clusters.push(CrossRegionCluster {
            provider_count: provider_ids.len(),
            provider_ids,
            regions: distinct.into_iter().cloned().collect(),
            cross_region_edge_share: round4(share),
        });
    }

    clusters.sort_by(|a, b| {
        b.cross_region_edge_share
            .total_cmp(&a.cross_region_edge_share)
            .then(a.provider_ids[0].cmp(&b.provider_ids[0]))
    });
    clusters
}

// ── Network context for scoring ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRiskSummary {
    pub ring_id:          Option<String>,
    pub ring_fraud_score: f64,
    pub ring_suspicion:   Option<SuspicionLevel>,
    pub ring_size:        usize,
    pub degree:           usize,
    pub betweenness:      f64,
}

/// Per-provider network summaries from one graph run.
#[derive(Debug, Clone, Default)]
pub struct NetworkContext {
    summaries: HashMap<ProviderId, NetworkRiskSummary>,
}

impl NetworkContext {
    pub fn from_analysis(graph: &ProviderGraph, analysis: &NetworkAnalysis) -> Self {
        let mut summaries: HashMap<ProviderId, NetworkRiskSummary> = graph
            .nodes()
            .iter()
            .map(|node| {
                (
                    node.provider_id,
                    NetworkRiskSummary {
                        ring_id:          None,
                        ring_fraud_score: 0.0,
                        ring_suspicion:   None,
                        ring_size:        0,
                        degree:           node.degree,
                        betweenness:      analysis
                            .betweenness
                            .get(&node.provider_id)
                            .copied()
                            .unwrap_or(0.0),
                    },
                )
            })
            .collect();

        for ring in &analysis.rings {
            for id in &ring.members {
                if let Some(summary) = summaries.get_mut(id) {
                    summary.ring_id = Some(ring.ring_id.clone());
                    summary.ring_fraud_score = ring.fraud_score;
                    summary.ring_suspicion = Some(ring.suspicion_level);
                    summary.ring_size = ring.size();
                }
            }
        }
        Self { summaries }
    }

    /// Build the graph from the store and analyze it in one go. With a
    /// window, only claims inside it form edges.
    pub fn build(
        store: &dyn ClaimStore,
        config: &EngineConfig,
        window: Option<DateRange>,
    ) -> RiskResult<Self> {
        let mut builder = GraphBuilder::new(config)?;
        if let Some(window) = window {
            builder = builder.with_window(window);
        }
        let graph = builder.build(store)?;
        let analysis = NetworkInsightsReporter::new(config)?.analyze(&graph);
        Ok(Self::from_analysis(&graph, &analysis))
    }

    pub fn summary(&self, provider_id: ProviderId) -> Option<&NetworkRiskSummary> {
        self.summaries.get(&provider_id)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
