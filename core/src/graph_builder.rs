//! Builds the provider relationship graph from shared-beneficiary aggregates.
//!
//! A fresh graph is built per analysis request. The build is a pure read of
//! the ClaimStore: providers with no qualifying edge never appear in the
//! graph, and an empty claim set yields an empty graph.

use crate::{
    config::{EngineConfig, GraphConfig},
    error::RiskResult,
    graph::{ProviderGraph, ProviderGraphNode},
    store::{ClaimStore, SharedBeneficiaryQuery},
    types::{DateRange, ProviderId},
};
use std::collections::{BTreeSet, HashMap};

pub struct GraphBuilder {
    config:      GraphConfig,
    window:      Option<DateRange>,
    risk_scores: HashMap<ProviderId, f64>,
}

impl GraphBuilder {
    /// Validates the whole engine config up front.
    pub fn new(config: &EngineConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            config:      config.graph.clone(),
            window:      None,
            risk_scores: HashMap::new(),
        })
    }

    /// Only count claims with service dates inside `window`.
    pub fn with_window(mut self, window: DateRange) -> Self {
        self.window = Some(window);
        self
    }

    /// Display scores attached to nodes; ring scoring treats members above
    /// `high_risk_member_score` as high-risk.
    pub fn with_risk_scores(mut self, scores: HashMap<ProviderId, f64>) -> Self {
        self.risk_scores = scores;
        self
    }

    pub fn build(&self, store: &dyn ClaimStore) -> RiskResult<ProviderGraph> {
        self.build_with_min(store, self.config.min_shared_patients)
    }

    pub fn build_with_min(
        &self,
        store: &dyn ClaimStore,
        min_shared_patients: u32,
    ) -> RiskResult<ProviderGraph> {
        let pairs = store.shared_beneficiaries(&SharedBeneficiaryQuery {
            min_count:           min_shared_patients.max(1),
            min_combined_amount: self.config.min_combined_amount,
            date_range:          self.window,
        })?;

        let mut graph = ProviderGraph::over_window(self.window);
        if pairs.is_empty() {
            log::debug!("Graph build: no provider pairs share {min_shared_patients}+ beneficiaries");
            return Ok(graph);
        }

        let involved: BTreeSet<ProviderId> = pairs
            .iter()
            .filter(|p| p.provider_a != p.provider_b)
            .flat_map(|p| [p.provider_a, p.provider_b])
            .collect();

        let providers: HashMap<ProviderId, _> = store
            .providers()?
            .into_iter()
            .map(|p| (p.provider_id, p))
            .collect();

        // Ascending id order fixes node indices for every later traversal.
        for id in &involved {
            let node = match providers.get(id) {
                Some(p) => ProviderGraphNode {
                    provider_id:   p.provider_id,
                    name:          p.name.clone(),
                    facility_type: p.facility_type.clone(),
                    state:         p.state.clone(),
                    risk_score:    self.risk_scores.get(id).copied(),
                    degree:        0,
                },
                None => ProviderGraphNode {
                    risk_score: self.risk_scores.get(id).copied(),
                    ..ProviderGraphNode::bare(*id)
                },
            };
            graph.add_node(node);
        }

        for pair in &pairs {
            let weight = u32::try_from(pair.shared_count).unwrap_or(u32::MAX);
            if !graph.add_weighted_edge(pair.provider_a, pair.provider_b, weight, pair.shared_weight) {
                log::warn!("Skipping self-loop for provider {}", pair.provider_a);
            }
        }

        log::debug!(
            "Graph build: {} providers, {} edges (min shared = {min_shared_patients})",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
