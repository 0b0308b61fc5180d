//! Engine configuration: graph thresholds, signal thresholds, weights and bands.
//!
//! RULE: configuration is an immutable value passed into constructors.
//! Nothing in the core reads global tunables. `validate()` runs when a
//! GraphBuilder or RiskScoreAggregator is constructed, never at scoring time.

use crate::error::{RiskError, RiskResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allowed drift of the weight sum away from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

// ── Graph / ring detection ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Minimum distinct shared beneficiaries for an edge.
    pub min_shared_patients: u32,
    /// A beneficiary only counts as shared for a pair when the combined
    /// amount billed by both providers reaches this value.
    pub min_combined_amount: f64,
    pub min_ring_size: usize,
    /// External display score above which a ring member counts as high-risk.
    pub high_risk_member_score: f64,
    /// Seed for the community detector's node visiting order.
    pub partition_seed: u64,
    pub max_passes: u32,
    /// Above this many nodes, global betweenness should be sharded by region.
    pub betweenness_node_ceiling: usize,
    pub top_n: usize,
    pub ring_bands: RingBands,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_shared_patients:      5,
            min_combined_amount:      0.0,
            min_ring_size:            3,
            high_risk_member_score:   70.0,
            partition_seed:           0x5EED_0F_C1A1,
            max_passes:               32,
            betweenness_node_ceiling: 50_000,
            top_n:                    10,
            ring_bands:               RingBands::default(),
        }
    }
}

/// Fraud-score cut-offs for ring suspicion levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingBands {
    pub medium: f64,
    pub high:   f64,
}

impl Default for RingBands {
    fn default() -> Self {
        Self { medium: 50.0, high: 80.0 }
    }
}

// ── Composite scoring ────────────────────────────────────────────────────────

/// Weight of each signal layer in the composite score. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub billing_zscore:   f64,
    pub peer_deviation:   f64,
    pub temporal_spike:   f64,
    pub behavioral:       f64,
    pub network_risk:     f64,
    pub region_specific:  f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            billing_zscore:  0.25,
            peer_deviation:  0.15,
            temporal_spike:  0.15,
            behavioral:      0.15,
            network_risk:    0.15,
            region_specific: 0.15,
        }
    }
}

impl SignalWeights {
    pub fn sum(&self) -> f64 {
        self.billing_zscore
            + self.peer_deviation
            + self.temporal_spike
            + self.behavioral
            + self.network_risk
            + self.region_specific
    }

    /// Weight for a signal by its stable name; unknown names weigh nothing.
    pub fn weight_for(&self, signal: &str) -> f64 {
        match signal {
            "billing_zscore"  => self.billing_zscore,
            "peer_deviation"  => self.peer_deviation,
            "temporal_spike"  => self.temporal_spike,
            "behavioral"      => self.behavioral,
            "network_risk"    => self.network_risk,
            "region_specific" => self.region_specific,
            _ => 0.0,
        }
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        [
            ("billing_zscore", self.billing_zscore),
            ("peer_deviation", self.peer_deviation),
            ("temporal_spike", self.temporal_spike),
            ("behavioral", self.behavioral),
            ("network_risk", self.network_risk),
            ("region_specific", self.region_specific),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Score cut-offs: `< review` is LOW, `< high` is REVIEW, otherwise HIGH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub review: f64,
    pub high:   f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self { review: 40.0, high: 70.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub lookback_days: u32,
    pub weights:       SignalWeights,
    pub bands:         RiskBands,
    pub max_drivers:   usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            weights:       SignalWeights::default(),
            bands:         RiskBands::default(),
            max_drivers:   10,
        }
    }
}

// ── Signal thresholds ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    /// Billing |z| that produces a driver.
    pub z_threshold: f64,
    /// Z-score at which the billing signal saturates at 100.
    pub z_saturation: f64,
    /// Provider total / peer average total that produces a driver.
    pub peer_ratio: f64,
    /// Peak month / prior-month mean that produces a driver.
    pub spike_ratio: f64,
    /// Top beneficiary claim share that produces a driver.
    pub concentration: f64,
    /// Below this many claims, beneficiary concentration is not assessed.
    pub behavioral_min_claims: i64,
    pub low_code_diversity: i64,
    pub code_diversity_claim_floor: i64,
    /// Anomalies at or above this z are high severity.
    pub high_severity_z: f64,
    /// Peak-day patients / licensed capacity that produces a driver.
    pub capacity_excess: f64,
    /// Window billing total considered high volume.
    pub high_volume_total: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            z_threshold:                3.0,
            z_saturation:               6.0,
            peer_ratio:                 2.0,
            spike_ratio:                2.0,
            concentration:              0.3,
            behavioral_min_claims:      10,
            low_code_diversity:         2,
            code_diversity_claim_floor: 50,
            high_severity_z:            5.0,
            capacity_excess:            1.0,
            high_volume_total:          2_000_000.0,
        }
    }
}

// ── Top-level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graph:      GraphConfig,
    pub scoring:    ScoringConfig,
    pub thresholds: SignalThresholds,
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    /// In tests, use EngineConfig::default().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("{path}: {e}"))?;
        Ok(config)
    }

    /// Check every invariant the graph and scoring code relies on.
    pub fn validate(&self) -> RiskResult<()> {
        let w = &self.scoring.weights;
        for (name, value) in w.as_map() {
            if !value.is_finite() || value < 0.0 {
                return Err(RiskError::invalid_config(format!(
                    "weight '{name}' must be a non-negative number, got {value}"
                )));
            }
        }
        let sum = w.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RiskError::invalid_config(format!(
                "signal weights must sum to 1.0 (±{WEIGHT_SUM_TOLERANCE}), got {sum:.4}"
            )));
        }

        let b = &self.scoring.bands;
        if !(b.review > 0.0 && b.review < b.high && b.high <= 100.0) {
            return Err(RiskError::invalid_config(format!(
                "risk bands must satisfy 0 < review < high <= 100, got {}/{}",
                b.review, b.high
            )));
        }

        let r = &self.graph.ring_bands;
        if !(r.medium > 0.0 && r.medium < r.high && r.high <= 100.0) {
            return Err(RiskError::invalid_config(format!(
                "ring bands must satisfy 0 < medium < high <= 100, got {}/{}",
                r.medium, r.high
            )));
        }

        if self.graph.min_ring_size < 2 {
            return Err(RiskError::invalid_config("min_ring_size must be at least 2"));
        }
        if self.graph.min_shared_patients == 0 {
            return Err(RiskError::invalid_config("min_shared_patients must be at least 1"));
        }
        if self.scoring.lookback_days == 0 {
            return Err(RiskError::invalid_config("lookback_days must be at least 1"));
        }
        if self.thresholds.z_saturation <= 0.0 {
            return Err(RiskError::invalid_config("z_saturation must be positive"));
        }
        Ok(())
    }
}
