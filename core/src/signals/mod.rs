//! Statistical signal providers.
//!
//! RULE: Every signal implements RiskSignal and reads ONLY ClaimStore
//! aggregates (plus an optional network summary) for one provider and one
//! lookback window. Signals never write and never call each other.
//!
//! A signal whose denominator is zero or whose peer group is too small
//! scores 0.0 with no driver and reports why in its status. Errors are
//! reserved for the store being unavailable.

use crate::{
    config::SignalThresholds,
    error::RiskResult,
    insights::NetworkRiskSummary,
    model::{Provider, SignalStatus},
    store::ClaimStore,
    types::DateRange,
};

mod behavioral;
mod billing_zscore;
mod network_risk;
mod peer_deviation;
mod region_specific;
mod temporal_spike;

pub use behavioral::BehavioralSignal;
pub use billing_zscore::BillingZScoreSignal;
pub use network_risk::NetworkRiskSignal;
pub use peer_deviation::PeerDeviationSignal;
pub use region_specific::RegionSpecificSignal;
pub use temporal_spike::TemporalSpikeSignal;

/// Smallest peer group a comparison is made against.
pub const MIN_PEER_GROUP: usize = 2;

/// Everything a signal may look at.
pub struct SignalContext<'a> {
    pub store:      &'a dyn ClaimStore,
    pub provider:   &'a Provider,
    pub window:     DateRange,
    pub thresholds: &'a SignalThresholds,
    pub network:    Option<&'a NetworkRiskSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutput {
    /// Always within [0, 100].
    pub score:   f64,
    pub drivers: Vec<String>,
    pub status:  SignalStatus,
}

impl SignalOutput {
    pub fn computed(score: f64, drivers: Vec<String>) -> Self {
        Self {
            score: clamp_score(score),
            drivers,
            status: SignalStatus::Computed,
        }
    }

    /// Zero score, no drivers.
    pub fn degraded(status: SignalStatus) -> Self {
        Self {
            score: 0.0,
            drivers: Vec::new(),
            status,
        }
    }
}

/// The contract every signal layer fulfils.
pub trait RiskSignal: Send + Sync {
    /// Stable name; also the key in `sub_scores` and the weight map.
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput>;
}

/// All six layers in their fixed evaluation order. Driver order in a
/// RiskScoreResult follows this order.
pub fn default_signals() -> Vec<Box<dyn RiskSignal>> {
    vec![
        Box::new(BillingZScoreSignal),
        Box::new(PeerDeviationSignal),
        Box::new(TemporalSpikeSignal),
        Box::new(BehavioralSignal),
        Box::new(NetworkRiskSignal),
        Box::new(RegionSpecificSignal),
    ]
}

// ── Guarded statistics ───────────────────────────────────────────────────────

/// Clamp into [0, 100]; NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Peer comparison of one value against a peer distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerComparison {
    pub z:         f64,
    pub peer_mean: f64,
    pub peer_std:  f64,
    pub peers:     usize,
}

/// Z-score of `value` against `peers`, or the reason it cannot be computed.
pub fn peer_zscore(value: f64, peers: &[f64]) -> Result<PeerComparison, SignalStatus> {
    if peers.len() < MIN_PEER_GROUP {
        return Err(SignalStatus::InsufficientPeerData);
    }
    let (Some(peer_mean), Some(peer_std)) = (mean(peers), std_dev(peers)) else {
        return Err(SignalStatus::InsufficientPeerData);
    };
    if peer_std.is_nan() || peer_std <= f64::EPSILON {
        return Err(SignalStatus::DegenerateStatistics);
    }
    Ok(PeerComparison {
        z: (value - peer_mean) / peer_std,
        peer_mean,
        peer_std,
        peers: peers.len(),
    })
}

/// Score for a ratio against a baseline of 1.0: 0 at parity, 100 once the
/// ratio reaches twice the driver threshold.
pub fn ratio_score(ratio: f64, threshold: f64) -> f64 {
    let saturation = (2.0 * threshold - 1.0).max(f64::EPSILON);
    clamp_score((ratio - 1.0) / saturation * 100.0)
}
