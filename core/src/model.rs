//! Reference entities and the serialisable result shapes produced by the core.
//!
//! Providers and claims are read-only here: they are created during ingestion
//! and the core never mutates them.

use crate::{
    config::{RingBands, RiskBands},
    error::RiskError,
    types::{BeneficiaryId, ProviderId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decimal places used for every float returned at the JSON boundary.
pub const BOUNDARY_PRECISION: i32 = 4;

/// Round a float to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn round4(value: f64) -> f64 {
    round_to(value, BOUNDARY_PRECISION)
}

// ── Reference entities ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id:       ProviderId,
    pub name:              String,
    /// NPI-equivalent registry identifier.
    #[serde(default)]
    pub npi:               Option<String>,
    pub state:             String,
    #[serde(default)]
    pub region:            Option<String>,
    #[serde(default)]
    pub city:              Option<String>,
    #[serde(default)]
    pub address:           Option<String>,
    pub facility_type:     String,
    #[serde(default)]
    pub licensed_capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub provider_id:    ProviderId,
    pub beneficiary_id: BeneficiaryId,
    pub billing_code:   String,
    pub amount:         f64,
    pub service_date:   NaiveDate,
    #[serde(default = "default_units")]
    pub units:          i64,
}

fn default_units() -> i64 {
    1
}

// ── Risk levels ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Review,
    High,
    /// Only used for providers that could not be scored at all.
    Unknown,
}

impl RiskLevel {
    pub fn from_score(score: u8, bands: &RiskBands) -> Self {
        let s = f64::from(score);
        if s >= bands.high {
            Self::High
        } else if s >= bands.review {
            Self::Review
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low     => "LOW",
            Self::Review  => "REVIEW",
            Self::High    => "HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspicionLevel {
    Low,
    Medium,
    High,
}

impl SuspicionLevel {
    pub fn from_fraud_score(fraud_score: f64, bands: &RingBands) -> Self {
        if fraud_score >= bands.high {
            Self::High
        } else if fraud_score >= bands.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low    => "LOW",
            Self::Medium => "MEDIUM",
            Self::High   => "HIGH",
        }
    }
}

// ── Signal outcome ───────────────────────────────────────────────────────────

/// Why a signal produced the score it did. Degraded states are ordinary
/// values: a signal that cannot be computed scores 0.0 and says why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Computed,
    /// The provider has no claims in the lookback window.
    NoActivity,
    /// Fewer than two peers to compare against.
    InsufficientPeerData,
    /// Zero standard deviation, zero mean or zero baseline.
    DegenerateStatistics,
    /// The signal's inputs do not exist for this provider.
    NotApplicable,
}

// ── Risk score result ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreResult {
    pub provider_id:   ProviderId,
    pub provider_name: Option<String>,
    pub risk_score:    u8,
    pub risk_level:    RiskLevel,
    pub drivers:       Vec<String>,
    pub sub_scores:    BTreeMap<String, f64>,
    pub weights:       BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signal_status: BTreeMap<String, SignalStatus>,
    pub analyzed_at:   DateTime<Utc>,
    pub lookback_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:         Option<String>,
}

impl RiskScoreResult {
    /// The explicit zero-score result returned for an unknown provider id.
    pub fn not_found(provider_id: ProviderId, lookback_days: u32) -> Self {
        Self {
            provider_id,
            provider_name: None,
            risk_score:    0,
            risk_level:    RiskLevel::Unknown,
            drivers:       Vec::new(),
            sub_scores:    BTreeMap::new(),
            weights:       BTreeMap::new(),
            signal_status: BTreeMap::new(),
            analyzed_at:   Utc::now(),
            lookback_days,
            error:         Some(RiskError::ProviderNotFound { provider_id }.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
