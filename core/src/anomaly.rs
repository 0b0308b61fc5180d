//! Batch anomaly scan.
//!
//! Compares every provider's average claim amount and claim volume in the
//! lookback window against the other providers in the same state. Outliers
//! at or above `z_threshold` become Anomaly records; persisted anomalies
//! feed the network-risk signal on later scoring runs.

use crate::{
    config::{EngineConfig, SignalThresholds},
    error::RiskResult,
    model::round4,
    signals::peer_zscore,
    store::{AggregateRow, ClaimStore, PeerQuery},
    types::{DateRange, ProviderId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// Average claim amount far above state peers.
    AvgClaimAmount,
    /// Claim count far above state peers.
    ClaimVolume,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AvgClaimAmount => "avg_claim_amount",
            Self::ClaimVolume    => "claim_volume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    /// High at `high_severity_z`, medium from halfway between the driver
    /// threshold and that.
    pub fn from_z(z: f64, t: &SignalThresholds) -> Self {
        let medium = (t.z_threshold + t.high_severity_z) / 2.0;
        if z.abs() >= t.high_severity_z {
            Self::High
        } else if z.abs() >= medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low    => "low",
            Self::Medium => "medium",
            Self::High   => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub provider_id:  ProviderId,
    pub anomaly_type: AnomalyType,
    pub z_score:      f64,
    pub severity:     AnomalySeverity,
    pub detected_on:  NaiveDate,
    pub description:  String,
}

pub struct AnomalyScanner {
    thresholds:    SignalThresholds,
    lookback_days: u32,
}

impl AnomalyScanner {
    pub fn new(config: &EngineConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            thresholds:    config.thresholds.clone(),
            lookback_days: config.scoring.lookback_days,
        })
    }

    /// Anomalies for every provider as of `as_of`, in provider id order.
    /// Providers without claims or without enough peers are skipped.
    pub fn scan(&self, store: &dyn ClaimStore, as_of: NaiveDate) -> RiskResult<Vec<Anomaly>> {
        let window = DateRange::lookback(as_of, self.lookback_days);
        let mut found = Vec::new();

        for provider in store.providers()? {
            let own = store.provider_totals(provider.provider_id, Some(window))?;
            if own.claim_count == 0 {
                continue;
            }
            let peers: Vec<AggregateRow> = store
                .peer_claims(&PeerQuery {
                    facility_type:       None,
                    state:               Some(provider.state.clone()),
                    exclude_provider_id: provider.provider_id,
                    date_range:          Some(window),
                })?
                .into_iter()
                .filter(|row| row.claim_count > 0)
                .collect();

            let checks = [
                (
                    AnomalyType::AvgClaimAmount,
                    own.avg_amount,
                    peers.iter().map(|r| r.avg_amount).collect::<Vec<_>>(),
                ),
                (
                    AnomalyType::ClaimVolume,
                    own.claim_count as f64,
                    peers.iter().map(|r| r.claim_count as f64).collect::<Vec<_>>(),
                ),
            ];

            for (anomaly_type, value, peer_values) in checks {
                let Ok(cmp) = peer_zscore(value, &peer_values) else {
                    continue;
                };
                if cmp.z < self.thresholds.z_threshold {
                    continue;
                }
                found.push(Anomaly {
                    provider_id: provider.provider_id,
                    anomaly_type,
                    z_score: round4(cmp.z),
                    severity: AnomalySeverity::from_z(cmp.z, &self.thresholds),
                    detected_on: as_of,
                    description: format!(
                        "{} {:.2} vs {} peer mean {:.2} (z-score {:.1})",
                        anomaly_type.as_str(),
                        value,
                        provider.state,
                        cmp.peer_mean,
                        cmp.z
                    ),
                });
            }
        }

        log::info!(
            "Anomaly scan as of {as_of}: {} anomalies ({} high severity)",
            found.len(),
            found.iter().filter(|a| a.severity == AnomalySeverity::High).count()
        );
        Ok(found)
    }
}
