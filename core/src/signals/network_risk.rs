use super::{RiskSignal, SignalContext, SignalOutput};
use crate::{error::RiskResult, model::SignalStatus};

const ANOMALY_POINTS_EACH: f64 = 8.0;
const ANOMALY_POINTS_CAP: f64 = 40.0;
const HIGH_SEVERITY_POINTS_EACH: f64 = 15.0;
const HIGH_SEVERITY_POINTS_CAP: f64 = 30.0;
/// Share of a ring's fraud score carried into a member's network signal.
const RING_SHARE: f64 = 0.3;
const BROKER_BETWEENNESS: f64 = 0.1;
const BROKER_POINTS: f64 = 10.0;

/// Prior anomaly history plus, when a network context is attached, fraud
/// ring membership and broker position.
///
/// A provider with no claims in the window scores 0 here like every other
/// layer, whatever its history or network position.
pub struct NetworkRiskSignal;

impl RiskSignal for NetworkRiskSignal {
    fn name(&self) -> &'static str {
        "network_risk"
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput> {
        let totals = ctx
            .store
            .provider_totals(ctx.provider.provider_id, Some(ctx.window))?;
        if totals.claim_count == 0 {
            return Ok(SignalOutput::degraded(SignalStatus::NoActivity));
        }

        let counts = ctx.store.anomaly_counts(
            ctx.provider.provider_id,
            Some(ctx.window),
            ctx.thresholds.high_severity_z,
        )?;

        let mut score = (counts.total as f64 * ANOMALY_POINTS_EACH).min(ANOMALY_POINTS_CAP)
            + (counts.high_severity as f64 * HIGH_SEVERITY_POINTS_EACH).min(HIGH_SEVERITY_POINTS_CAP);
        let mut drivers = Vec::new();
        if counts.total > 0 {
            drivers.push(format!(
                "{} prior billing anomalies ({} high severity)",
                counts.total, counts.high_severity
            ));
        }

        if let Some(summary) = ctx.network {
            if let (Some(ring_id), Some(level)) = (&summary.ring_id, summary.ring_suspicion) {
                score += summary.ring_fraud_score * RING_SHARE;
                drivers.push(format!(
                    "Member of fraud ring {ring_id} ({} suspicion, {} providers)",
                    level.as_str(),
                    summary.ring_size
                ));
            }
            if summary.betweenness >= BROKER_BETWEENNESS {
                score += BROKER_POINTS;
                drivers.push(format!(
                    "Network broker: betweenness {:.2} across {} connections",
                    summary.betweenness, summary.degree
                ));
            }
        }

        Ok(SignalOutput::computed(score, drivers))
    }
}
