use super::{mean, ratio_score, RiskSignal, SignalContext, SignalOutput, MIN_PEER_GROUP};
use crate::{error::RiskResult, model::SignalStatus, store::PeerQuery};

/// Total billing against the average of providers with the same facility
/// type in the same state.
pub struct PeerDeviationSignal;

impl RiskSignal for PeerDeviationSignal {
    fn name(&self) -> &'static str {
        "peer_deviation"
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput> {
        let provider = ctx.provider;
        let own = ctx
            .store
            .provider_totals(provider.provider_id, Some(ctx.window))?;
        if own.claim_count == 0 {
            return Ok(SignalOutput::degraded(SignalStatus::NoActivity));
        }

        let peers = ctx.store.peer_claims(&PeerQuery {
            facility_type:       Some(provider.facility_type.clone()),
            state:               Some(provider.state.clone()),
            exclude_provider_id: provider.provider_id,
            date_range:          Some(ctx.window),
        })?;
        let totals: Vec<f64> = peers
            .iter()
            .filter(|row| row.claim_count > 0)
            .map(|row| row.total_amount)
            .collect();
        if totals.len() < MIN_PEER_GROUP {
            return Ok(SignalOutput::degraded(SignalStatus::InsufficientPeerData));
        }
        let peer_avg = match mean(&totals) {
            Some(avg) if avg > 0.0 => avg,
            _ => return Ok(SignalOutput::degraded(SignalStatus::DegenerateStatistics)),
        };

        let ratio = own.total_amount / peer_avg;
        let threshold = ctx.thresholds.peer_ratio;

        let mut drivers = Vec::new();
        if ratio > threshold {
            drivers.push(format!(
                "Total billing {:.1}x average of {} {} peers in {}",
                ratio,
                totals.len(),
                provider.facility_type,
                provider.state
            ));
        }

        Ok(SignalOutput::computed(ratio_score(ratio, threshold), drivers))
    }
}
