use super::{peer_zscore, RiskSignal, SignalContext, SignalOutput};
use crate::{error::RiskResult, model::SignalStatus, store::PeerQuery};

/// Average claim amount against same-state peers.
///
/// Score rises linearly with positive z up to `z_saturation`. Billing below
/// the peer mean scores 0, but a deviation of `z_threshold` or more in
/// either direction still produces a driver.
pub struct BillingZScoreSignal;

impl RiskSignal for BillingZScoreSignal {
    fn name(&self) -> &'static str {
        "billing_zscore"
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
            facility_type:       None,
            state:               Some(provider.state.clone()),
            exclude_provider_id: provider.provider_id,
            date_range:          Some(ctx.window),
        })?;
        let peer_means: Vec<f64> = peers
            .iter()
            .filter(|row| row.claim_count > 0)
            .map(|row| row.avg_amount)
            .collect();

        let cmp = match peer_zscore(own.avg_amount, &peer_means) {
            Ok(cmp) => cmp,
            Err(status) => return Ok(SignalOutput::degraded(status)),
        };

        let t = ctx.thresholds;
        let score = cmp.z.max(0.0) / t.z_saturation * 100.0;

        let mut drivers = Vec::new();
        if cmp.z.abs() >= t.z_threshold {
            drivers.push(if cmp.peer_mean > 0.0 {
                format!(
                    "Billing {:.1}x peer average (z-score {:.1} vs {} peers in {})",
                    own.avg_amount / cmp.peer_mean,
                    cmp.z,
                    cmp.peers,
                    provider.state
                )
            } else {
                format!("Billing z-score {:.1} vs {} peers in {}", cmp.z, cmp.peers, provider.state)
            });
        }

        Ok(SignalOutput::computed(score, drivers))
    }
}
