use super::{RiskSignal, SignalContext, SignalOutput};
use crate::{
    error::RiskResult,
    model::SignalStatus,
    store::{ClaimQuery, GroupBy},
};

const CAPACITY_FLOOR: f64 = 20.0;
const CAPACITY_POINTS: f64 = 60.0;
const VOLUME_FLOOR: f64 = 20.0;
const VOLUME_POINTS: f64 = 40.0;

/// Capacity and volume checks against the provider's licence.
///
/// Capacity: the busiest service day's distinct patients against licensed
/// capacity. Providers without a recorded capacity skip this check.
/// Volume: window billing above `high_volume_total`.
pub struct RegionSpecificSignal;

impl RiskSignal for RegionSpecificSignal {
    fn name(&self) -> &'static str {
        "region_specific"
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput> {
        let t = ctx.thresholds;
        let provider = ctx.provider;
        let totals = ctx
            .store
            .provider_totals(provider.provider_id, Some(ctx.window))?;
        if totals.claim_count == 0 {
            return Ok(SignalOutput::degraded(SignalStatus::NoActivity));
        }

        let mut score = 0.0;
        let mut drivers = Vec::new();

        if let Some(capacity) = provider.licensed_capacity.filter(|&c| c > 0) {
            let days = ctx.store.aggregate_claims(&ClaimQuery {
                provider_id: Some(provider.provider_id),
                date_range:  Some(ctx.window),
                group_by:    GroupBy::ServiceDate,
            })?;
            if let Some(busiest) = days.iter().max_by(|a, b| {
                a.distinct_beneficiaries
                    .cmp(&b.distinct_beneficiaries)
                    // Earliest date wins ties.
                    .then_with(|| b.key.cmp(&a.key))
            }) {
                let excess = busiest.distinct_beneficiaries as f64 / capacity as f64;
                if excess > t.capacity_excess {
                    let over = (excess - t.capacity_excess) / t.capacity_excess.max(f64::EPSILON);
                    score += (CAPACITY_FLOOR + (CAPACITY_POINTS - CAPACITY_FLOOR) * over)
                        .min(CAPACITY_POINTS);
                    drivers.push(format!(
                        "{} patients on {} against licensed capacity {} ({:.1}x)",
                        busiest.distinct_beneficiaries,
                        busiest.key.as_deref().unwrap_or("peak day"),
                        capacity,
                        excess
                    ));
                }
            }
        }

        if t.high_volume_total > 0.0 && totals.total_amount > t.high_volume_total {
            let over = totals.total_amount / t.high_volume_total - 1.0;
            score += (VOLUME_FLOOR + (VOLUME_POINTS - VOLUME_FLOOR) * over).min(VOLUME_POINTS);
            drivers.push(format!(
                "High billing volume: {:.0} in window (threshold {:.0})",
                totals.total_amount, t.high_volume_total
            ));
        }

        Ok(SignalOutput::computed(score, drivers))
    }
}
