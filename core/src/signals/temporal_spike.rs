use super::{mean, ratio_score, RiskSignal, SignalContext, SignalOutput};
use crate::{
    error::RiskResult,
    model::SignalStatus,
    store::{ClaimQuery, GroupBy},
};

/// Peak calendar month against the mean of the billed months before it.
///
/// A provider whose busiest month is its first has no baseline and the
/// signal does not apply.
pub struct TemporalSpikeSignal;

impl RiskSignal for TemporalSpikeSignal {
    fn name(&self) -> &'static str {
        "temporal_spike"
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput> {
        let months = ctx.store.aggregate_claims(&ClaimQuery {
            provider_id: Some(ctx.provider.provider_id),
            date_range:  Some(ctx.window),
            group_by:    GroupBy::Month,
        })?;
        if months.is_empty() {
            return Ok(SignalOutput::degraded(SignalStatus::NoActivity));
        }

        // Earliest month wins ties.
        let mut peak = 0usize;
        for (i, row) in months.iter().enumerate() {
            if row.total_amount > months[peak].total_amount {
                peak = i;
            }
        }

        let prior: Vec<f64> = months[..peak].iter().map(|m| m.total_amount).collect();
        if prior.is_empty() {
            return Ok(SignalOutput::degraded(SignalStatus::NotApplicable));
        }
        let baseline = match mean(&prior) {
            Some(b) if b > 0.0 => b,
            _ => return Ok(SignalOutput::degraded(SignalStatus::DegenerateStatistics)),
        };

        let ratio = months[peak].total_amount / baseline;
        let threshold = ctx.thresholds.spike_ratio;

        let mut drivers = Vec::new();
        if ratio > threshold {
            let month = months[peak].key.as_deref().unwrap_or("unknown month");
            drivers.push(format!(
                "Billing spike in {month}: {ratio:.1}x prior monthly average"
            ));
        }

        Ok(SignalOutput::computed(ratio_score(ratio, threshold), drivers))
    }
}
