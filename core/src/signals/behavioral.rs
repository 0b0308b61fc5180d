use super::{RiskSignal, SignalContext, SignalOutput};
use crate::{
    error::RiskResult,
    model::SignalStatus,
    store::{ClaimQuery, GroupBy},
};

const CONCENTRATION_FLOOR: f64 = 30.0;
const CONCENTRATION_POINTS: f64 = 60.0;
const CODE_DIVERSITY_POINTS: f64 = 40.0;

/// Beneficiary concentration and billing-code diversity.
///
/// Concentration: share of claims going to the single busiest beneficiary.
/// Scores from 30 at the threshold up to 60 when one beneficiary takes
/// everything. The share alone is not the trigger: a provider below
/// `behavioral_min_claims` claims (default 10) is never flagged for
/// concentration, however concentrated. Set the gate to 1 to flag on share
/// alone.
///
/// Code diversity: a high-volume provider billing only a handful of codes
/// adds a flat 40.
pub struct BehavioralSignal;

impl RiskSignal for BehavioralSignal {
    fn name(&self) -> &'static str {
        "behavioral"
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> RiskResult<SignalOutput> {
        let t = ctx.thresholds;
        let totals = ctx
            .store
            .provider_totals(ctx.provider.provider_id, Some(ctx.window))?;
        if totals.claim_count == 0 {
            return Ok(SignalOutput::degraded(SignalStatus::NoActivity));
        }

        let mut score = 0.0;
        let mut drivers = Vec::new();

        if totals.claim_count >= t.behavioral_min_claims {
            let by_beneficiary = ctx.store.aggregate_claims(&ClaimQuery {
                provider_id: Some(ctx.provider.provider_id),
                date_range:  Some(ctx.window),
                group_by:    GroupBy::Beneficiary,
            })?;
            let top = by_beneficiary
                .iter()
                .map(|row| row.claim_count)
                .max()
                .unwrap_or(0);
            let share = top as f64 / totals.claim_count as f64;

            if share > t.concentration {
                let headroom = (1.0 - t.concentration).max(f64::EPSILON);
                let excess = ((share - t.concentration) / headroom).min(1.0);
                score += CONCENTRATION_FLOOR + (CONCENTRATION_POINTS - CONCENTRATION_FLOOR) * excess;
                drivers.push(format!(
                    "Top beneficiary accounts for {:.0}% of {} claims",
                    share * 100.0,
                    totals.claim_count
                ));
            }
        }

        if totals.claim_count > t.code_diversity_claim_floor
            && totals.distinct_codes <= t.low_code_diversity
        {
            score += CODE_DIVERSITY_POINTS;
            drivers.push(format!(
                "Only {} distinct billing code(s) across {} claims",
                totals.distinct_codes, totals.claim_count
            ));
        }

        Ok(SignalOutput::computed(score, drivers))
    }
}
