//! Composite risk scoring.
//!
//! RULE: the aggregator is a pure function of the claim snapshot, the
//! config and the optional network context. It keeps no state between
//! calls, so a cache wrapped around it is an optimisation only.
//!
//! risk_score = round(clamp(Σ weight_i × sub_score_i, 0, 100))
//! Sub-scores are clamped by each signal before weighting. Drivers are
//! concatenated in signal order and truncated to `max_drivers`.

use crate::{
    config::EngineConfig,
    error::RiskResult,
    insights::NetworkContext,
    model::{round4, RiskLevel, RiskScoreResult},
    signals::{clamp_score, default_signals, RiskSignal, SignalContext},
    store::ClaimStore,
    types::{DateRange, ProviderId},
};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

pub struct RiskScoreAggregator<'a> {
    store:   &'a dyn ClaimStore,
    config:  EngineConfig,
    signals: Vec<Box<dyn RiskSignal>>,
    network: Option<NetworkContext>,
    /// Window end date; None means today (UTC).
    as_of:   Option<NaiveDate>,
}

impl<'a> RiskScoreAggregator<'a> {
    /// Fails fast on an invalid config (weights not summing to 1.0, bad bands).
    pub fn new(store: &'a dyn ClaimStore, config: &EngineConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config: config.clone(),
            signals: default_signals(),
            network: None,
            as_of: None,
        })
    }

    /// Attach ring membership and centrality from a graph run.
    pub fn with_network_context(mut self, network: NetworkContext) -> Self {
        self.network = Some(network);
        self
    }

    /// Score as of a fixed date instead of today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    fn window(&self, lookback_days: u32) -> DateRange {
        let as_of = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        DateRange::lookback(as_of, lookback_days)
    }

    /// Score one provider. An unknown id yields the explicit UNKNOWN result;
    /// only store failures are errors.
    pub fn score(&self, provider_id: ProviderId, lookback_days: u32) -> RiskResult<RiskScoreResult> {
        let lookback_days = lookback_days.max(1);
        let Some(provider) = self.store.provider(provider_id)? else {
            log::debug!("Provider {provider_id} not found; returning UNKNOWN");
            return Ok(RiskScoreResult::not_found(provider_id, lookback_days));
        };

        let ctx = SignalContext {
            store:      self.store,
            provider:   &provider,
            window:     self.window(lookback_days),
            thresholds: &self.config.thresholds,
            network:    self
                .network
                .as_ref()
                .and_then(|n| n.summary(provider_id)),
        };

        let weights = &self.config.scoring.weights;
        let mut weighted_sum = 0.0;
        let mut drivers = Vec::new();
        let mut sub_scores = BTreeMap::new();
        let mut signal_status = BTreeMap::new();

        for signal in &self.signals {
            let output = signal.evaluate(&ctx)?;
            let sub = clamp_score(output.score);
            log::debug!(
                "Provider {provider_id} {}: {sub:.2} ({:?})",
                signal.name(),
                output.status
            );
            weighted_sum += weights.weight_for(signal.name()) * sub;
            sub_scores.insert(signal.name().to_string(), round4(sub));
            signal_status.insert(signal.name().to_string(), output.status);
            drivers.extend(output.drivers);
        }
        drivers.truncate(self.config.scoring.max_drivers);

        let risk_score = clamp_score(weighted_sum).round() as u8;

        Ok(RiskScoreResult {
            provider_id,
            provider_name: Some(provider.name),
            risk_score,
            risk_level: RiskLevel::from_score(risk_score, &self.config.scoring.bands),
            drivers,
            sub_scores,
            weights: weights.as_map(),
            signal_status,
            analyzed_at: Utc::now(),
            lookback_days,
            error: None,
        })
    }

    /// Score with the configured lookback.
    pub fn score_default(&self, provider_id: ProviderId) -> RiskResult<RiskScoreResult> {
        self.score(provider_id, self.config.scoring.lookback_days)
    }

    /// Score many providers, highest score first (ties by id).
    ///
    /// Without explicit ids the candidates are the `2 × limit` busiest
    /// providers in the lookback window. A provider whose scoring fails is
    /// logged and left out; the batch itself only fails if the candidate
    /// list cannot be read.
    pub fn batch_score(
        &self,
        provider_ids: Option<&[ProviderId]>,
        min_score: u8,
        limit: usize,
    ) -> RiskResult<Vec<RiskScoreResult>> {
        let lookback_days = self.config.scoring.lookback_days;
        let candidates: Vec<ProviderId> = match provider_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .store
                .top_providers_by_volume(limit.saturating_mul(2), Some(self.window(lookback_days)))?,
        };

        let mut failed = 0usize;
        let mut results: Vec<RiskScoreResult> = candidates
            .iter()
            .filter_map(|&id| match self.score(id, lookback_days) {
                Ok(result) => Some(result),
                Err(e) => {
                    failed += 1;
                    log::warn!("Batch scoring skipped provider {id}: {e}");
                    None
                }
            })
            .filter(|r| r.risk_score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then(a.provider_id.cmp(&b.provider_id))
        });
        results.truncate(limit);

        log::info!(
            "Batch scored {} of {} candidates ({} failed, min_score {min_score})",
            results.len(),
            candidates.len(),
            failed
        );
        Ok(results)
    }
}
