//! Composite risk scoring: bounds, bands, weight validation, the peer
//! z-score scenario, monotonicity, determinism and driver handling.

mod common;

use chrono::NaiveDate;
use common::{as_of, date, Fixture};
use provider_risk_core::{
    anomaly::{Anomaly, AnomalySeverity, AnomalyType},
    config::{EngineConfig, RiskBands},
    error::RiskError,
    insights::NetworkContext,
    model::{RiskLevel, SignalStatus},
    scoring::RiskScoreAggregator,
    types::DateRange,
};

const SUBJECT: i64 = 100;

/// Two same-state clinic peers averaging $80 and $120 per claim (mean 100,
/// population stddev 20), an out-of-state outlier that must not count as a
/// peer, an idle clinic and the subject billing `subject_amount` per claim.
fn peer_market(subject_amount: f64) -> Fixture {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX").clinic(3, "CA").clinic(50, "TX");
    fx.clinic(SUBJECT, "TX");
    fx.routine_claims(1, 10, 80.0)
        .routine_claims(2, 10, 120.0)
        .routine_claims(3, 10, 5_000.0)
        .routine_claims(SUBJECT, 10, subject_amount);
    fx
}

fn aggregator(fx: &Fixture) -> RiskScoreAggregator<'_> {
    RiskScoreAggregator::new(&fx.store, &EngineConfig::default())
        .unwrap()
        .with_as_of(as_of())
}

#[test]
fn billing_outlier_scores_above_provider_at_peer_mean() {
    let x_market = peer_market(220.0);
    let y_market = peer_market(100.0);

    let x = aggregator(&x_market).score(SUBJECT, 365).unwrap();
    let y = aggregator(&y_market).score(SUBJECT, 365).unwrap();

    // z = (220 - 100) / 20 = 6 saturates the billing signal.
    assert_eq!(x.sub_scores["billing_zscore"], 100.0);
    assert!(
        x.drivers[0].contains("Billing 2.2x peer average (z-score 6.0"),
        "unexpected first driver: {:?}",
        x.drivers
    );
    assert_eq!(y.sub_scores["billing_zscore"], 0.0);
    assert!(y.drivers.is_empty(), "provider at the peer mean has drivers: {:?}", y.drivers);

    assert!(
        x.risk_score > y.risk_score,
        "outlier {} should outscore peer-mean provider {}",
        x.risk_score,
        y.risk_score
    );
    // 0.25 × 100 billing + 0.15 × 40 peer deviation.
    assert_eq!(x.risk_score, 31);
    assert_eq!(x.risk_level, RiskLevel::Low);
}

#[test]
fn raising_the_billing_outlier_never_lowers_the_score() {
    let mut previous = 0u8;
    for amount in [100.0, 140.0, 180.0, 220.0, 260.0, 400.0] {
        let fx = peer_market(amount);
        let score = aggregator(&fx).score(SUBJECT, 365).unwrap().risk_score;
        assert!(
            score >= previous,
            "score fell from {previous} to {score} when the average claim rose to {amount}"
        );
        previous = score;
    }
}

#[test]
fn scores_stay_within_bounds_and_bands() {
    let fx = peer_market(10_000.0);
    let agg = aggregator(&fx);
    let bands = RiskBands::default();

    for id in [1, 2, 3, 50, SUBJECT] {
        let result = agg.score(id, 365).unwrap();
        assert!(result.risk_score <= 100);
        assert_eq!(
            result.risk_level,
            RiskLevel::from_score(result.risk_score, &bands),
            "level inconsistent with score {}",
            result.risk_score
        );
        for (name, sub) in &result.sub_scores {
            assert!((0.0..=100.0).contains(sub), "{name} sub-score {sub} out of range");
        }
    }
}

#[test]
fn level_bands_follow_documented_thresholds() {
    let bands = RiskBands::default();
    assert_eq!(RiskLevel::from_score(0, &bands), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(39, &bands), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(40, &bands), RiskLevel::Review);
    assert_eq!(RiskLevel::from_score(69, &bands), RiskLevel::Review);
    assert_eq!(RiskLevel::from_score(70, &bands), RiskLevel::High);
    assert_eq!(RiskLevel::from_score(100, &bands), RiskLevel::High);
}

#[test]
fn weights_must_sum_to_one_at_construction() {
    let fx = Fixture::new();

    let mut config = EngineConfig::default();
    config.scoring.weights.billing_zscore = 0.5;
    match RiskScoreAggregator::new(&fx.store, &config) {
        Err(RiskError::InvalidConfig { reason }) => {
            assert!(reason.contains("sum to 1.0"), "unexpected reason: {reason}")
        }
        Err(other) => panic!("expected InvalidConfig, got {other}"),
        Ok(_) => panic!("weights summing to 1.25 were accepted"),
    }

    // Within ±0.001 is accepted.
    config.scoring.weights.billing_zscore = 0.2505;
    assert!(RiskScoreAggregator::new(&fx.store, &config).is_ok());

    config.scoring.weights.billing_zscore = -0.25;
    config.scoring.weights.peer_deviation = 0.65;
    assert!(RiskScoreAggregator::new(&fx.store, &config).is_err(), "negative weight accepted");
}

#[test]
fn zero_claim_provider_scores_zero() {
    let fx = peer_market(220.0);
    let result = aggregator(&fx).score(50, 365).unwrap();

    assert_eq!(result.risk_score, 0);
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(result.drivers.is_empty());
    assert!(!result.is_error());
    assert_eq!(result.signal_status["billing_zscore"], SignalStatus::NoActivity);
    assert_eq!(result.signal_status["temporal_spike"], SignalStatus::NoActivity);
    assert_eq!(result.sub_scores.len(), 6);
}

#[test]
fn unknown_provider_returns_explicit_unknown_result() {
    let fx = peer_market(220.0);
    let result = aggregator(&fx).score(999, 365).unwrap();

    assert_eq!(result.risk_score, 0);
    assert_eq!(result.risk_level, RiskLevel::Unknown);
    assert!(result.is_error());
    assert_eq!(result.error.as_deref(), Some("Provider 999 not found"));
    assert!(result.drivers.is_empty());
    assert_eq!(result.lookback_days, 365);
}

#[test]
fn result_carries_weights_and_metadata() {
    let fx = peer_market(220.0);
    let result = aggregator(&fx).score(SUBJECT, 90).unwrap();

    assert_eq!(result.provider_name.as_deref(), Some("Provider 100"));
    assert_eq!(result.lookback_days, 90);
    assert_eq!(result.weights, EngineConfig::default().scoring.weights.as_map());
    let total: f64 = result.weights.values().sum();
    assert!((total - 1.0).abs() < 1e-9);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["risk_level"], "LOW");
    assert!(json.get("error").is_none(), "error is omitted on success");
    assert!(json["analyzed_at"].is_string());
}

#[test]
fn repeated_scoring_is_identical() {
    let fx = peer_market(260.0);
    let agg = aggregator(&fx);
    let first = agg.score(SUBJECT, 365).unwrap();
    for _ in 0..3 {
        let again = agg.score(SUBJECT, 365).unwrap();
        assert_eq!(again.risk_score, first.risk_score);
        assert_eq!(again.drivers, first.drivers);
        assert_eq!(again.sub_scores, first.sub_scores);
    }

    let default = agg.score_default(SUBJECT).unwrap();
    assert_eq!(default.lookback_days, 365);
    assert_eq!(default.risk_score, first.risk_score);
}

#[test]
fn drivers_are_capped_in_signal_order() {
    let fx = peer_market(220.0);
    let full = aggregator(&fx).score(SUBJECT, 365).unwrap();
    assert_eq!(full.drivers.len(), 2, "billing and peer deviation both fire");
    assert!(full.drivers[1].starts_with("Total billing 2.2x average of 2 clinic peers"));

    let mut config = EngineConfig::default();
    config.scoring.max_drivers = 1;
    let capped = RiskScoreAggregator::new(&fx.store, &config)
        .unwrap()
        .with_as_of(as_of())
        .score(SUBJECT, 365)
        .unwrap();
    assert_eq!(capped.drivers, full.drivers[..1].to_vec());
    assert_eq!(capped.risk_score, full.risk_score, "the cap never changes the score");
}

#[test]
fn lookback_window_excludes_old_claims() {
    let fx = peer_market(220.0);
    // A provider whose only claims are two years old.
    fx.clinic(60, "TX");
    fx.claim(60, "old-1", "99213", 9_999.0, "2022-01-10");

    let result = aggregator(&fx).score(60, 365).unwrap();
    assert_eq!(result.risk_score, 0);
    assert!(result.drivers.is_empty());
}

#[test]
fn huge_lookback_starts_at_the_earliest_date() {
    let window = DateRange::lookback(as_of(), u32::MAX);
    assert_eq!(window.start, NaiveDate::MIN);
    assert_eq!(window.end, as_of());

    let fx = peer_market(220.0);
    let agg = aggregator(&fx);
    let wide = agg.score(SUBJECT, u32::MAX).unwrap();
    let year = agg.score(SUBJECT, 365).unwrap();
    assert_eq!(wide.lookback_days, u32::MAX);
    assert_eq!(wide.risk_score, year.risk_score);
    assert_eq!(wide.drivers, year.drivers);
}

#[test]
fn ring_membership_and_anomalies_raise_network_risk() {
    let fx = Fixture::new();
    for id in 1..=3 {
        fx.clinic(id, "TX");
    }
    fx.shared_patients("ring", &[1, 2, 3], 20);
    fx.store
        .insert_anomaly(&Anomaly {
            provider_id:  1,
            anomaly_type: AnomalyType::AvgClaimAmount,
            z_score:      6.2,
            severity:     AnomalySeverity::High,
            detected_on:  date("2024-03-01"),
            description:  "avg_claim_amount outlier".into(),
        })
        .unwrap();

    let config = EngineConfig::default();
    let plain = RiskScoreAggregator::new(&fx.store, &config)
        .unwrap()
        .with_as_of(as_of())
        .score(1, 365)
        .unwrap();
    // One anomaly (8) that is also high severity (15).
    assert_eq!(plain.sub_scores["network_risk"], 23.0);
    assert!(plain
        .drivers
        .iter()
        .any(|d| d == "1 prior billing anomalies (1 high severity)"));

    let context = NetworkContext::build(&fx.store, &config, None).unwrap();
    let networked = RiskScoreAggregator::new(&fx.store, &config)
        .unwrap()
        .with_as_of(as_of())
        .with_network_context(context)
        .score(1, 365)
        .unwrap();
    // Ring fraud score 70 (density 40 + weight 30) carries 30% into the signal.
    assert_eq!(networked.sub_scores["network_risk"], 44.0);
    assert!(networked
        .drivers
        .iter()
        .any(|d| d.starts_with("Member of fraud ring ring-001 (MEDIUM suspicion, 3 providers)")));
    assert!(networked.risk_score >= plain.risk_score);
}

#[test]
fn history_and_ring_membership_alone_do_not_score_an_idle_provider() {
    let fx = Fixture::new();
    for id in 1..=3 {
        fx.clinic(id, "TX");
    }
    // All ring activity is in May; the 30-day window ending 2024-06-30 misses it.
    fx.shared_patients("ring", &[1, 2, 3], 20);
    fx.store
        .insert_anomaly(&Anomaly {
            provider_id:  1,
            anomaly_type: AnomalyType::AvgClaimAmount,
            z_score:      6.2,
            severity:     AnomalySeverity::High,
            detected_on:  as_of(),
            description:  "avg_claim_amount outlier".into(),
        })
        .unwrap();

    let config = EngineConfig::default();
    let context = NetworkContext::build(&fx.store, &config, None).unwrap();
    assert!(context.summary(1).and_then(|s| s.ring_id.as_ref()).is_some());

    let result = RiskScoreAggregator::new(&fx.store, &config)
        .unwrap()
        .with_as_of(as_of())
        .with_network_context(context)
        .score(1, 30)
        .unwrap();

    assert_eq!(result.risk_score, 0);
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(result.drivers.is_empty(), "drivers: {:?}", result.drivers);
    assert_eq!(result.signal_status["network_risk"], SignalStatus::NoActivity);
}
