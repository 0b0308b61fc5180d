//! Individual signal layers and their degraded-input guards.

mod common;

use common::{as_of, provider, Fixture};
use provider_risk_core::{
    config::SignalThresholds,
    insights::NetworkRiskSummary,
    model::{SignalStatus, SuspicionLevel},
    signals::{
        peer_zscore, BehavioralSignal, BillingZScoreSignal, NetworkRiskSignal, PeerDeviationSignal,
        RegionSpecificSignal, RiskSignal, SignalContext, SignalOutput, TemporalSpikeSignal,
    },
    store::ClaimStore,
    types::{DateRange, ProviderId},
};

fn evaluate_with(
    signal: &dyn RiskSignal,
    fx: &Fixture,
    id: ProviderId,
    network: Option<&NetworkRiskSummary>,
) -> SignalOutput {
    let provider = fx.store.provider(id).unwrap().expect("provider exists");
    let thresholds = SignalThresholds::default();
    let ctx = SignalContext {
        store: &fx.store,
        provider: &provider,
        window: DateRange::lookback(as_of(), 365),
        thresholds: &thresholds,
        network,
    };
    signal.evaluate(&ctx).expect("signal evaluation")
}

fn evaluate(signal: &dyn RiskSignal, fx: &Fixture, id: ProviderId) -> SignalOutput {
    evaluate_with(signal, fx, id, None)
}

#[test]
fn zscore_guards_small_and_flat_peer_groups() {
    assert_eq!(peer_zscore(10.0, &[5.0]), Err(SignalStatus::InsufficientPeerData));
    assert_eq!(peer_zscore(10.0, &[]), Err(SignalStatus::InsufficientPeerData));
    assert_eq!(peer_zscore(10.0, &[5.0, 5.0, 5.0]), Err(SignalStatus::DegenerateStatistics));

    let cmp = peer_zscore(220.0, &[80.0, 120.0]).unwrap();
    assert_eq!(cmp.peer_mean, 100.0);
    assert_eq!(cmp.peer_std, 20.0);
    assert_eq!(cmp.z, 6.0);
}

#[test]
fn billing_signal_needs_two_peers() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX");
    fx.routine_claims(1, 10, 100.0).routine_claims(2, 10, 900.0);

    let out = evaluate(&BillingZScoreSignal, &fx, 2);
    assert_eq!(out.status, SignalStatus::InsufficientPeerData);
    assert_eq!(out.score, 0.0);
    assert!(out.drivers.is_empty());
}

#[test]
fn billing_signal_guards_zero_stddev() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX").clinic(3, "TX");
    fx.routine_claims(1, 10, 100.0)
        .routine_claims(2, 10, 100.0)
        .routine_claims(3, 10, 900.0);

    let out = evaluate(&BillingZScoreSignal, &fx, 3);
    assert_eq!(out.status, SignalStatus::DegenerateStatistics);
    assert_eq!(out.score, 0.0);
}

#[test]
fn billing_below_peers_is_not_risk() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX").clinic(3, "TX");
    fx.routine_claims(1, 10, 80.0)
        .routine_claims(2, 10, 120.0)
        .routine_claims(3, 10, 10.0);

    // z = (10 - 100) / 20 = -4.5: explained, but never scored.
    let out = evaluate(&BillingZScoreSignal, &fx, 3);
    assert_eq!(out.status, SignalStatus::Computed);
    assert_eq!(out.score, 0.0);
    assert_eq!(
        out.drivers,
        vec!["Billing 0.1x peer average (z-score -4.5 vs 2 peers in TX)"]
    );

    // Within the threshold on the low side: no driver.
    fx.clinic(4, "TX");
    fx.routine_claims(4, 10, 60.0);
    let out = evaluate(&BillingZScoreSignal, &fx, 4);
    assert_eq!(out.score, 0.0);
    assert!(out.drivers.is_empty(), "drivers: {:?}", out.drivers);
}

#[test]
fn peer_deviation_compares_facility_type_peers() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX").clinic(3, "TX");
    fx.add_provider(provider(4, "TX", "hospital"));
    fx.routine_claims(1, 10, 100.0)
        .routine_claims(2, 10, 100.0)
        .routine_claims(3, 20, 250.0)
        .routine_claims(4, 10, 100_000.0);

    // 5000 against a 1000 clinic average: ratio 5 saturates.
    let out = evaluate(&PeerDeviationSignal, &fx, 3);
    assert_eq!(out.score, 100.0);
    assert_eq!(out.drivers, vec!["Total billing 5.0x average of 2 clinic peers in TX"]);

    // The hospital has no hospital peers at all.
    let out = evaluate(&PeerDeviationSignal, &fx, 4);
    assert_eq!(out.status, SignalStatus::InsufficientPeerData);
}

#[test]
fn temporal_spike_measures_peak_against_prior_months() {
    let fx = Fixture::new();
    fx.clinic(1, "TX");
    for month in 1..=4 {
        fx.claim(1, &format!("b-{month}"), "99213", 1_000.0, &format!("2024-{month:02}-10"));
    }
    for i in 0..5 {
        fx.claim(1, &format!("spike-{i}"), "99213", 1_000.0, "2024-05-20");
    }

    let out = evaluate(&TemporalSpikeSignal, &fx, 1);
    assert_eq!(out.status, SignalStatus::Computed);
    // 5000 against a 1000 baseline: ratio 5 saturates at 2 × 2.0 threshold.
    assert_eq!(out.score, 100.0);
    assert_eq!(out.drivers, vec!["Billing spike in 2024-05: 5.0x prior monthly average"]);
}

#[test]
fn temporal_spike_without_baseline_does_not_apply() {
    let fx = Fixture::new();
    fx.clinic(1, "TX");
    fx.claim(1, "b-1", "99213", 5_000.0, "2024-01-10");
    fx.claim(1, "b-2", "99213", 100.0, "2024-02-10");

    let out = evaluate(&TemporalSpikeSignal, &fx, 1);
    assert_eq!(out.status, SignalStatus::NotApplicable);
    assert_eq!(out.score, 0.0);
}

#[test]
fn behavioral_flags_concentration_and_low_code_diversity() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX");
    // 60 claims, one code, half of them for a single beneficiary.
    for i in 0..30 {
        fx.claim(1, "frequent-flyer", "G0151", 50.0, &format!("2024-04-{:02}", 1 + i % 28));
        fx.claim(1, &format!("other-{i}"), "G0151", 50.0, &format!("2024-05-{:02}", 1 + i % 28));
    }
    // Under the minimum claim count, concentration is not assessed.
    for _ in 0..5 {
        fx.claim(2, "only-patient", "99213", 50.0, "2024-05-01");
    }

    let out = evaluate(&BehavioralSignal, &fx, 1);
    assert_eq!(out.drivers.len(), 2, "drivers: {:?}", out.drivers);
    assert!(out.drivers[0].starts_with("Top beneficiary accounts for 50% of 60 claims"));
    assert!(out.drivers[1].starts_with("Only 1 distinct billing code(s) across 60 claims"));
    // Concentration 30 + 30 × (0.5 - 0.3) / 0.7 plus the flat 40 for codes.
    let expected = 30.0 + 30.0 * (0.2 / 0.7) + 40.0;
    assert!((out.score - expected).abs() < 1e-9, "got {}", out.score);

    let out = evaluate(&BehavioralSignal, &fx, 2);
    assert_eq!(out.score, 0.0);
    assert!(out.drivers.is_empty());
}

#[test]
fn concentration_needs_the_minimum_claim_count() {
    let fx = Fixture::new();
    fx.clinic(1, "TX");
    for day in 1..=9 {
        fx.claim(1, "only-patient", "99213", 50.0, &format!("2024-05-{day:02}"));
    }
    let provider = fx.store.provider(1).unwrap().expect("provider exists");
    let evaluate_gate = |min_claims: i64| {
        let thresholds = SignalThresholds {
            behavioral_min_claims: min_claims,
            ..SignalThresholds::default()
        };
        let ctx = SignalContext {
            store:      &fx.store,
            provider:   &provider,
            window:     DateRange::lookback(as_of(), 365),
            thresholds: &thresholds,
            network:    None,
        };
        BehavioralSignal.evaluate(&ctx).expect("signal evaluation")
    };

    // Nine claims, all for one beneficiary: under the default gate of ten.
    let gated = evaluate_gate(10);
    assert_eq!(gated.score, 0.0);
    assert!(gated.drivers.is_empty());

    let open = evaluate_gate(1);
    assert_eq!(open.score, 60.0);
    assert_eq!(open.drivers, vec!["Top beneficiary accounts for 100% of 9 claims"]);
}

#[test]
fn region_signal_checks_licensed_capacity() {
    let fx = Fixture::new();
    fx.add_provider(provider_with_capacity(1, 4));
    fx.add_provider(provider_with_capacity(2, 0));
    for i in 0..8 {
        fx.claim(1, &format!("p-{i}"), "99213", 100.0, "2024-06-03");
        fx.claim(2, &format!("q-{i}"), "99213", 100.0, "2024-06-03");
    }

    let out = evaluate(&RegionSpecificSignal, &fx, 1);
    // 8 patients against capacity 4: 2x, which saturates capacity at 60.
    assert_eq!(out.score, 60.0);
    assert_eq!(
        out.drivers,
        vec!["8 patients on 2024-06-03 against licensed capacity 4 (2.0x)"]
    );

    // No recorded capacity means no capacity check.
    let out = evaluate(&RegionSpecificSignal, &fx, 2);
    assert_eq!(out.score, 0.0);
    assert_eq!(out.status, SignalStatus::Computed);
}

#[test]
fn region_signal_flags_high_volume() {
    let fx = Fixture::new();
    fx.clinic(1, "TX");
    fx.routine_claims(1, 10, 300_000.0);

    let out = evaluate(&RegionSpecificSignal, &fx, 1);
    // 3M against 2M: 20 + 20 × 0.5.
    assert!((out.score - 30.0).abs() < 1e-9, "got {}", out.score);
    assert_eq!(out.drivers.len(), 1);
    assert!(out.drivers[0].starts_with("High billing volume"));
}

#[test]
fn network_signal_uses_ring_and_broker_summary() {
    let fx = Fixture::new();
    fx.clinic(1, "TX");
    fx.routine_claims(1, 5, 100.0);

    let quiet = evaluate(&NetworkRiskSignal, &fx, 1);
    assert_eq!(quiet.status, SignalStatus::Computed);
    assert_eq!(quiet.score, 0.0);
    assert!(quiet.drivers.is_empty());

    let summary = NetworkRiskSummary {
        ring_id:          Some("ring-002".into()),
        ring_fraud_score: 90.0,
        ring_suspicion:   Some(SuspicionLevel::High),
        ring_size:        4,
        degree:           5,
        betweenness:      0.25,
    };
    let out = evaluate_with(&NetworkRiskSignal, &fx, 1, Some(&summary));
    // 90 × 0.3 for the ring plus 10 for the broker position.
    assert!((out.score - 37.0).abs() < 1e-9, "got {}", out.score);
    assert_eq!(
        out.drivers,
        vec![
            "Member of fraud ring ring-002 (HIGH suspicion, 4 providers)".to_string(),
            "Network broker: betweenness 0.25 across 5 connections".to_string(),
        ]
    );
}

#[test]
fn every_signal_reports_no_activity_for_idle_provider() {
    let fx = Fixture::new();
    fx.clinic(1, "TX").clinic(2, "TX").clinic(3, "TX");
    fx.routine_claims(2, 10, 100.0).routine_claims(3, 10, 200.0);

    let signals: Vec<Box<dyn RiskSignal>> = vec![
        Box::new(BillingZScoreSignal),
        Box::new(PeerDeviationSignal),
        Box::new(TemporalSpikeSignal),
        Box::new(BehavioralSignal),
        Box::new(NetworkRiskSignal),
        Box::new(RegionSpecificSignal),
    ];
    // Provider 1 sits in a high-suspicion ring but billed nothing.
    let summary = NetworkRiskSummary {
        ring_id:          Some("ring-001".into()),
        ring_fraud_score: 95.0,
        ring_suspicion:   Some(SuspicionLevel::High),
        ring_size:        3,
        degree:           2,
        betweenness:      0.5,
    };
    for signal in &signals {
        let out = evaluate_with(signal.as_ref(), &fx, 1, Some(&summary));
        assert_eq!(out.status, SignalStatus::NoActivity, "{}", signal.name());
        assert_eq!(out.score, 0.0, "{}", signal.name());
        assert!(out.drivers.is_empty(), "{}", signal.name());
    }
}

fn provider_with_capacity(id: ProviderId, capacity: i64) -> provider_risk_core::model::Provider {
    provider_risk_core::model::Provider {
        licensed_capacity: Some(capacity),
        ..provider(id, "TX", "adult_day_care")
    }
}
