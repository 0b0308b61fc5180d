//! Shared fixtures: an in-memory claims store plus helpers for the claim
//! patterns the tests need (shared beneficiaries, peer groups, spikes).

#![allow(dead_code)]

use chrono::NaiveDate;
use provider_risk_core::{
    model::{Claim, Provider},
    store::SqliteClaimStore,
    types::ProviderId,
};

pub const AS_OF: &str = "2024-06-30";

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
}

pub fn as_of() -> NaiveDate {
    date(AS_OF)
}

pub fn provider(id: ProviderId, state: &str, facility_type: &str) -> Provider {
    Provider {
        provider_id:       id,
        name:              format!("Provider {id}"),
        npi:               Some(format!("{:010}", 1_000_000_000 + id)),
        state:             state.to_string(),
        region:            None,
        city:              None,
        address:           None,
        facility_type:     facility_type.to_string(),
        licensed_capacity: None,
    }
}

pub struct Fixture {
    pub store: SqliteClaimStore,
}

impl Fixture {
    pub fn new() -> Self {
        let store = SqliteClaimStore::in_memory().expect("in-memory store");
        store.migrate().expect("migration");
        Self { store }
    }

    pub fn add_provider(&self, p: Provider) -> &Self {
        self.store.insert_provider(&p).expect("insert provider");
        self
    }

    /// Insert a provider in `state` with facility type "clinic".
    pub fn clinic(&self, id: ProviderId, state: &str) -> &Self {
        self.add_provider(provider(id, state, "clinic"))
    }

    pub fn claim(
        &self,
        provider_id: ProviderId,
        beneficiary_id: &str,
        billing_code: &str,
        amount: f64,
        service_date: &str,
    ) -> &Self {
        self.store
            .insert_claim(&Claim {
                provider_id,
                beneficiary_id: beneficiary_id.to_string(),
                billing_code: billing_code.to_string(),
                amount,
                service_date: date(service_date),
                units: 1,
            })
            .expect("insert claim");
        self
    }

    /// `count` claims of `amount`, each for a beneficiary only this provider
    /// sees, spread over distinct codes and days in June 2024.
    pub fn routine_claims(&self, provider_id: ProviderId, count: usize, amount: f64) -> &Self {
        for i in 0..count {
            self.claim(
                provider_id,
                &format!("own-{provider_id}-{i}"),
                &format!("9921{}", i % 5),
                amount,
                &format!("2024-06-{:02}", 1 + i % 28),
            );
        }
        self
    }

    /// Every provider in `group` bills the same `count` beneficiaries, so each
    /// pair in the group shares exactly `count` patients.
    pub fn shared_patients(&self, tag: &str, group: &[ProviderId], count: usize) -> &Self {
        for i in 0..count {
            let beneficiary = format!("shared-{tag}-{i}");
            for &p in group {
                self.claim(p, &beneficiary, "99213", 100.0, "2024-05-15");
            }
        }
        self
    }
}
