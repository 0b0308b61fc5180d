//! Claims persistence and the read-only query contract the core depends on.
//!
//! RULE: Only the store talks to the database.
//! Graph building, signals and reports call `ClaimStore` methods; they never
//! execute SQL directly and never write.

use crate::{
    error::RiskResult,
    model::Provider,
    types::{DateRange, ProviderId},
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

mod anomaly;
mod claims;
mod provider;

// ── Query contract ───────────────────────────────────────────────────────────

/// Aggregate queries over claims. Implementations must be free of side
/// effects; every method is a read of the current claim snapshot.
///
/// `RiskError::DataUnavailable` (or `Database`) from any method is fatal to
/// the computation that issued it.
pub trait ClaimStore {
    fn provider(&self, provider_id: ProviderId) -> RiskResult<Option<Provider>>;

    /// All providers, ordered by id.
    fn providers(&self) -> RiskResult<Vec<Provider>>;

    /// Sum/avg/count amount, distinct beneficiaries and distinct codes,
    /// optionally filtered and grouped. Grouped rows are ordered by key.
    fn aggregate_claims(&self, query: &ClaimQuery) -> RiskResult<Vec<AggregateRow>>;

    /// Per-provider aggregates for a peer group, ordered by provider id.
    fn peer_claims(&self, query: &PeerQuery) -> RiskResult<Vec<AggregateRow>>;

    /// Unordered provider pairs (`provider_a < provider_b`) sharing at
    /// least `min_count` distinct beneficiaries.
    fn shared_beneficiaries(&self, query: &SharedBeneficiaryQuery) -> RiskResult<Vec<SharedPairRow>>;

    /// Beneficiaries billed by two or more of `provider_ids` inside the
    /// window, busiest first.
    fn top_shared_beneficiaries(
        &self,
        provider_ids: &[ProviderId],
        date_range: Option<DateRange>,
        limit: usize,
    ) -> RiskResult<Vec<SharedBeneficiaryRow>>;

    /// Provider ids by descending claim count, ties by id.
    fn top_providers_by_volume(
        &self,
        limit: usize,
        date_range: Option<DateRange>,
    ) -> RiskResult<Vec<ProviderId>>;

    /// Previously detected anomalies for a provider.
    fn anomaly_counts(
        &self,
        provider_id: ProviderId,
        date_range: Option<DateRange>,
        high_severity_z: f64,
    ) -> RiskResult<AnomalyCounts>;

    fn latest_service_date(&self) -> RiskResult<Option<NaiveDate>>;

    /// Ungrouped totals for one provider in a window.
    fn provider_totals(
        &self,
        provider_id: ProviderId,
        date_range: Option<DateRange>,
    ) -> RiskResult<AggregateRow> {
        let rows = self.aggregate_claims(&ClaimQuery {
            provider_id: Some(provider_id),
            date_range,
            group_by: GroupBy::None,
        })?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    Provider,
    /// Calendar month, keyed `YYYY-MM`.
    Month,
    ServiceDate,
    BillingCode,
    Beneficiary,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimQuery {
    pub provider_id: Option<ProviderId>,
    pub date_range:  Option<DateRange>,
    pub group_by:    GroupBy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Group key; `None` for an ungrouped query.
    pub key:                    Option<String>,
    pub claim_count:            i64,
    pub total_amount:           f64,
    pub avg_amount:             f64,
    pub distinct_beneficiaries: i64,
    pub distinct_codes:         i64,
    pub total_units:            i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerQuery {
    pub facility_type:       Option<String>,
    pub state:               Option<String>,
    pub exclude_provider_id: ProviderId,
    pub date_range:          Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedBeneficiaryQuery {
    pub min_count:           u32,
    pub min_combined_amount: f64,
    pub date_range:          Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedPairRow {
    pub provider_a:    ProviderId,
    pub provider_b:    ProviderId,
    pub shared_count:  i64,
    /// Combined amount both providers billed for the shared beneficiaries.
    pub shared_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedBeneficiaryRow {
    pub beneficiary_id: String,
    pub provider_count: i64,
    pub total_amount:   f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyCounts {
    pub total:         i64,
    pub high_severity: i64,
}

/// A bulk ingestion file: providers plus their claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub providers: Vec<Provider>,
    pub claims:    Vec<crate::model::Claim>,
}

// ── SQLite implementation ────────────────────────────────────────────────────

pub struct SqliteClaimStore {
    conn: Connection,
}

impl SqliteClaimStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_claims.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_anomalies.sql"))?;
        Ok(())
    }
}

impl ClaimStore for SqliteClaimStore {
    fn provider(&self, provider_id: ProviderId) -> RiskResult<Option<Provider>> {
        self.get_provider(provider_id)
    }

    fn providers(&self) -> RiskResult<Vec<Provider>> {
        self.all_providers()
    }

    fn aggregate_claims(&self, query: &ClaimQuery) -> RiskResult<Vec<AggregateRow>> {
        self.query_aggregates(query)
    }

    fn peer_claims(&self, query: &PeerQuery) -> RiskResult<Vec<AggregateRow>> {
        self.query_peer_aggregates(query)
    }

    fn shared_beneficiaries(&self, query: &SharedBeneficiaryQuery) -> RiskResult<Vec<SharedPairRow>> {
        self.query_shared_pairs(query)
    }

    fn top_shared_beneficiaries(
        &self,
        provider_ids: &[ProviderId],
        date_range: Option<DateRange>,
        limit: usize,
    ) -> RiskResult<Vec<SharedBeneficiaryRow>> {
        self.query_top_shared_beneficiaries(provider_ids, date_range, limit)
    }

    fn top_providers_by_volume(
        &self,
        limit: usize,
        date_range: Option<DateRange>,
    ) -> RiskResult<Vec<ProviderId>> {
        self.query_top_providers_by_volume(limit, date_range)
    }

    fn anomaly_counts(
        &self,
        provider_id: ProviderId,
        date_range: Option<DateRange>,
        high_severity_z: f64,
    ) -> RiskResult<AnomalyCounts> {
        self.count_anomalies(provider_id, date_range, high_severity_z)
    }

    fn latest_service_date(&self) -> RiskResult<Option<NaiveDate>> {
        self.query_latest_service_date()
    }
}
