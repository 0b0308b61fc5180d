//! Claim aggregates, peer-group aggregates and shared-beneficiary queries.

use super::{
    AggregateRow, ClaimQuery, GroupBy, PeerQuery, SharedBeneficiaryQuery, SharedBeneficiaryRow,
    SharedPairRow, SqliteClaimStore,
};
use crate::{
    error::{RiskError, RiskResult},
    types::{DateRange, ProviderId, DATE_FORMAT},
};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, types::Value, Row};

const AGGREGATE_COLUMNS: &str = "COUNT(*),
        COALESCE(SUM(amount), 0.0),
        COALESCE(AVG(amount), 0.0),
        COUNT(DISTINCT beneficiary_id),
        COUNT(DISTINCT billing_code),
        COALESCE(SUM(units), 0)";

fn date_bounds(range: Option<DateRange>) -> (Option<String>, Option<String>) {
    match range {
        Some(r) => (Some(r.start_str()), Some(r.end_str())),
        None => (None, None),
    }
}

fn group_key_expr(group_by: GroupBy) -> &'static str {
    match group_by {
        GroupBy::None        => "NULL",
        GroupBy::Provider    => "CAST(provider_id AS TEXT)",
        GroupBy::Month       => "substr(service_date, 1, 7)",
        GroupBy::ServiceDate => "service_date",
        GroupBy::BillingCode => "billing_code",
        GroupBy::Beneficiary => "beneficiary_id",
    }
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        key:                    row.get(0)?,
        claim_count:            row.get(1)?,
        total_amount:           row.get(2)?,
        avg_amount:             row.get(3)?,
        distinct_beneficiaries: row.get(4)?,
        distinct_codes:         row.get(5)?,
        total_units:            row.get(6)?,
    })
}

impl SqliteClaimStore {
    pub(super) fn query_aggregates(&self, query: &ClaimQuery) -> RiskResult<Vec<AggregateRow>> {
        let key = group_key_expr(query.group_by);
        let grouping = if query.group_by == GroupBy::None {
            ""
        } else {
            "GROUP BY 1 ORDER BY 1 ASC"
        };
        let sql = format!(
            "SELECT {key}, {AGGREGATE_COLUMNS}
             FROM claim
             WHERE (?1 IS NULL OR provider_id = ?1)
               AND (?2 IS NULL OR service_date >= ?2)
               AND (?3 IS NULL OR service_date <= ?3)
             {grouping}"
        );
        let (start, end) = date_bounds(query.date_range);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query.provider_id, start, end], aggregate_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub(super) fn query_peer_aggregates(&self, query: &PeerQuery) -> RiskResult<Vec<AggregateRow>> {
        let (start, end) = date_bounds(query.date_range);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT CAST(c.provider_id AS TEXT), {AGGREGATE_COLUMNS}
             FROM claim c
             JOIN provider p ON p.provider_id = c.provider_id
             WHERE c.provider_id != ?1
               AND (?2 IS NULL OR p.facility_type = ?2)
               AND (?3 IS NULL OR p.state = ?3)
               AND (?4 IS NULL OR c.service_date >= ?4)
               AND (?5 IS NULL OR c.service_date <= ?5)
             GROUP BY c.provider_id
             ORDER BY c.provider_id ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                query.exclude_provider_id,
                query.facility_type,
                query.state,
                start,
                end,
            ],
            aggregate_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Groups claims by beneficiary first, so only providers that actually
    /// share a beneficiary are ever paired.
    pub(super) fn query_shared_pairs(
        &self,
        query: &SharedBeneficiaryQuery,
    ) -> RiskResult<Vec<SharedPairRow>> {
        let (start, end) = date_bounds(query.date_range);
        let mut stmt = self.conn.prepare(
            "WITH per_beneficiary AS (
                 SELECT beneficiary_id, provider_id, SUM(amount) AS billed
                 FROM claim
                 WHERE (?1 IS NULL OR service_date >= ?1)
                   AND (?2 IS NULL OR service_date <= ?2)
                 GROUP BY beneficiary_id, provider_id
             )
             SELECT a.provider_id, b.provider_id, COUNT(*), COALESCE(SUM(a.billed + b.billed), 0.0)
             FROM per_beneficiary a
             JOIN per_beneficiary b
               ON a.beneficiary_id = b.beneficiary_id
              AND a.provider_id < b.provider_id
             WHERE a.billed + b.billed >= ?3
             GROUP BY a.provider_id, b.provider_id
             HAVING COUNT(*) >= ?4
             ORDER BY a.provider_id ASC, b.provider_id ASC",
        )?;
        let rows = stmt.query_map(
            params![start, end, query.min_combined_amount, i64::from(query.min_count)],
            |row| {
                Ok(SharedPairRow {
                    provider_a:    row.get(0)?,
                    provider_b:    row.get(1)?,
                    shared_count:  row.get(2)?,
                    shared_weight: row.get(3)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub(super) fn query_top_shared_beneficiaries(
        &self,
        provider_ids: &[ProviderId],
        date_range: Option<DateRange>,
        limit: usize,
    ) -> RiskResult<Vec<SharedBeneficiaryRow>> {
        if provider_ids.len() < 2 || limit == 0 {
            return Ok(Vec::new());
        }
        // ?1 and ?2 are the date bounds; provider ids follow from ?3.
        let placeholders = (0..provider_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT beneficiary_id, COUNT(DISTINCT provider_id) AS providers, SUM(amount) AS billed
             FROM claim
             WHERE provider_id IN ({placeholders})
               AND (?1 IS NULL OR service_date >= ?1)
               AND (?2 IS NULL OR service_date <= ?2)
             GROUP BY beneficiary_id
             HAVING COUNT(DISTINCT provider_id) >= 2
             ORDER BY providers DESC, billed DESC, beneficiary_id ASC
             LIMIT {limit}"
        );
        let (start, end) = date_bounds(date_range);
        let values: Vec<Value> = [Value::from(start), Value::from(end)]
            .into_iter()
            .chain(provider_ids.iter().map(|&id| Value::Integer(id)))
            .collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(SharedBeneficiaryRow {
                beneficiary_id: row.get(0)?,
                provider_count: row.get(1)?,
                total_amount:   row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub(super) fn query_top_providers_by_volume(
        &self,
        limit: usize,
        date_range: Option<DateRange>,
    ) -> RiskResult<Vec<ProviderId>> {
        let (start, end) = date_bounds(date_range);
        let mut stmt = self.conn.prepare(
            "SELECT provider_id
             FROM claim
             WHERE (?1 IS NULL OR service_date >= ?1)
               AND (?2 IS NULL OR service_date <= ?2)
             GROUP BY provider_id
             ORDER BY COUNT(*) DESC, provider_id ASC
             LIMIT ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![start, end, limit], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub(super) fn query_latest_service_date(&self) -> RiskResult<Option<NaiveDate>> {
        let latest: Option<String> = self
            .conn
            .query_row("SELECT MAX(service_date) FROM claim", [], |row| row.get(0))?;
        latest
            .map(|s| {
                NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                    RiskError::unavailable(format!("malformed service_date '{s}': {e}"))
                })
            })
            .transpose()
    }
}
