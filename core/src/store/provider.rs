//! Provider reads plus the ingestion-side writes (providers, claims, datasets).

use super::{Dataset, SqliteClaimStore};
use crate::{
    error::RiskResult,
    model::{Claim, Provider},
    types::{ProviderId, DATE_FORMAT},
};
use rusqlite::{params, OptionalExtension, Row};

const PROVIDER_COLUMNS: &str =
    "provider_id, name, npi, state, region, city, address, facility_type, licensed_capacity";

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        provider_id:       row.get(0)?,
        name:              row.get(1)?,
        npi:               row.get(2)?,
        state:             row.get(3)?,
        region:            row.get(4)?,
        city:              row.get(5)?,
        address:           row.get(6)?,
        facility_type:     row.get(7)?,
        licensed_capacity: row.get(8)?,
    })
}

impl SqliteClaimStore {
    // ── Provider ──────────────────────────────────────────────────

    pub fn insert_provider(&self, p: &Provider) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO provider (
                provider_id, name, npi, state, region, city, address,
                facility_type, licensed_capacity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                p.provider_id,
                &p.name,
                &p.npi,
                &p.state,
                &p.region,
                &p.city,
                &p.address,
                &p.facility_type,
                p.licensed_capacity,
            ],
        )?;
        Ok(())
    }

    pub(super) fn get_provider(&self, provider_id: ProviderId) -> RiskResult<Option<Provider>> {
        let sql = format!("SELECT {PROVIDER_COLUMNS} FROM provider WHERE provider_id = ?1");
        let provider = self
            .conn
            .query_row(&sql, params![provider_id], provider_from_row)
            .optional()?;
        Ok(provider)
    }

    pub(super) fn all_providers(&self) -> RiskResult<Vec<Provider>> {
        let sql = format!("SELECT {PROVIDER_COLUMNS} FROM provider ORDER BY provider_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], provider_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Claim ─────────────────────────────────────────────────────

    pub fn insert_claim(&self, c: &Claim) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO claim (
                provider_id, beneficiary_id, billing_code, amount, service_date, units
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                c.provider_id,
                &c.beneficiary_id,
                &c.billing_code,
                c.amount,
                c.service_date.format(DATE_FORMAT).to_string(),
                c.units,
            ],
        )?;
        Ok(())
    }

    /// Insert a whole dataset in one transaction. Returns (providers, claims).
    pub fn load_dataset(&self, dataset: &Dataset) -> RiskResult<(usize, usize)> {
        let tx = self.conn.unchecked_transaction()?;
        for p in &dataset.providers {
            self.insert_provider(p)?;
        }
        for c in &dataset.claims {
            self.insert_claim(c)?;
        }
        tx.commit()?;
        log::info!(
            "Loaded {} providers and {} claims",
            dataset.providers.len(),
            dataset.claims.len()
        );
        Ok((dataset.providers.len(), dataset.claims.len()))
    }
}
