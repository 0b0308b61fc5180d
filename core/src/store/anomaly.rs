//! Anomaly persistence: written by the batch scan, read by the network-risk signal.

use super::{AnomalyCounts, SqliteClaimStore};
use crate::{
    anomaly::Anomaly,
    error::RiskResult,
    types::{DateRange, ProviderId, DATE_FORMAT},
};
use rusqlite::params;

impl SqliteClaimStore {
    pub fn insert_anomaly(&self, a: &Anomaly) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO anomaly
             (provider_id, anomaly_type, z_score, severity, detected_on, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                a.provider_id,
                a.anomaly_type.as_str(),
                a.z_score,
                a.severity.as_str(),
                a.detected_on.format(DATE_FORMAT).to_string(),
                &a.description,
            ],
        )?;
        Ok(())
    }

    pub fn insert_anomalies(&self, anomalies: &[Anomaly]) -> RiskResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for a in anomalies {
            self.insert_anomaly(a)?;
        }
        tx.commit()?;
        Ok(anomalies.len())
    }

    pub fn anomaly_count_total(&self) -> RiskResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM anomaly", [], |row| row.get(0))?;
        Ok(count)
    }

    pub(super) fn count_anomalies(
        &self,
        provider_id: ProviderId,
        date_range: Option<DateRange>,
        high_severity_z: f64,
    ) -> RiskResult<AnomalyCounts> {
        let (start, end) = match date_range {
            Some(r) => (Some(r.start_str()), Some(r.end_str())),
            None => (None, None),
        };
        let counts = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN ABS(z_score) >= ?4 THEN 1 ELSE 0 END), 0)
             FROM anomaly
             WHERE provider_id = ?1
               AND (?2 IS NULL OR detected_on >= ?2)
               AND (?3 IS NULL OR detected_on <= ?3)",
            params![provider_id, start, end, high_severity_z],
            |row| {
                Ok(AnomalyCounts {
                    total:         row.get(0)?,
                    high_severity: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }
}
