//! Vendor position persistence: one last-write-wins current row per vendor
//! plus an append-only history stream for journey tracking.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use relay_core::{LocationReport, VendorId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentLocationRow {
    pub vendor_id: VendorId,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationHistoryRow {
    pub id: i64,
    pub vendor_id: VendorId,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: String,
}

#[derive(Clone)]
pub struct LocationRepo {
    db: Database,
}

impl LocationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Last writer wins; exactly one row per vendor.
    pub fn upsert_current(
        &self,
        report: &LocationReport,
        recorded_at: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vendor_current_location
                     (vendor_id, latitude, longitude, accuracy, speed, heading, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(vendor_id) DO UPDATE SET
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     accuracy = excluded.accuracy,
                     speed = excluded.speed,
                     heading = excluded.heading,
                     recorded_at = excluded.recorded_at",
                rusqlite::params![
                    report.vendor_id.as_str(),
                    report.latitude,
                    report.longitude,
                    report.accuracy,
                    report.speed,
                    report.heading,
                    recorded_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn current_for(
        &self,
        vendor_id: &VendorId,
    ) -> Result<Option<CurrentLocationRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT vendor_id, latitude, longitude, accuracy, speed, heading, recorded_at
                 FROM vendor_current_location WHERE vendor_id = ?1",
            )?;
            let mut rows = stmt.query(rusqlite::params![vendor_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(CurrentLocationRow {
                    vendor_id: VendorId::from_raw(row_helpers::get::<String>(
                        row,
                        0,
                        "vendor_current_location",
                        "vendor_id",
                    )?),
                    latitude: row_helpers::get(row, 1, "vendor_current_location", "latitude")?,
                    longitude: row_helpers::get(row, 2, "vendor_current_location", "longitude")?,
                    accuracy: row_helpers::get_opt(row, 3, "vendor_current_location", "accuracy")?,
                    speed: row_helpers::get_opt(row, 4, "vendor_current_location", "speed")?,
                    heading: row_helpers::get_opt(row, 5, "vendor_current_location", "heading")?,
                    recorded_at: row_helpers::get(
                        row,
                        6,
                        "vendor_current_location",
                        "recorded_at",
                    )?,
                })),
                None => Ok(None),
            }
        })
    }

    pub fn append_history(
        &self,
        report: &LocationReport,
        recorded_at: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vendor_location_history
                     (vendor_id, latitude, longitude, accuracy, speed, heading, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    report.vendor_id.as_str(),
                    report.latitude,
                    report.longitude,
                    report.accuracy,
                    report.speed,
                    report.heading,
                    recorded_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn history_for(
        &self,
        vendor_id: &VendorId,
    ) -> Result<Vec<LocationHistoryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, vendor_id, latitude, longitude, accuracy, speed, heading, recorded_at
                 FROM vendor_location_history WHERE vendor_id = ?1 ORDER BY id",
            )?;
            let mut rows = stmt.query(rusqlite::params![vendor_id.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(LocationHistoryRow {
                    id: row_helpers::get(row, 0, "vendor_location_history", "id")?,
                    vendor_id: VendorId::from_raw(row_helpers::get::<String>(
                        row,
                        1,
                        "vendor_location_history",
                        "vendor_id",
                    )?),
                    latitude: row_helpers::get(row, 2, "vendor_location_history", "latitude")?,
                    longitude: row_helpers::get(row, 3, "vendor_location_history", "longitude")?,
                    accuracy: row_helpers::get_opt(row, 4, "vendor_location_history", "accuracy")?,
                    speed: row_helpers::get_opt(row, 5, "vendor_location_history", "speed")?,
                    heading: row_helpers::get_opt(row, 6, "vendor_location_history", "heading")?,
                    recorded_at: row_helpers::get(
                        row,
                        7,
                        "vendor_location_history",
                        "recorded_at",
                    )?,
                });
            }
            Ok(out)
        })
    }

    /// Store-side arm of the retention sweep.
    #[instrument(skip(self))]
    pub fn prune_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = cutoff.to_rfc3339();
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM vendor_location_history WHERE recorded_at < ?1",
                rusqlite::params![cutoff],
            )?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::JobId;

    fn setup() -> LocationRepo {
        LocationRepo::new(Database::in_memory().unwrap())
    }

    fn report(vendor: &str, lat: f64, lon: f64) -> LocationReport {
        LocationReport {
            vendor_id: VendorId::from_raw(vendor),
            latitude: lat,
            longitude: lon,
            accuracy: Some(5.0),
            speed: None,
            heading: None,
            job_id: Some(JobId::from_raw("job_1")),
        }
    }

    #[test]
    fn upsert_then_read_back() {
        let repo = setup();
        let now = Utc::now().to_rfc3339();
        repo.upsert_current(&report("ven_1", 12.97, 77.59), &now)
            .unwrap();

        let row = repo
            .current_for(&VendorId::from_raw("ven_1"))
            .unwrap()
            .unwrap();
        assert_eq!(row.latitude, 12.97);
        assert_eq!(row.accuracy, Some(5.0));
        assert_eq!(row.speed, None);
        assert_eq!(row.recorded_at, now);
    }

    #[test]
    fn second_upsert_overwrites_first() {
        let repo = setup();
        let vendor = VendorId::from_raw("ven_1");
        repo.upsert_current(&report("ven_1", 12.97, 77.59), "2026-08-21T10:00:00+00:00")
            .unwrap();
        repo.upsert_current(&report("ven_1", 13.01, 77.61), "2026-08-21T10:00:05+00:00")
            .unwrap();

        let row = repo.current_for(&vendor).unwrap().unwrap();
        assert_eq!(row.latitude, 13.01);
        assert_eq!(row.recorded_at, "2026-08-21T10:00:05+00:00");

        let count: i64 = repo
            .db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM vendor_current_location WHERE vendor_id = ?1",
                    rusqlite::params![vendor.as_str()],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn current_for_missing_vendor_is_none() {
        let repo = setup();
        assert!(repo
            .current_for(&VendorId::from_raw("ven_ghost"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn history_appends_in_order() {
        let repo = setup();
        let vendor = VendorId::from_raw("ven_1");
        repo.append_history(&report("ven_1", 12.97, 77.59), "2026-08-21T10:00:00+00:00")
            .unwrap();
        repo.append_history(&report("ven_1", 13.01, 77.61), "2026-08-21T10:00:05+00:00")
            .unwrap();

        let rows = repo.history_for(&vendor).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].latitude, 12.97);
        assert_eq!(rows[1].latitude, 13.01);
    }

    #[test]
    fn prune_removes_only_older_rows() {
        let repo = setup();
        let vendor = VendorId::from_raw("ven_1");
        let old = (Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        let fresh = Utc::now().to_rfc3339();
        repo.append_history(&report("ven_1", 1.0, 1.0), &old).unwrap();
        repo.append_history(&report("ven_1", 2.0, 2.0), &fresh)
            .unwrap();

        let removed = repo
            .prune_history_before(Utc::now() - chrono::Duration::days(7))
            .unwrap();
        assert_eq!(removed, 1);

        let rows = repo.history_for(&vendor).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].latitude, 2.0);
    }
}
