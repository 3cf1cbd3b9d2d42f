//! Append-only ledger of vendors declining jobs.
//!
//! Recording a rejection never reads or writes the job row; a rejected job
//! stays offerable to everyone else.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use relay_core::{JobId, VendorId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionRow {
    pub id: i64,
    pub vendor_id: VendorId,
    pub job_id: JobId,
    pub reason: String,
    pub rejected_at: String,
}

pub struct RejectionRepo {
    db: Database,
}

impl RejectionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(vendor_id = %vendor_id, job_id = %job_id))]
    pub fn record(
        &self,
        vendor_id: &VendorId,
        job_id: &JobId,
        reason: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vendor_job_rejections (vendor_id, job_id, reason, rejected_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![vendor_id.as_str(), job_id.as_str(), reason, now],
            )?;
            Ok(())
        })
    }

    /// Diagnostics and test support; dispatch never reads the ledger back.
    pub fn for_job(&self, job_id: &JobId) -> Result<Vec<RejectionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, vendor_id, job_id, reason, rejected_at
                 FROM vendor_job_rejections WHERE job_id = ?1 ORDER BY id",
            )?;
            let mut rows = stmt.query(rusqlite::params![job_id.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(RejectionRow {
                    id: row_helpers::get(row, 0, "vendor_job_rejections", "id")?,
                    vendor_id: VendorId::from_raw(row_helpers::get::<String>(
                        row,
                        1,
                        "vendor_job_rejections",
                        "vendor_id",
                    )?),
                    job_id: JobId::from_raw(row_helpers::get::<String>(
                        row,
                        2,
                        "vendor_job_rejections",
                        "job_id",
                    )?),
                    reason: row_helpers::get(row, 3, "vendor_job_rejections", "reason")?,
                    rejected_at: row_helpers::get(row, 4, "vendor_job_rejections", "rejected_at")?,
                });
            }
            Ok(out)
        })
    }
}
