//! Durable vendor registry access.
//!
//! The vendors table is owned by the surrounding platform; at runtime this
//! subsystem only reads it to derive zone membership. The write methods
//! exist for seeding and tests.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use relay_core::VendorId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorRow {
    pub id: VendorId,
    pub postal_code: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct VendorRepo {
    db: Database,
}

impl VendorRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(vendor_id = %id))]
    pub fn create(&self, id: &VendorId, postal_code: &str) -> Result<VendorRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vendors (id, postal_code, active, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?3)",
                rusqlite::params![id.as_str(), postal_code, now],
            )?;
            Ok(VendorRow {
                id: id.clone(),
                postal_code: postal_code.to_string(),
                active: true,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
    }

    pub fn get(&self, id: &VendorId) -> Result<Option<VendorRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, postal_code, active, created_at, updated_at
                 FROM vendors WHERE id = ?1",
            )?;
            let mut rows = stmt.query(rusqlite::params![id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_vendor(row)?)),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self), fields(vendor_id = %id))]
    pub fn set_postal_code(&self, id: &VendorId, postal_code: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE vendors SET postal_code = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![postal_code, now, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("vendor {id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(vendor_id = %id))]
    pub fn set_active(&self, id: &VendorId, active: bool) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE vendors SET active = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![active as i64, now, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("vendor {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_vendor(row: &rusqlite::Row<'_>) -> Result<VendorRow, StoreError> {
    Ok(VendorRow {
        id: VendorId::from_raw(row_helpers::get::<String>(row, 0, "vendors", "id")?),
        postal_code: row_helpers::get(row, 1, "vendors", "postal_code")?,
        active: row_helpers::get::<i64>(row, 2, "vendors", "active")? != 0,
        created_at: row_helpers::get(row, 3, "vendors", "created_at")?,
        updated_at: row_helpers::get(row, 4, "vendors", "updated_at")?,
    })
}
