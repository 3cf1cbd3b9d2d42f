//! Job rows and the conditional vendor assignment.
//!
//! Jobs are created by the surrounding order flow; `create` exists for
//! seeding and tests. Assignment is a single conditional UPDATE so that
//! concurrent accepts are decided by SQLite, not by a read-then-write
//! sequence in this process.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::instrument;

use relay_core::{JobId, JobStatus, VendorId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub id: JobId,
    pub status: JobStatus,
    pub assigned_vendor_id: Option<VendorId>,
    pub destination_postal_code: String,
    pub created_at: String,
    pub accepted_at: Option<String>,
    pub updated_at: String,
}

/// What a conditional assignment attempt observed.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    /// The caller's UPDATE took effect; the job is theirs.
    Assigned(JobRow),
    /// Someone else holds the job. The winner never changes afterwards.
    AlreadyAssigned { vendor_id: VendorId },
    /// The job is terminal without ever being assigned (e.g. expired).
    Terminal { status: JobStatus },
    NotFound,
}

pub struct JobRepo {
    db: Database,
}

impl JobRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub fn create(&self, destination_postal_code: &str) -> Result<JobRow, StoreError> {
        let id = JobId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, status, destination_postal_code, created_at, updated_at)
                 VALUES (?1, 'waiting', ?2, ?3, ?3)",
                rusqlite::params![id.as_str(), destination_postal_code, now],
            )?;
            Ok(JobRow {
                id: id.clone(),
                status: JobStatus::Waiting,
                assigned_vendor_id: None,
                destination_postal_code: destination_postal_code.to_string(),
                created_at: now.clone(),
                accepted_at: None,
                updated_at: now.clone(),
            })
        })
    }

    pub fn get(&self, id: &JobId) -> Result<Option<JobRow>, StoreError> {
        self.db.with_conn(|conn| get_job(conn, id))
    }

    /// Atomically claim a job for a vendor.
    ///
    /// The WHERE clause is the whole race: only a waiting, unassigned row
    /// can be updated, so exactly one concurrent caller sees `Assigned`.
    /// Losers get a classification of what they lost to.
    #[instrument(skip(self), fields(job_id = %job_id, vendor_id = %vendor_id))]
    pub fn try_assign(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
    ) -> Result<AssignOutcome, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE jobs
                 SET assigned_vendor_id = ?1, status = 'accepted', accepted_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status = 'waiting' AND assigned_vendor_id IS NULL",
                rusqlite::params![vendor_id.as_str(), now, job_id.as_str()],
            )?;

            let row = get_job(conn, job_id)?;
            if changed == 1 {
                let job = row.ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;
                return Ok(AssignOutcome::Assigned(job));
            }

            match row {
                None => Ok(AssignOutcome::NotFound),
                Some(job) => match &job.assigned_vendor_id {
                    Some(winner) => Ok(AssignOutcome::AlreadyAssigned {
                        vendor_id: winner.clone(),
                    }),
                    None => Ok(AssignOutcome::Terminal { status: job.status }),
                },
            }
        })
    }

    /// Store-side arm of the order expiry sweep: waiting, unassigned jobs
    /// created before the cutoff become expired.
    #[instrument(skip(self))]
    pub fn expire_overdue(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = cutoff.to_rfc3339();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET status = 'expired', updated_at = ?1
                 WHERE status = 'waiting' AND assigned_vendor_id IS NULL AND created_at < ?2",
                rusqlite::params![now, cutoff],
            )?;
            Ok(changed)
        })
    }
}

fn get_job(conn: &Connection, id: &JobId) -> Result<Option<JobRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, status, assigned_vendor_id, destination_postal_code,
                created_at, accepted_at, updated_at
         FROM jobs WHERE id = ?1",
    )?;
    let mut rows = stmt.query(rusqlite::params![id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_job(row)?)),
        None => Ok(None),
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRow, StoreError> {
    let status: String = row_helpers::get(row, 1, "jobs", "status")?;
    Ok(JobRow {
        id: JobId::from_raw(row_helpers::get::<String>(row, 0, "jobs", "id")?),
        status: row_helpers::parse_enum(&status, "jobs", "status")?,
        assigned_vendor_id: row_helpers::get_opt::<String>(row, 2, "jobs", "assigned_vendor_id")?
            .map(VendorId::from_raw),
        destination_postal_code: row_helpers::get(row, 3, "jobs", "destination_postal_code")?,
        created_at: row_helpers::get(row, 4, "jobs", "created_at")?,
        accepted_at: row_helpers::get_opt(row, 5, "jobs", "accepted_at")?,
        updated_at: row_helpers::get(row, 6, "jobs", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    fn setup() -> JobRepo {
        JobRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_job_starts_waiting() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        assert!(job.id.as_str().starts_with("job_"));
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.assigned_vendor_id, None);
        assert_eq!(job.accepted_at, None);
    }

    #[test]
    fn get_missing_job_is_none() {
        let repo = setup();
        assert!(repo.get(&JobId::new()).unwrap().is_none());
    }

    #[test]
    fn first_assign_wins() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        let vendor = VendorId::new();

        let outcome = repo.try_assign(&job.id, &vendor).unwrap();
        let won = match outcome {
            AssignOutcome::Assigned(row) => row,
            other => panic!("expected Assigned, got {other:?}"),
        };
        assert_eq!(won.status, JobStatus::Accepted);
        assert_eq!(won.assigned_vendor_id, Some(vendor));
        assert!(won.accepted_at.is_some());
    }

    #[test]
    fn second_assign_reports_winner() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        let first = VendorId::new();
        let second = VendorId::new();

        repo.try_assign(&job.id, &first).unwrap();
        let outcome = repo.try_assign(&job.id, &second).unwrap();
        assert_eq!(
            outcome,
            AssignOutcome::AlreadyAssigned {
                vendor_id: first.clone()
            }
        );

        // The original assignment is untouched.
        let row = repo.get(&job.id).unwrap().unwrap();
        assert_eq!(row.assigned_vendor_id, Some(first));
    }

    #[test]
    fn assign_missing_job_is_not_found() {
        let repo = setup();
        let outcome = repo.try_assign(&JobId::new(), &VendorId::new()).unwrap();
        assert_eq!(outcome, AssignOutcome::NotFound);
    }

    #[test]
    fn assign_expired_job_is_terminal() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        let expired = repo
            .expire_overdue(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(expired, 1);

        let outcome = repo.try_assign(&job.id, &VendorId::new()).unwrap();
        assert_eq!(
            outcome,
            AssignOutcome::Terminal {
                status: JobStatus::Expired
            }
        );
    }

    #[test]
    fn expire_overdue_skips_assigned_jobs() {
        let repo = setup();
        let taken = repo.create("560001").unwrap();
        let waiting = repo.create("560001").unwrap();
        repo.try_assign(&taken.id, &VendorId::new()).unwrap();

        let expired = repo
            .expire_overdue(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            repo.get(&taken.id).unwrap().unwrap().status,
            JobStatus::Accepted
        );
        assert_eq!(
            repo.get(&waiting.id).unwrap().unwrap().status,
            JobStatus::Expired
        );
    }

    #[test]
    fn expire_overdue_honors_cutoff() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        let expired = repo
            .expire_overdue(Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(expired, 0);
        assert_eq!(
            repo.get(&job.id).unwrap().unwrap().status,
            JobStatus::Waiting
        );
    }

    #[test]
    fn corrupt_status_row_is_reported() {
        let repo = setup();
        let job = repo.create("560001").unwrap();
        repo.db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE jobs SET status = 'banana' WHERE id = ?1",
                    rusqlite::params![job.id.as_str()],
                )?;
                Ok(())
            })
            .unwrap();

        let result = repo.get(&job.id);
        assert!(matches!(result, Err(StoreError::CorruptRow { .. })));
    }

    #[test]
    fn concurrent_assigns_have_single_winner() {
        let db = Database::in_memory().unwrap();
        let job = JobRepo::new(db.clone()).create("560001").unwrap();

        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let mut handles = Vec::new();
        for i in 0..contenders {
            let db = db.clone();
            let job_id = job.id.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                let repo = JobRepo::new(db);
                let vendor = VendorId::from_raw(format!("ven_{i}"));
                barrier.wait();
                repo.try_assign(&job_id, &vendor).unwrap()
            }));
        }

        let outcomes: Vec<AssignOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<&JobRow> = outcomes
            .iter()
            .filter_map(|o| match o {
                AssignOutcome::Assigned(row) => Some(row),
                _ => None,
            })
            .collect();
        assert_eq!(winners.len(), 1);

        let winning_vendor = winners[0].assigned_vendor_id.clone().unwrap();
        for outcome in &outcomes {
            if let AssignOutcome::AlreadyAssigned { vendor_id } = outcome {
                assert_eq!(vendor_id, &winning_vendor);
            }
        }

        let row = JobRepo::new(db).get(&job.id).unwrap().unwrap();
        assert_eq!(row.assigned_vendor_id, Some(winning_vendor));
    }
}
