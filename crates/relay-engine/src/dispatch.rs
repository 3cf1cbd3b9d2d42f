//! The offer/accept/reject protocol.

use tokio::sync::broadcast;
use tracing::{debug, instrument};

use relay_core::{zone_room, ConnectionId, JobId, JobStatus, Outbound, ServerEvent, VendorId};
use relay_store::jobs::{AssignOutcome, JobRepo, JobRow};
use relay_store::rejections::RejectionRepo;

use crate::error::EngineError;

/// How an acceptance attempt resolved, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// The caller won; the rest of the zone has been told the offer is
    /// withdrawn.
    Accepted { job: JobRow },
    /// Someone else won first. Expected under contention, not an error.
    AlreadyTaken,
    /// The job does not exist or is no longer offerable.
    NotFound,
}

pub struct DispatchEngine {
    jobs: JobRepo,
    rejections: RejectionRepo,
    events: broadcast::Sender<Outbound>,
}

impl DispatchEngine {
    pub fn new(
        jobs: JobRepo,
        rejections: RejectionRepo,
        events: broadcast::Sender<Outbound>,
    ) -> Self {
        Self {
            jobs,
            rejections,
            events,
        }
    }

    /// Announce a job to its destination zone. Never mutates the job, so a
    /// repeated call is just a re-announcement. Returns whether an offer
    /// actually went out.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn offer(&self, job_id: &JobId) -> Result<bool, EngineError> {
        let Some(job) = self.jobs.get(job_id)? else {
            debug!("offer for unknown job ignored");
            return Ok(false);
        };
        if job.status != JobStatus::Waiting {
            debug!(status = %job.status, "job no longer offerable");
            return Ok(false);
        }
        let _ = self.events.send(Outbound::room(
            zone_room(&job.destination_postal_code),
            ServerEvent::JobOffer {
                job_id: job.id.clone(),
                destination_postal_code: job.destination_postal_code.clone(),
                created_at: job.created_at.clone(),
            },
        ));
        Ok(true)
    }

    /// Try to claim a job for a vendor. On a win the withdrawal goes out to
    /// the rest of the zone; acking the caller itself is the frame
    /// handler's job.
    #[instrument(skip(self), fields(job_id = %job_id, vendor_id = %vendor_id))]
    pub fn accept(
        &self,
        caller: &ConnectionId,
        vendor_id: &VendorId,
        job_id: &JobId,
    ) -> Result<AcceptOutcome, EngineError> {
        match self.jobs.try_assign(job_id, vendor_id)? {
            AssignOutcome::Assigned(job) => {
                let _ = self.events.send(Outbound::room_except(
                    zone_room(&job.destination_postal_code),
                    caller,
                    ServerEvent::OfferWithdrawn {
                        job_id: job.id.clone(),
                    },
                ));
                Ok(AcceptOutcome::Accepted { job })
            }
            AssignOutcome::AlreadyAssigned { vendor_id: winner } => {
                debug!(winner = %winner, "acceptance lost the race");
                Ok(AcceptOutcome::AlreadyTaken)
            }
            AssignOutcome::Terminal { status } => {
                debug!(status = %status, "acceptance for terminal job");
                Ok(AcceptOutcome::NotFound)
            }
            AssignOutcome::NotFound => Ok(AcceptOutcome::NotFound),
        }
    }

    /// Record a vendor declining a job. The job row is untouched; everyone
    /// else keeps racing for it.
    #[instrument(skip(self), fields(job_id = %job_id, vendor_id = %vendor_id))]
    pub fn reject(
        &self,
        vendor_id: &VendorId,
        job_id: &JobId,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.rejections.record(vendor_id, job_id, reason)?;
        Ok(())
    }
}
