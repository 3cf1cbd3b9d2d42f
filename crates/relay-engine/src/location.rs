//! Live location ingest: broadcast immediately, persist in the background.
//!
//! The broadcast happens inline so watchers see positions at wire speed.
//! Persistence goes through a bounded queue drained by a single writer
//! task, which keeps samples in arrival order without ever blocking the
//! ingest path. Storage failures degrade history, never the live stream.

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use relay_core::{vendor_room, LocationReport, Outbound, ServerEvent};
use relay_store::locations::LocationRepo;

const PERSIST_QUEUE_DEPTH: usize = 1024;

pub struct LocationPipeline {
    events: broadcast::Sender<Outbound>,
    persist_tx: mpsc::Sender<(LocationReport, String)>,
}

impl LocationPipeline {
    /// Spawns the writer task; requires a running tokio runtime.
    pub fn new(locations: LocationRepo, events: broadcast::Sender<Outbound>) -> Self {
        let (persist_tx, persist_rx) = mpsc::channel(PERSIST_QUEUE_DEPTH);
        tokio::spawn(run_writer(locations, persist_rx));
        Self { events, persist_tx }
    }

    /// Stamp a validated report with the server-side receive time, fan it
    /// out to the vendor's room, and queue it for persistence. Returns
    /// without waiting on storage.
    pub fn ingest(&self, report: LocationReport) {
        let recorded_at = Utc::now().to_rfc3339();

        let _ = self.events.send(Outbound::room(
            vendor_room(&report.vendor_id),
            ServerEvent::live_location(&report, &recorded_at),
        ));

        match self.persist_tx.try_send((report, recorded_at)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("location persistence queue full, sample dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("location writer gone, sample dropped");
            }
        }
    }
}

/// Drains the persistence queue in arrival order. Upserts the current
/// position for every sample; appends history only while a job is attached.
async fn run_writer(locations: LocationRepo, mut rx: mpsc::Receiver<(LocationReport, String)>) {
    while let Some((report, recorded_at)) = rx.recv().await {
        if let Err(e) = locations.upsert_current(&report, &recorded_at) {
            warn!(vendor_id = %report.vendor_id, error = %e, "current location upsert failed");
        }
        if report.job_id.is_some() {
            if let Err(e) = locations.append_history(&report, &recorded_at) {
                warn!(vendor_id = %report.vendor_id, error = %e, "location history append failed");
            }
        }
    }
}
