//! Inbound frame routing.
//!
//! Parses the wire envelope, enforces the identity rules, and hands work to
//! the dispatch engine and location pipeline. Nothing a client sends can
//! terminate its connection: malformed frames, unknown events, and
//! unauthorized mutations are all dropped without a reply.

use std::sync::Arc;

use chrono::Utc;
use relay_core::{
    vendor_room, AcceptJob, ConnectionId, DispatchFailure, InboundFrame, LocationReport, Outbound,
    RegisterVendor, RejectJob, ServerEvent, VendorId, WatchVendor,
};
use relay_engine::{AcceptOutcome, DispatchEngine, LocationPipeline, ZoneRegistrar};
use relay_store::jobs::JobRepo;
use relay_store::locations::LocationRepo;
use relay_store::rejections::RejectionRepo;
use relay_store::vendors::VendorRepo;
use relay_store::Database;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::client::ConnectionRegistry;

/// Shared state available to the frame router.
pub struct HandlerState {
    pub db: Database,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: DispatchEngine,
    pub pipeline: LocationPipeline,
    pub registrar: ZoneRegistrar,
}

impl HandlerState {
    /// Wire the engine, pipeline, and registrar onto one database. Spawns
    /// the pipeline's writer task, so this needs a running runtime.
    pub fn new(
        db: Database,
        registry: Arc<ConnectionRegistry>,
        events: broadcast::Sender<Outbound>,
    ) -> Self {
        let engine = DispatchEngine::new(
            JobRepo::new(db.clone()),
            RejectionRepo::new(db.clone()),
            events.clone(),
        );
        let pipeline = LocationPipeline::new(LocationRepo::new(db.clone()), events);
        let registrar = ZoneRegistrar::new(VendorRepo::new(db.clone()));
        Self {
            db,
            registry,
            engine,
            pipeline,
            registrar,
        }
    }
}

/// Route one raw frame from a connection.
pub fn handle_frame(state: &HandlerState, connection_id: &ConnectionId, raw: &str) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(connection_id = %connection_id, %error, "unparseable frame dropped");
            return;
        }
    };

    match frame.event.as_str() {
        "vendor:register" => vendor_register(state, connection_id, &frame.data),
        "vendor:location:update" => vendor_location_update(state, connection_id, &frame.data),
        "job:accept" => job_accept(state, connection_id, &frame.data),
        "job:reject" => job_reject(state, connection_id, &frame.data),
        "watch:vendor" => watch_vendor(state, connection_id, &frame.data),
        other => {
            debug!(connection_id = %connection_id, event = other, "unknown event ignored");
        }
    }
}

/// A mutation is honored only when the connection verified as the vendor it
/// claims to act for. Everything else is refused without a reply.
fn authorized_vendor(
    state: &HandlerState,
    connection_id: &ConnectionId,
    claimed: &VendorId,
) -> bool {
    match state.registry.identity_of(connection_id) {
        Some(identity) if identity.vendor_id().as_ref() == Some(claimed) => true,
        Some(identity) => {
            debug!(
                connection_id = %connection_id,
                subject = %identity.subject,
                claimed = %claimed,
                "identity mismatch, frame dropped"
            );
            false
        }
        None => {
            debug!(connection_id = %connection_id, "unauthenticated mutation dropped");
            false
        }
    }
}

/// `vendor:register`: place the connection in its delivery zone room.
///
/// The zone comes from the vendor record, never from the frame. An unknown
/// or deactivated vendor registers nothing and hears nothing.
fn vendor_register(state: &HandlerState, connection_id: &ConnectionId, data: &Value) {
    let Ok(payload) = serde_json::from_value::<RegisterVendor>(data.clone()) else {
        debug!(connection_id = %connection_id, "malformed vendor:register dropped");
        return;
    };
    if !authorized_vendor(state, connection_id, &payload.vendor_id) {
        return;
    }
    match state.registrar.zone_for(&payload.vendor_id) {
        Ok(Some(zone)) => {
            // At most one zone room per connection
            state.registry.leave_zone_rooms(connection_id);
            state.registry.join_room(connection_id, &zone);
            debug!(connection_id = %connection_id, zone = %zone, "vendor registered for zone");
        }
        Ok(None) => {
            debug!(vendor_id = %payload.vendor_id, "register for unknown vendor ignored");
        }
        Err(error) => {
            warn!(vendor_id = %payload.vendor_id, %error, "vendor lookup failed during register");
        }
    }
}

/// `vendor:location:update`: broadcast and persist a position sample.
fn vendor_location_update(state: &HandlerState, connection_id: &ConnectionId, data: &Value) {
    let Some(report) = LocationReport::parse(data) else {
        trace!(connection_id = %connection_id, "malformed location report dropped");
        return;
    };
    if !authorized_vendor(state, connection_id, &report.vendor_id) {
        return;
    }
    state.pipeline.ingest(report);
}

/// `job:accept`: race for the job; the caller always gets an ack either way.
fn job_accept(state: &HandlerState, connection_id: &ConnectionId, data: &Value) {
    let Ok(payload) = serde_json::from_value::<AcceptJob>(data.clone()) else {
        debug!(connection_id = %connection_id, "malformed job:accept dropped");
        return;
    };
    if !authorized_vendor(state, connection_id, &payload.vendor_id) {
        return;
    }
    let event = match state
        .engine
        .accept(connection_id, &payload.vendor_id, &payload.job_id)
    {
        Ok(AcceptOutcome::Accepted { job }) => ServerEvent::OfferSuccess {
            job_id: job.id,
            vendor_id: payload.vendor_id,
            accepted_at: job.accepted_at.unwrap_or_else(|| Utc::now().to_rfc3339()),
        },
        Ok(AcceptOutcome::AlreadyTaken) => ServerEvent::OfferFailed {
            job_id: payload.job_id,
            reason: DispatchFailure::AlreadyTaken,
        },
        Ok(AcceptOutcome::NotFound) => ServerEvent::OfferFailed {
            job_id: payload.job_id,
            reason: DispatchFailure::NotFound,
        },
        Err(error) => {
            warn!(job_id = %payload.job_id, %error, "acceptance failed");
            ServerEvent::OfferFailed {
                job_id: payload.job_id,
                reason: DispatchFailure::Unavailable,
            }
        }
    };
    state.registry.send_event(connection_id, &event);
}

/// `job:reject`: append to the rejection ledger, leaving the job untouched.
fn job_reject(state: &HandlerState, connection_id: &ConnectionId, data: &Value) {
    let Ok(payload) = serde_json::from_value::<RejectJob>(data.clone()) else {
        debug!(connection_id = %connection_id, "malformed job:reject dropped");
        return;
    };
    if !authorized_vendor(state, connection_id, &payload.vendor_id) {
        return;
    }
    let event = match state
        .engine
        .reject(&payload.vendor_id, &payload.job_id, &payload.reason)
    {
        Ok(()) => ServerEvent::RejectSuccess {
            job_id: payload.job_id,
        },
        Err(error) => {
            warn!(job_id = %payload.job_id, %error, "rejection could not be recorded");
            ServerEvent::RejectFailed {
                job_id: payload.job_id,
                reason: DispatchFailure::Unavailable,
            }
        }
    };
    state.registry.send_event(connection_id, &event);
}

/// `watch:vendor`: follow a vendor's live location stream. Open to any
/// connection, authenticated or not.
fn watch_vendor(state: &HandlerState, connection_id: &ConnectionId, data: &Value) {
    let Ok(payload) = serde_json::from_value::<WatchVendor>(data.clone()) else {
        debug!(connection_id = %connection_id, "malformed watch:vendor dropped");
        return;
    };
    state
        .registry
        .join_room(connection_id, &vendor_room(&payload.vendor_id));
}
