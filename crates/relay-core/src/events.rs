//! Wire protocol: inbound frames from clients, outbound events to rooms.
//!
//! Both directions share the envelope `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ConnectionId, JobId, VendorId};
use crate::locations::LocationReport;

/// Room holding every connection watching or belonging to a vendor.
pub fn vendor_room(vendor_id: &VendorId) -> String {
    format!("vendor:{vendor_id}")
}

/// Room holding every vendor registered for a delivery zone.
pub fn zone_room(postal_code: &str) -> String {
    format!("zone:{postal_code}")
}

/// Prefix shared by all zone rooms, used to clear zone memberships on
/// re-registration.
pub const ZONE_ROOM_PREFIX: &str = "zone:";

/// Raw inbound frame before event-specific parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// `vendor:register` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVendor {
    pub vendor_id: VendorId,
}

/// `job:accept` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptJob {
    pub vendor_id: VendorId,
    pub job_id: JobId,
}

/// `job:reject` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectJob {
    pub vendor_id: VendorId,
    pub job_id: JobId,
    pub reason: String,
}

/// `watch:vendor` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchVendor {
    pub vendor_id: VendorId,
}

/// Why a `job:accept` or `job:reject` did not go the caller's way.
///
/// `AlreadyTaken` is the expected outcome of losing an acceptance race and
/// is never treated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchFailure {
    AlreadyTaken,
    NotFound,
    Unavailable,
}

/// Events pushed from the server to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Sent once per connection right after the upgrade.
    #[serde(rename = "connection:ready", rename_all = "camelCase")]
    ConnectionReady {
        connection_id: ConnectionId,
        authenticated: bool,
    },

    /// A job became offerable in a zone.
    #[serde(rename = "job:offer", rename_all = "camelCase")]
    JobOffer {
        job_id: JobId,
        destination_postal_code: String,
        created_at: String,
    },

    /// The caller won the acceptance race.
    #[serde(rename = "job:offer:success", rename_all = "camelCase")]
    OfferSuccess {
        job_id: JobId,
        vendor_id: VendorId,
        accepted_at: String,
    },

    /// The caller's acceptance did not take effect.
    #[serde(rename = "job:offer:failed", rename_all = "camelCase")]
    OfferFailed {
        job_id: JobId,
        reason: DispatchFailure,
    },

    /// The offer is gone; someone else won it.
    #[serde(rename = "job:offer:withdrawn", rename_all = "camelCase")]
    OfferWithdrawn { job_id: JobId },

    /// Live position sample, stamped with the server-side receive time.
    #[serde(rename = "vendor:live:location", rename_all = "camelCase")]
    LiveLocation {
        vendor_id: VendorId,
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
        recorded_at: String,
    },

    /// The rejection was recorded.
    #[serde(rename = "job:reject:success", rename_all = "camelCase")]
    RejectSuccess { job_id: JobId },

    /// The rejection could not be recorded.
    #[serde(rename = "job:reject:failed", rename_all = "camelCase")]
    RejectFailed {
        job_id: JobId,
        reason: DispatchFailure,
    },
}

impl ServerEvent {
    pub fn live_location(report: &LocationReport, recorded_at: impl Into<String>) -> Self {
        ServerEvent::LiveLocation {
            vendor_id: report.vendor_id.clone(),
            latitude: report.latitude,
            longitude: report.longitude,
            accuracy: report.accuracy,
            speed: report.speed,
            heading: report.heading,
            job_id: report.job_id.clone(),
            recorded_at: recorded_at.into(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionReady { .. } => "connection:ready",
            Self::JobOffer { .. } => "job:offer",
            Self::OfferSuccess { .. } => "job:offer:success",
            Self::OfferFailed { .. } => "job:offer:failed",
            Self::OfferWithdrawn { .. } => "job:offer:withdrawn",
            Self::LiveLocation { .. } => "vendor:live:location",
            Self::RejectSuccess { .. } => "job:reject:success",
            Self::RejectFailed { .. } => "job:reject:failed",
        }
    }
}

/// Where an event should be delivered.
#[derive(Debug, Clone)]
pub enum Target {
    /// Every connection in the room.
    Room(String),
    /// Every connection in the room except one (the accept winner hears
    /// success, not the withdrawal).
    RoomExcept(String, ConnectionId),
}

/// An event plus its delivery target, as carried on the fan-out channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn room(room: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: Target::Room(room.into()),
            event,
        }
    }

    pub fn room_except(room: impl Into<String>, except: &ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::RoomExcept(room.into(), except.clone()),
            event,
        }
    }
}
