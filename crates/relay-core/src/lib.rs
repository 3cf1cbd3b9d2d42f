//! Core domain types for the relay dispatch subsystem: branded IDs,
//! identities, job status, wire events, and location report parsing.

pub mod events;
pub mod identity;
pub mod ids;
pub mod jobs;
pub mod locations;

pub use events::{
    vendor_room, zone_room, AcceptJob, DispatchFailure, InboundFrame, Outbound, RegisterVendor,
    RejectJob, ServerEvent, Target, WatchVendor,
};
pub use identity::{Identity, Role};
pub use ids::{ConnectionId, JobId, VendorId};
pub use jobs::JobStatus;
pub use locations::LocationReport;
