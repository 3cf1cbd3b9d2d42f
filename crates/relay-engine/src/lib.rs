//! Dispatch logic: zone registration, the offer/accept/reject protocol, and
//! the live location pipeline.

pub mod dispatch;
pub mod error;
pub mod location;
pub mod zones;

pub use dispatch::{AcceptOutcome, DispatchEngine};
pub use error::EngineError;
pub use location::LocationPipeline;
pub use zones::ZoneRegistrar;
