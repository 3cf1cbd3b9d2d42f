//! WebSocket and HTTP surface for the dispatch relay: connection registry,
//! frame routing, and the bridge from engine events to room broadcasts.

pub mod client;
pub mod event_bridge;
pub mod handlers;
pub mod server;

pub use client::{Connection, ConnectionRegistry};
pub use handlers::HandlerState;
pub use server::{start, AppState, ServerConfig, ServerHandle};
