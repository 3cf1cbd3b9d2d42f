//! Credential verification for incoming connections.

mod sealed;

pub use sealed::{generate_key, AuthError, SealedTokenVerifier};

use relay_core::Identity;

/// Turns a presented credential into a verified identity.
///
/// Implementations never error: a credential that does not verify, for
/// whatever reason, is `None`, and the connection proceeds unauthenticated.
/// Called inline during the WebSocket upgrade, so it must be cheap.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Option<Identity>;
}
