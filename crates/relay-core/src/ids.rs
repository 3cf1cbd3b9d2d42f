//! Branded ID newtypes.
//!
//! Every entity gets its own string-backed ID type so a `VendorId` can never
//! be passed where a `JobId` is expected. IDs generated here carry a short
//! prefix and a UUIDv7 payload, which keeps them time-sortable; IDs issued by
//! the surrounding platform are wrapped verbatim with `from_raw`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new ID with this type's prefix and a UUIDv7 payload.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing raw string as this ID type.
            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// The underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::from_raw(s))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Unique identifier for a vendor (field technician / courier).
    VendorId,
    "ven"
);

branded_id!(
    /// Unique identifier for a dispatchable job.
    JobId,
    "job"
);

branded_id!(
    /// Unique identifier for a live WebSocket connection.
    ConnectionId,
    "conn"
);
