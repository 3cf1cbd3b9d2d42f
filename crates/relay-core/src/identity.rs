//! Verified caller identity, as produced by token verification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::VendorId;

/// Role carried inside a verified credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Vendor,
    Customer,
    Ops,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Vendor => write!(f, "vendor"),
            Role::Customer => write!(f, "customer"),
            Role::Ops => write!(f, "ops"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vendor" => Ok(Role::Vendor),
            "customer" => Ok(Role::Customer),
            "ops" => Ok(Role::Ops),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The subject a connection acts as. Fixed at upgrade time; a connection
/// with no identity is an anonymous observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject ID: a vendor ID for `Role::Vendor`, a platform user ID
    /// otherwise.
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// Identity for a vendor connection.
    pub fn vendor(id: &VendorId) -> Self {
        Self::new(id.as_str(), Role::Vendor)
    }

    pub fn is_vendor(&self) -> bool {
        self.role == Role::Vendor
    }

    /// The vendor this identity speaks for, if it is a vendor at all.
    pub fn vendor_id(&self) -> Option<VendorId> {
        self.is_vendor().then(|| VendorId::from_raw(&self.subject))
    }
}
