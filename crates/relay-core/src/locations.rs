//! Live location reports from vendor devices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{JobId, VendorId};

/// One position sample as reported over the wire.
///
/// `job_id` is present while the vendor is tracking an active journey; its
/// presence is what gates history persistence downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub vendor_id: VendorId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl LocationReport {
    /// Parse a raw payload, returning `None` for anything that fails the
    /// wire contract: missing or empty `vendorId`, missing or non-numeric
    /// coordinates, or a payload that is not an object at all. Malformed
    /// reports are dropped, never answered.
    pub fn parse(data: &Value) -> Option<Self> {
        let mut report: LocationReport = serde_json::from_value(data.clone()).ok()?;
        if report.vendor_id.as_str().is_empty() {
            return None;
        }
        if !report.latitude.is_finite() || !report.longitude.is_finite() {
            return None;
        }
        // Treat an empty jobId the same as an absent one.
        if report.job_id.as_ref().is_some_and(|j| j.as_str().is_empty()) {
            report.job_id = None;
        }
        Some(report)
    }
}
