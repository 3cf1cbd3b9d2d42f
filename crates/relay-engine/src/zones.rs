//! Zone membership derivation.

use tracing::instrument;

use relay_core::{zone_room, VendorId};
use relay_store::vendors::VendorRepo;

use crate::error::EngineError;

/// Resolves which zone room a vendor belongs in, from the durable vendor
/// record only. Client-supplied postal codes are never consulted.
pub struct ZoneRegistrar {
    vendors: VendorRepo,
}

impl ZoneRegistrar {
    pub fn new(vendors: VendorRepo) -> Self {
        Self { vendors }
    }

    /// `None` means "join nothing": the vendor is unknown or deactivated
    /// and registration becomes a silent no-op.
    #[instrument(skip(self), fields(vendor_id = %vendor_id))]
    pub fn zone_for(&self, vendor_id: &VendorId) -> Result<Option<String>, EngineError> {
        let Some(vendor) = self.vendors.get(vendor_id)? else {
            return Ok(None);
        };
        if !vendor.active {
            return Ok(None);
        }
        Ok(Some(zone_room(&vendor.postal_code)))
    }
}
