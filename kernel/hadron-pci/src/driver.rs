//! The interface PCI drivers implement.

use alloc::sync::Arc;

use hadron_driver_api::{ClassMatch, DriverError, DriverInfo, PciDeviceId, PciIdentity};

use crate::device::PciDevice;

/// A driver for PCI functions.
///
/// The registry calls [`probe`](PciDriver::probe) for a matching unbound
/// device and [`remove`](PciDriver::remove) when a binding ends. Neither is
/// called with registry locks held, so both may call back into the registry.
pub trait PciDriver: Send + Sync {
    /// Static driver identity for logs.
    fn info(&self) -> DriverInfo;

    /// Supported functions, in priority order.
    ///
    /// An entry with vendor `0` ([`PciDeviceId::SENTINEL`]) ends the table;
    /// anything after it is ignored.
    fn id_table(&self) -> &[PciDeviceId];

    /// Takes ownership of `dev`, which matched `id`.
    ///
    /// Called once per matching table entry, in table order, until one call
    /// succeeds.
    ///
    /// # Errors
    ///
    /// An error moves on to the next matching entry; once every entry has
    /// failed the device stays unbound.
    fn probe(&self, dev: &Arc<PciDevice>, id: &PciDeviceId) -> Result<(), DriverError>;

    /// Releases a device this driver probed successfully.
    fn remove(&self, _dev: &Arc<PciDevice>) {}
}

/// Entries of `table` before the sentinel that match `ident`, in order.
pub(crate) fn matching_ids(
    table: &[PciDeviceId],
    ident: PciIdentity,
    mode: ClassMatch,
) -> impl Iterator<Item = &PciDeviceId> {
    table
        .iter()
        .take_while(|id| !id.is_sentinel())
        .filter(move |id| id.matches_with(&ident, mode))
}
