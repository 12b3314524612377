//! Discovered PCI functions and the operations drivers perform on them.

use core::fmt;

use hadron_driver_api::{class_name, PciAddress, PciError, PciIdentity, Resource, ResourceFlags};

use crate::caps::{self, CapabilityIter};
use crate::config::ConfigAccess;
use crate::regs::{self, Command};
use crate::topology::BusId;

/// Number of BAR resource slots a function can have.
pub const PCI_NUM_RESOURCES: usize = 6;

/// A discovered PCI function.
///
/// Created and filled in by the bus scan, then shared read-only as
/// `Arc<PciDevice>`. Configuration accesses go straight to the owning
/// controller.
pub struct PciDevice {
    access: ConfigAccess,
    address: PciAddress,
    bus_id: BusId,
    identity: PciIdentity,
    header_type: u8,
    resources: [Resource; PCI_NUM_RESOURCES],
    subordinate: Option<BusId>,
    interrupt_line: u8,
    interrupt_pin: u8,
}

impl PciDevice {
    pub(crate) fn new(
        access: ConfigAccess,
        address: PciAddress,
        bus_id: BusId,
        identity: PciIdentity,
        header_type: u8,
    ) -> Self {
        Self {
            access,
            address,
            bus_id,
            identity,
            header_type,
            resources: [Resource::EMPTY; PCI_NUM_RESOURCES],
            subordinate: None,
            interrupt_line: 0,
            interrupt_pin: 0,
        }
    }

    // -- Identity -------------------------------------------------------------

    /// Bus/device/function address.
    #[must_use]
    pub fn address(&self) -> PciAddress {
        self.address
    }

    /// Combined device/function byte.
    #[must_use]
    pub fn devfn(&self) -> u8 {
        self.address.devfn()
    }

    /// The bus this function sits on.
    #[must_use]
    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }

    /// Identification registers used for driver matching.
    #[must_use]
    pub fn identity(&self) -> &PciIdentity {
        &self.identity
    }

    /// Vendor ID.
    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        self.identity.vendor_id
    }

    /// Device ID.
    #[must_use]
    pub fn device_id(&self) -> u16 {
        self.identity.device_id
    }

    /// 24-bit class code.
    #[must_use]
    pub fn class(&self) -> u32 {
        self.identity.class
    }

    /// Revision ID.
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.identity.revision
    }

    /// Raw header type register, including the multi-function bit.
    #[must_use]
    pub fn header_type(&self) -> u8 {
        self.header_type
    }

    /// Returns `true` for a PCI-to-PCI bridge.
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        self.header_type & 0x7F == regs::HEADER_TYPE_BRIDGE
    }

    /// The bus behind this bridge, if it was scanned.
    #[must_use]
    pub fn subordinate(&self) -> Option<BusId> {
        self.subordinate
    }

    /// Interrupt line routed by firmware (type 0 headers only).
    #[must_use]
    pub fn interrupt_line(&self) -> u8 {
        self.interrupt_line
    }

    /// Interrupt pin (0 = none, 1-4 = INTA#-INTD#).
    #[must_use]
    pub fn interrupt_pin(&self) -> u8 {
        self.interrupt_pin
    }

    // -- Resources ------------------------------------------------------------

    /// All BAR resource slots. The upper half of a 64-bit BAR stays empty.
    #[must_use]
    pub fn resources(&self) -> &[Resource; PCI_NUM_RESOURCES] {
        &self.resources
    }

    /// The resource decoded by `bar`, or `None` if the slot is out of range
    /// or unassigned.
    #[must_use]
    pub fn resource(&self, bar: usize) -> Option<&Resource> {
        self.resources.get(bar).filter(|r| r.is_assigned())
    }

    /// Bitmask of BAR indices whose resource flags intersect `flags`.
    #[must_use]
    pub fn select_bars(&self, flags: ResourceFlags) -> u32 {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.flags.intersects(flags))
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Address through which the CPU reaches `bar`.
    ///
    /// Uses the controller's `map` hook when it has one, otherwise the bus
    /// address itself.
    #[must_use]
    pub fn map_bar(&self, bar: usize) -> Option<u64> {
        let res = self.resource(bar)?;
        Some(
            self.access
                .ops()
                .map(self.address.bus, res.start, res.end)
                .unwrap_or(res.start),
        )
    }

    pub(crate) fn set_resource(&mut self, bar: usize, res: Resource) {
        self.resources[bar] = res;
    }

    pub(crate) fn set_subordinate(&mut self, bus: BusId) {
        self.subordinate = Some(bus);
    }

    pub(crate) fn set_subsystem(&mut self, vendor: u16, device: u16) {
        self.identity.subsystem_vendor_id = vendor;
        self.identity.subsystem_device_id = device;
    }

    pub(crate) fn set_interrupt(&mut self, line: u8, pin: u8) {
        self.interrupt_line = line;
        self.interrupt_pin = pin;
    }

    // -- Config space ---------------------------------------------------------

    /// Reads an 8-bit register of this function.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn read_config_u8(&self, offset: u8) -> Result<u8, PciError> {
        self.access.read_u8(self.address.bus, self.devfn(), offset)
    }

    /// Reads a 16-bit register of this function.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] or the controller's failure.
    pub fn read_config_u16(&self, offset: u8) -> Result<u16, PciError> {
        self.access.read_u16(self.address.bus, self.devfn(), offset)
    }

    /// Reads a 32-bit register of this function.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] or the controller's failure.
    pub fn read_config_u32(&self, offset: u8) -> Result<u32, PciError> {
        self.access.read_u32(self.address.bus, self.devfn(), offset)
    }

    /// Writes an 8-bit register of this function.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn write_config_u8(&self, offset: u8, value: u8) -> Result<(), PciError> {
        self.access.write_u8(self.address.bus, self.devfn(), offset, value)
    }

    /// Writes a 16-bit register of this function.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] or the controller's failure.
    pub fn write_config_u16(&self, offset: u8, value: u16) -> Result<(), PciError> {
        self.access.write_u16(self.address.bus, self.devfn(), offset, value)
    }

    /// Writes a 32-bit register of this function.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] or the controller's failure.
    pub fn write_config_u32(&self, offset: u8, value: u32) -> Result<(), PciError> {
        self.access.write_u32(self.address.bus, self.devfn(), offset, value)
    }

    // -- Command register -----------------------------------------------------

    fn update_command(&self, set: Command, clear: Command) -> Result<(), PciError> {
        let old = Command::from_bits_retain(self.read_config_u16(regs::COMMAND)?);
        let new = (old | set) - clear;
        if new != old {
            self.write_config_u16(regs::COMMAND, new.bits())?;
        }
        Ok(())
    }

    /// Turns on I/O and memory decoding.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn enable(&self) -> Result<(), PciError> {
        let cmd = self.read_config_u16(regs::COMMAND)?;
        self.write_config_u16(regs::COMMAND, cmd | (Command::IO | Command::MEMORY).bits())
    }

    /// Turns off I/O and memory decoding.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn disable(&self) -> Result<(), PciError> {
        let cmd = self.read_config_u16(regs::COMMAND)?;
        self.write_config_u16(regs::COMMAND, cmd & !(Command::IO | Command::MEMORY).bits())
    }

    /// Enables bus mastering. No write happens if it is already on.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn set_master(&self) -> Result<(), PciError> {
        self.update_command(Command::MASTER, Command::empty())
    }

    /// Disables bus mastering. No write happens if it is already off.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn clear_master(&self) -> Result<(), PciError> {
        self.update_command(Command::empty(), Command::MASTER)
    }

    // -- Capabilities ---------------------------------------------------------

    /// Offset of the first capability with ID `cap`.
    #[must_use]
    pub fn find_capability(&self, cap: u8) -> Option<u8> {
        self.capabilities().find(|c| c.id == cap).map(|c| c.offset)
    }

    /// Offset of the next capability with ID `cap` after the entry at `pos`.
    ///
    /// Never returns `pos` itself, so a self-referencing entry ends the walk.
    /// The walk starts at `pos`'s next pointer rather than the list head, so
    /// on a chain that cycles through several entries repeated calls keep
    /// revisiting them; callers collecting every match stop once an offset
    /// repeats.
    #[must_use]
    pub fn find_next_capability(&self, pos: u8, cap: u8) -> Option<u8> {
        let next_reg = pos.checked_add(regs::CAP_LIST_NEXT)?;
        CapabilityIter::from_pointer(&self.access, self.address.bus, self.devfn(), next_reg)
            .take_while(|c| c.offset != (pos & !3))
            .find(|c| c.id == cap)
            .map(|c| c.offset)
    }

    /// Iterates over every entry of the capability list.
    #[must_use]
    pub fn capabilities(&self) -> CapabilityIter<'_> {
        let (bus, devfn) = (self.address.bus, self.devfn());
        match caps::list_head(&self.access, bus, devfn, self.header_type) {
            Ok(Some(head)) => CapabilityIter::from_pointer(&self.access, bus, devfn, head),
            _ => CapabilityIter::empty(&self.access, bus, devfn),
        }
    }
}

impl fmt::Display for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:04x}:{:04x}] {}",
            self.address,
            self.identity.vendor_id,
            self.identity.device_id,
            class_name(self.identity.base_class(), self.identity.subclass()),
        )
    }
}

impl fmt::Debug for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PciDevice")
            .field("address", &self.address)
            .field("identity", &self.identity)
            .field("header_type", &self.header_type)
            .field("resources", &self.resources)
            .field("subordinate", &self.subordinate)
            .finish_non_exhaustive()
    }
}
