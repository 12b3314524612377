//! Arena-backed bus/device tree.
//!
//! Buses and devices live in two vectors owned by [`PciTopology`] and refer
//! to each other by index. A bus owns its child buses and the devices on it;
//! parent links are plain indices and never own anything. The tree is only
//! grown during enumeration and never shrinks.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hadron_driver_api::PciAddress;

use crate::controller::{Aperture, BusAssignment, PciController};
use crate::device::PciDevice;

/// Index of a bus inside a [`PciTopology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(u16);

impl BusId {
    /// The root bus of every topology.
    pub const ROOT: Self = Self(0);

    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a device inside a [`PciTopology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A PCI bus segment.
#[derive(Debug, Clone)]
pub struct PciBus {
    number: u8,
    parent: Option<BusId>,
    children: Vec<BusId>,
    devices: Vec<DeviceId>,
}

impl PciBus {
    /// Bus number.
    #[must_use]
    pub fn number(&self) -> u8 {
        self.number
    }

    /// The bus this one hangs off, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<BusId> {
        self.parent
    }

    /// Buses behind bridges on this bus, in discovery order.
    #[must_use]
    pub fn children(&self) -> &[BusId] {
        &self.children
    }

    /// Devices on this bus, in the order their setup completed.
    #[must_use]
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }
}

/// The bus/device tree below one host controller.
#[derive(Debug)]
pub struct PciTopology {
    buses: Vec<PciBus>,
    devices: Vec<Arc<PciDevice>>,
}

impl PciTopology {
    /// Creates a topology holding only the root bus (number 0).
    pub(crate) fn new() -> Self {
        Self {
            buses: alloc::vec![PciBus {
                number: 0,
                parent: None,
                children: Vec::new(),
                devices: Vec::new(),
            }],
            devices: Vec::new(),
        }
    }

    /// Creates a bus behind `parent` and links it as the parent's last child.
    pub(crate) fn add_bus(&mut self, parent: BusId, number: u8) -> BusId {
        // At most one bus per bus number plus one per bridge, well below u16::MAX.
        let id = BusId(self.buses.len() as u16);
        self.buses.push(PciBus {
            number,
            parent: Some(parent),
            children: Vec::new(),
            devices: Vec::new(),
        });
        self.buses[parent.index()].children.push(id);
        id
    }

    /// Appends a fully set-up device to its bus's device list.
    pub(crate) fn attach(&mut self, device: PciDevice) -> DeviceId {
        let id = DeviceId(self.devices.len() as u32);
        let bus = device.bus_id();
        self.devices.push(Arc::new(device));
        self.buses[bus.index()].devices.push(id);
        id
    }

    /// The root bus.
    #[must_use]
    pub fn root(&self) -> &PciBus {
        &self.buses[BusId::ROOT.index()]
    }

    /// Looks up a bus by id.
    #[must_use]
    pub fn bus(&self, id: BusId) -> &PciBus {
        &self.buses[id.index()]
    }

    /// Looks up a device by id.
    #[must_use]
    pub fn device(&self, id: DeviceId) -> &Arc<PciDevice> {
        &self.devices[id.index()]
    }

    /// Number of buses, including the root.
    #[must_use]
    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// All devices in attach order.
    #[must_use]
    pub fn devices(&self) -> &[Arc<PciDevice>] {
        &self.devices
    }

    /// Finds the device at `addr`.
    #[must_use]
    pub fn find(&self, addr: PciAddress) -> Option<&Arc<PciDevice>> {
        self.devices.iter().find(|d| d.address() == addr)
    }

    /// Devices in publication order: a bus's own devices first, then each
    /// child bus recursively, starting at the root.
    #[must_use]
    pub fn depth_first(&self) -> Vec<Arc<PciDevice>> {
        let mut out = Vec::with_capacity(self.devices.len());
        self.collect(BusId::ROOT, &mut out);
        out
    }

    fn collect(&self, bus: BusId, out: &mut Vec<Arc<PciDevice>>) {
        let bus = self.bus(bus);
        out.extend(bus.devices.iter().map(|&id| Arc::clone(self.device(id))));
        for &child in &bus.children {
            self.collect(child, out);
        }
    }
}

/// A registered host controller together with the tree found below it.
#[derive(Debug)]
pub struct PciRoot {
    topology: PciTopology,
    assignment: BusAssignment,
    io: Aperture,
    mem: Aperture,
    mem_pref: Aperture,
}

impl PciRoot {
    pub(crate) fn new(controller: &PciController, topology: PciTopology) -> Self {
        Self {
            topology,
            assignment: controller.assignment(),
            io: controller.io(),
            mem: controller.mem(),
            mem_pref: controller.mem_pref(),
        }
    }

    /// The bus/device tree.
    #[must_use]
    pub fn topology(&self) -> &PciTopology {
        &self.topology
    }

    /// Assignment mode the tree was built with.
    #[must_use]
    pub fn assignment(&self) -> BusAssignment {
        self.assignment
    }

    /// I/O aperture after enumeration; `start` is the first unused address.
    #[must_use]
    pub fn io(&self) -> Aperture {
        self.io
    }

    /// Memory aperture after enumeration.
    #[must_use]
    pub fn mem(&self) -> Aperture {
        self.mem
    }

    /// Prefetchable memory aperture after enumeration.
    #[must_use]
    pub fn mem_pref(&self) -> Aperture {
        self.mem_pref
    }
}
