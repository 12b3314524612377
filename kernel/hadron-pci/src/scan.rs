//! Recursive bus enumeration.
//!
//! Every devfn on a bus is visited. Functions other than 0 are only probed
//! once function 0 of the same device reported the multi-function bit.
//! Normal headers get their six BARs sized; bridges get a child bus which is
//! scanned between the two window-programming passes before the bridge's own
//! two BARs are sized. A device is attached to its bus only once its setup
//! is complete, so devices behind a bridge precede the bridge itself in the
//! bus arena.

use hadron_core::{kdebug, kinfo, kwarn};
use hadron_driver_api::{class_name, PciAddress, PciIdentity};

use crate::bar;
use crate::bridge::{self, Windows};
use crate::controller::{BusAssignment, PciController};
use crate::device::PciDevice;
use crate::regs;
use crate::topology::{BusId, PciTopology};

/// Vendor/device dwords that mean "nothing here". Some boards return a
/// partial pattern for an empty slot instead of all-ones.
const EMPTY_SLOT_IDS: [u32; 4] = [0xFFFF_FFFF, 0x0000_0000, 0x0000_FFFF, 0xFFFF_0000];

/// Scans everything reachable from the controller's root bus.
pub(crate) fn enumerate(ctrl: &mut PciController) -> PciTopology {
    let mut topology = PciTopology::new();
    scan_bus(ctrl, &mut topology, BusId::ROOT);
    kinfo!(
        "pci: found {} functions on {} buses",
        topology.devices().len(),
        topology.bus_count()
    );
    topology
}

fn scan_bus(ctrl: &mut PciController, topology: &mut PciTopology, bus: BusId) {
    let number = topology.bus(bus).number();
    kdebug!("pci: scanning bus {:02x}", number);

    let mut multi_function = false;
    for devfn in 0..=u8::MAX {
        let function = devfn & 0x07;
        if function != 0 && !multi_function {
            continue;
        }

        let Ok(header_type) = ctrl.access().read_u8(number, devfn, regs::HEADER_TYPE) else {
            continue;
        };
        if function == 0 {
            multi_function = header_type & regs::HEADER_TYPE_MULTI_FUNCTION != 0;
        }

        let ids = match ctrl.access().read_u32(number, devfn, regs::VENDOR_ID) {
            Ok(ids) if !EMPTY_SLOT_IDS.contains(&ids) => ids,
            _ => continue,
        };
        let class_rev = ctrl
            .access()
            .read_u32(number, devfn, regs::CLASS_REVISION)
            .unwrap_or(0);
        let identity = PciIdentity {
            vendor_id: ids as u16,
            device_id: (ids >> 16) as u16,
            class: class_rev >> 8,
            revision: class_rev as u8,
            ..PciIdentity::default()
        };
        let mut dev = PciDevice::new(
            ctrl.access().clone(),
            PciAddress::from_devfn(number, devfn),
            bus,
            identity,
            header_type,
        );
        kinfo!(
            "pci {}: [{:04x}:{:04x}] class {:06x} ({}) header {:02x}",
            dev.address(),
            identity.vendor_id,
            identity.device_id,
            identity.class,
            class_name(identity.base_class(), identity.subclass()),
            header_type
        );

        match header_type & 0x7F {
            regs::HEADER_TYPE_NORMAL => {
                if identity.class >> 8 == regs::CLASS_BRIDGE_PCI {
                    kwarn!(
                        "pci {}: type 0 header on a PCI-to-PCI bridge class, ignoring",
                        dev.address()
                    );
                    continue;
                }
                bar::assign_bars(ctrl, &mut dev, 6);
                let subsystem_device = dev.read_config_u16(regs::SUBSYSTEM_ID).unwrap_or(0);
                let subsystem_vendor = dev.read_config_u16(regs::SUBSYSTEM_VENDOR_ID).unwrap_or(0);
                dev.set_subsystem(subsystem_vendor, subsystem_device);
                let line = dev.read_config_u8(regs::INTERRUPT_LINE).unwrap_or(0);
                let pin = dev.read_config_u8(regs::INTERRUPT_PIN).unwrap_or(0);
                dev.set_interrupt(line, pin);
            }
            regs::HEADER_TYPE_BRIDGE => {
                scan_bridge(ctrl, topology, bus, &mut dev);
                bar::assign_bars(ctrl, &mut dev, 2);
            }
            other => {
                kwarn!(
                    "pci {}: unknown header type {:02x}, ignoring",
                    dev.address(),
                    other
                );
                continue;
            }
        }

        topology.attach(dev);
    }
}

/// Creates the bus behind the bridge `dev` and scans it.
fn scan_bridge(
    ctrl: &mut PciController,
    topology: &mut PciTopology,
    parent: BusId,
    dev: &mut PciDevice,
) {
    let parent_number = topology.bus(parent).number();

    let secondary = match ctrl.assignment() {
        BusAssignment::Dynamic => {
            let Some(secondary) = ctrl.take_bus_number() else {
                kwarn!("pci {}: out of bus numbers, not scanning behind bridge", dev.address());
                return;
            };
            secondary
        }
        BusAssignment::Firmware => match bridge::read_bus_numbers(dev) {
            Ok((primary, secondary)) => {
                if primary != parent_number {
                    kwarn!(
                        "pci {}: primary bus {:02x} does not match parent bus {:02x}",
                        dev.address(),
                        primary,
                        parent_number
                    );
                }
                if secondary <= parent_number {
                    kwarn!(
                        "pci {}: secondary bus {:02x} not below bus {:02x}, not scanning",
                        dev.address(),
                        secondary,
                        parent_number
                    );
                    return;
                }
                secondary
            }
            Err(err) => {
                kwarn!("pci {}: cannot read bus numbers: {}", dev.address(), err);
                return;
            }
        },
    };

    let child = topology.add_bus(parent, secondary);
    dev.set_subordinate(child);

    let dynamic = ctrl.assignment() == BusAssignment::Dynamic;
    let opened = if dynamic {
        bridge::presetup(ctrl, dev, parent_number, secondary).unwrap_or_else(|err| {
            kwarn!("pci {}: bridge setup failed: {}", dev.address(), err);
            Windows::empty()
        })
    } else {
        Windows::empty()
    };
    scan_bus(ctrl, topology, child);
    if dynamic {
        if let Err(err) = bridge::postsetup(ctrl, dev, opened) {
            kwarn!("pci {}: bridge window setup failed: {}", dev.address(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessWidth;
    use crate::sim::{SimBar, SimFunction, SimOps};
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use hadron_driver_api::ResourceFlags;

    fn scan(mut ctrl: PciController) -> (PciController, PciTopology) {
        let topology = enumerate(&mut ctrl);
        (ctrl, topology)
    }

    fn addresses(topology: &PciTopology) -> Vec<PciAddress> {
        topology.devices().iter().map(|d| d.address()).collect()
    }

    #[test]
    fn sentinel_vendor_dwords_mean_empty() {
        let sim = Arc::new(SimOps::new());
        for (slot, ids) in [0xFFFF_FFFFu32, 0x0000_0000, 0x0000_FFFF, 0xFFFF_0000]
            .into_iter()
            .enumerate()
        {
            let devfn = (slot as u8 + 1) << 3;
            sim.add(0, devfn, SimFunction::normal(0, 0, 0x02_0000));
            sim.poke(0, devfn, regs::VENDOR_ID, AccessWidth::Dword, ids);
        }
        sim.add(0, 0x28, SimFunction::normal(0x8086, 0x100E, 0x02_0000));
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        assert_eq!(addresses(&topology), [PciAddress::from_devfn(0, 0x28)]);
    }

    #[test]
    fn functions_need_multi_function_bit_on_function_zero() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x08, SimFunction::normal(0x8086, 0x2918, 0x06_0100));
        sim.add(0, 0x09, SimFunction::normal(0x8086, 0x2922, 0x01_0601));
        sim.add(0, 0x10, SimFunction::normal(0x8086, 0x2930, 0x0C_0500).multi_function());
        sim.add(0, 0x13, SimFunction::normal(0x8086, 0x2934, 0x0C_0300));
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        assert_eq!(
            addresses(&topology),
            [
                PciAddress::from_devfn(0, 0x08),
                PciAddress::from_devfn(0, 0x10),
                PciAddress::from_devfn(0, 0x13)
            ]
        );
    }

    #[test]
    fn identity_fields_are_decoded() {
        let sim = Arc::new(SimOps::new());
        sim.add(
            0,
            0x18,
            SimFunction::normal(0x1AF4, 0x1001, 0x01_0000)
                .with_u16(regs::SUBSYSTEM_VENDOR_ID, 0x1AF4)
                .with_u16(regs::SUBSYSTEM_ID, 0x0002)
                .with_u8(regs::INTERRUPT_LINE, 11)
                .with_u8(regs::INTERRUPT_PIN, 1),
        );
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        let dev = &topology.devices()[0];
        assert_eq!(dev.class(), 0x01_0000);
        assert_eq!(dev.revision(), 0x01);
        assert_eq!(dev.identity().subsystem_vendor_id, 0x1AF4);
        assert_eq!(dev.identity().subsystem_device_id, 0x0002);
        assert_eq!((dev.interrupt_line(), dev.interrupt_pin()), (11, 1));
    }

    #[test]
    fn inconsistent_and_unknown_headers_are_skipped() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x00, SimFunction::normal(0x1B36, 0x0001, 0x06_0400));
        sim.add(0, 0x08, SimFunction::normal(0x1234, 0x1111, 0x03_0000).with_header_type(0x05));
        sim.add(0, 0x10, SimFunction::normal(0x1234, 0x2222, 0x03_0000));
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        assert_eq!(addresses(&topology), [PciAddress::from_devfn(0, 0x10)]);
    }

    #[test]
    fn read_failures_skip_the_slot() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x00, SimFunction::normal(0x1234, 0x1111, 0).failing());
        sim.add(0, 0x08, SimFunction::normal(0x1234, 0x2222, 0));
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        assert_eq!(addresses(&topology), [PciAddress::from_devfn(0, 0x08)]);
    }

    #[test]
    fn dynamic_bridge_end_to_end() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x00, SimFunction::bridge(0x1B36, 0x0001));
        sim.add(
            1,
            0x00,
            SimFunction::normal(0x8086, 0x100E, 0x02_0000).with_bar(0, SimBar::mem32(0x1000)),
        );
        let ctrl = PciController::new(sim.clone(), BusAssignment::Dynamic)
            .with_mem(0x1000_0000..0x2000_0000);
        let (ctrl, topology) = scan(ctrl);

        assert_eq!(topology.root().number(), 0);
        let child = topology.root().children()[0];
        assert_eq!(topology.bus(child).number(), 1);

        let leaf = topology.find(PciAddress::from_devfn(1, 0)).unwrap();
        let res = leaf.resource(0).copied().unwrap();
        assert_eq!((res.start, res.size(), res.flags), (0x1000_0000, 0x1000, ResourceFlags::MEM));
        assert_eq!(sim.peek(1, 0x00, regs::BAR0, AccessWidth::Dword), 0x1000_0000);

        let bridge = topology.find(PciAddress::from_devfn(0, 0)).unwrap();
        assert_eq!(bridge.subordinate(), Some(child));
        assert_eq!(sim.peek(0, 0x00, regs::SECONDARY_BUS, AccessWidth::Byte), 1);
        assert_eq!(sim.peek(0, 0x00, regs::SUBORDINATE_BUS, AccessWidth::Byte), 1);
        assert_eq!(sim.peek(0, 0x00, regs::MEMORY_BASE, AccessWidth::Word), 0x1000);
        assert_eq!(sim.peek(0, 0x00, regs::MEMORY_LIMIT, AccessWidth::Word), 0x1000);
        assert_eq!(ctrl.mem().start, 0x1010_0000);

        // The leaf finished setup first.
        assert_eq!(
            addresses(&topology),
            [PciAddress::from_devfn(1, 0), PciAddress::from_devfn(0, 0)]
        );
    }

    #[test]
    fn bridge_window_is_closed_when_children_fill_the_aperture() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x00, SimFunction::bridge(0x1B36, 0x0001));
        sim.add(
            1,
            0x00,
            SimFunction::normal(0x8086, 0x100E, 0x02_0000).with_bar(0, SimBar::mem32(0x10_0000)),
        );
        let ctrl = PciController::new(sim.clone(), BusAssignment::Dynamic)
            .with_mem(0x1000_0000..0x1010_0000);
        let (ctrl, _topology) = scan(ctrl);

        assert!(ctrl.mem().is_empty());
        assert_eq!(sim.peek(1, 0x00, regs::BAR0, AccessWidth::Dword), 0x1000_0000);
        assert_eq!(sim.peek(0, 0x00, regs::MEMORY_BASE, AccessWidth::Word), 0x1000);
        assert_eq!(sim.writes_to(0, 0x00, regs::MEMORY_LIMIT), [0x1000]);
    }

    #[test]
    fn nested_bridges_get_increasing_bus_numbers() {
        let sim = Arc::new(SimOps::new());
        sim.add(0, 0x00, SimFunction::bridge(0x1B36, 0x0001));
        sim.add(0, 0x08, SimFunction::bridge(0x1B36, 0x0001));
        sim.add(1, 0x00, SimFunction::bridge(0x1B36, 0x0001));
        sim.add(2, 0x00, SimFunction::normal(0x1AF4, 0x1000, 0x02_0000));
        sim.add(3, 0x00, SimFunction::normal(0x1AF4, 0x1001, 0x01_0000));
        let ctrl = PciController::new(sim.clone(), BusAssignment::Dynamic);
        let (_ctrl, topology) = scan(ctrl);

        assert_eq!(topology.bus_count(), 4);
        assert_eq!(sim.peek(0, 0x00, regs::SUBORDINATE_BUS, AccessWidth::Byte), 2);
        assert_eq!(sim.peek(1, 0x00, regs::SUBORDINATE_BUS, AccessWidth::Byte), 2);
        assert_eq!(sim.peek(0, 0x08, regs::SECONDARY_BUS, AccessWidth::Byte), 3);
        assert_eq!(sim.peek(0, 0x08, regs::SUBORDINATE_BUS, AccessWidth::Byte), 3);
        assert!(topology.find(PciAddress::from_devfn(2, 0)).is_some());
        assert!(topology.find(PciAddress::from_devfn(3, 0)).is_some());
    }

    #[test]
    fn firmware_mode_reads_back_bridge_and_64_bit_bar() {
        let sim = Arc::new(SimOps::new());
        sim.add(
            0,
            0x00,
            SimFunction::bridge(0x8086, 0x244E)
                .with_u8(regs::PRIMARY_BUS, 0)
                .with_u8(regs::SECONDARY_BUS, 5),
        );
        sim.add(
            5,
            0x00,
            SimFunction::normal(0x1B36, 0x0010, 0x01_0802)
                .with_bar(0, SimBar::mem64(0x4000))
                .with_bar(1, SimBar::upper())
                .with_bar_value(0, 0xFEB0_0000)
                .with_bar_value(1, 0x1),
        );
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);

        let child = topology.root().children()[0];
        assert_eq!(topology.bus(child).number(), 5);
        let nvme = topology.find(PciAddress::from_devfn(5, 0)).unwrap();
        let res = nvme.resource(0).copied().unwrap();
        assert_eq!(res.start, 0x1_FEB0_0000);
        assert!(res.flags.contains(ResourceFlags::MEM_64));
        assert!(sim
            .writes()
            .iter()
            .all(|w| w.offset >= regs::BAR0 && w.offset < regs::BAR0 + 24));
    }

    #[test]
    fn firmware_mode_refuses_backward_secondary_bus() {
        let sim = Arc::new(SimOps::new());
        sim.add(
            1,
            0x00,
            SimFunction::bridge(0x8086, 0x244E)
                .with_u8(regs::PRIMARY_BUS, 1)
                .with_u8(regs::SECONDARY_BUS, 1),
        );
        sim.add(
            0,
            0x00,
            SimFunction::bridge(0x8086, 0x244E)
                .with_u8(regs::PRIMARY_BUS, 0)
                .with_u8(regs::SECONDARY_BUS, 1),
        );
        let ctrl = PciController::new(sim.clone(), BusAssignment::Firmware);
        let (_ctrl, topology) = scan(ctrl);
        assert_eq!(topology.bus_count(), 2);
        assert_eq!(topology.devices().len(), 2);
    }
}
