//! BAR sizing and placement.
//!
//! Each BAR is probed by writing all-ones and reading back the decode mask.
//! With [`BusAssignment::Dynamic`] the BAR is then placed in the matching
//! controller aperture; with [`BusAssignment::Firmware`] the address already
//! programmed is read back.

use hadron_core::{kdebug, kerr, kwarn};
use hadron_driver_api::{Resource, ResourceFlags};

use crate::controller::{Aperture, BusAssignment, PciController};
use crate::device::PciDevice;
use crate::regs::{self, Command};

/// Decoded size of a BAR, or 0 if the mask is malformed.
///
/// `base` is the value found in the register, `maxbase` the value read back
/// after writing all-ones, `mask` the address bits for the BAR's space.
/// First address a 32-bit BAR cannot decode.
const BAR32_LIMIT: u64 = 1 << 32;

pub(crate) fn bar_size(base: u32, maxbase: u32, mask: u32) -> u32 {
    let size = maxbase & mask;
    if size == 0 {
        return 0;
    }
    // Lowest decoded address bit, minus one.
    let size = (size & size.wrapping_neg()) - 1;
    if base == maxbase && ((base | size) & mask) != mask {
        return 0;
    }
    size + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Io,
    Mem,
    MemPref,
}

impl Space {
    fn aperture(self, ctrl: &mut PciController) -> &mut Aperture {
        match self {
            Self::Io => &mut ctrl.io,
            Self::Mem => &mut ctrl.mem,
            Self::MemPref => &mut ctrl.mem_pref,
        }
    }

    fn flags(self) -> ResourceFlags {
        match self {
            Self::Io => ResourceFlags::IO,
            Self::Mem => ResourceFlags::MEM,
            Self::MemPref => ResourceFlags::MEM | ResourceFlags::PREFETCH,
        }
    }
}

/// Sizes and records the first `max_bar` BARs of `dev`.
///
/// In dynamic mode decoding is switched off while the BARs are probed and
/// restored afterwards. Running out of aperture stops the remaining BARs;
/// everything placed so far is kept.
pub(crate) fn assign_bars(ctrl: &mut PciController, dev: &mut PciDevice, max_bar: usize) {
    let dynamic = ctrl.assignment() == BusAssignment::Dynamic;
    let saved_cmd = if dynamic {
        let cmd = dev.read_config_u8(regs::COMMAND).unwrap_or(0);
        let decode = (Command::IO | Command::MEMORY).bits() as u8;
        let _ = dev.write_config_u8(regs::COMMAND, cmd & !decode);
        Some(cmd)
    } else {
        None
    };

    let mut bar = 0;
    while bar < max_bar {
        let index = bar;
        bar += 1;
        let reg = regs::BAR0 + (index as u8) * 4;

        let orig = dev.read_config_u32(reg).unwrap_or(0);
        let _ = dev.write_config_u32(reg, 0xFFFF_FFFF);
        let mask = dev.read_config_u32(reg).unwrap_or(0);
        let _ = dev.write_config_u32(reg, orig);

        if mask == 0 || mask == 0xFFFF_FFFF {
            kdebug!("pci {}: BAR{} not implemented", dev.address(), index);
            continue;
        }

        let (space, type_mask) = if mask & regs::BAR_SPACE_IO != 0 {
            (Space::Io, regs::BAR_IO_MASK)
        } else if mask & regs::BAR_MEM_PREFETCH != 0 && !ctrl.mem_pref.is_empty() {
            (Space::MemPref, regs::BAR_MEM_MASK)
        } else {
            (Space::Mem, regs::BAR_MEM_MASK)
        };
        let is_64 = space != Space::Io && mask & regs::BAR_MEM_TYPE_64 != 0 && bar < max_bar;

        let size = u64::from(bar_size(orig, mask, type_mask));
        if size == 0 {
            kwarn!("pci {}: BAR{} has bad decode mask {:#010x}", dev.address(), index, mask);
            continue;
        }
        kdebug!("pci {}: BAR{} mask={:#010x} {} bytes", dev.address(), index, mask, size);

        let start = if dynamic {
            let mut aperture = *space.aperture(ctrl);
            let Some(start) = aperture.allocate(size) else {
                kerr!(
                    "pci {}: BAR{} ({} bytes) does not fit in the {:?} aperture",
                    dev.address(),
                    index,
                    size,
                    space
                );
                break;
            };
            if !is_64 && start + size > BAR32_LIMIT {
                kerr!(
                    "pci {}: BAR{} is 32-bit but the {:?} aperture has no room below 4 GiB",
                    dev.address(),
                    index,
                    space
                );
                break;
            }
            *space.aperture(ctrl) = aperture;
            let _ = dev.write_config_u32(reg, start as u32);
            if is_64 {
                let _ = dev.write_config_u32(reg + 4, (start >> 32) as u32);
            }
            start
        } else {
            let low = dev.read_config_u32(reg).unwrap_or(0) & type_mask;
            let high = if is_64 {
                dev.read_config_u32(reg + 4).unwrap_or(0)
            } else {
                0
            };
            (u64::from(high) << 32) | u64::from(low)
        };

        let mut flags = space.flags();
        if is_64 {
            flags |= ResourceFlags::MEM_64;
            bar += 1;
        }
        match Resource::from_base_size(start, size, flags) {
            Some(res) => dev.set_resource(index, res),
            None => kwarn!("pci {}: BAR{} wraps the address space", dev.address(), index),
        }
    }

    if let Some(cmd) = saved_cmd {
        let _ = dev.write_config_u8(regs::COMMAND, cmd);
    }
}
