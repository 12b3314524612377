//! PCI-to-PCI bridge bus numbers and forwarding windows.
//!
//! In dynamic mode a bridge is programmed in two passes around the scan of
//! its secondary bus. [`presetup`] opens every window that has aperture
//! capacity at the current (aligned) cursor and leaves the subordinate bus
//! number wide open. [`postsetup`] closes the windows it opened at the
//! cursor reached after all downstream allocations and narrows the
//! subordinate number.

use hadron_core::kdebug;
use hadron_driver_api::PciError;

use crate::controller::PciController;
use crate::device::PciDevice;
use crate::regs::{self, Command};

/// Memory windows are 1 MiB granular.
const MEM_WINDOW_ALIGN: u64 = 1024 * 1024;
/// I/O windows are 4 KiB granular.
const IO_WINDOW_ALIGN: u64 = 4 * 1024;

/// Closed-window base/limit pair written to windows with no aperture.
const WINDOW_CLOSED_BASE: u16 = 0x1000;
const WINDOW_CLOSED_LIMIT: u16 = 0;

bitflags::bitflags! {
    /// Forwarding windows opened by [`presetup`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Windows: u8 {
        const IO = 1 << 0;
        const MEM = 1 << 1;
        const MEM_PREF = 1 << 2;
    }
}

fn mem_window_reg(addr: u64) -> u16 {
    ((addr & 0xFFF0_0000) >> 16) as u16
}

fn io_window_reg(addr: u64) -> u8 {
    ((addr & 0xF000) >> 8) as u8
}

fn io_upper_reg(addr: u64) -> u16 {
    ((addr & 0xFFFF_0000) >> 16) as u16
}

/// Programs bus numbers and opens the forwarding windows of `bridge`.
///
/// Returns the windows that were opened; [`postsetup`] needs them even when
/// the devices behind the bridge exhaust an aperture.
///
/// # Errors
///
/// Returns the first config write failure; windows programmed before it
/// stay programmed.
pub(crate) fn presetup(
    ctrl: &mut PciController,
    bridge: &PciDevice,
    primary: u8,
    secondary: u8,
) -> Result<Windows, PciError> {
    let mut opened = Windows::empty();
    let mut cmd = Command::from_bits_retain(bridge.read_config_u16(regs::COMMAND)?);

    bridge.write_config_u8(regs::PRIMARY_BUS, primary)?;
    bridge.write_config_u8(regs::SECONDARY_BUS, secondary)?;
    bridge.write_config_u8(regs::SUBORDINATE_BUS, 0xFF)?;

    if ctrl.mem.is_empty() {
        bridge.write_config_u16(regs::MEMORY_BASE, WINDOW_CLOSED_BASE)?;
        bridge.write_config_u16(regs::MEMORY_LIMIT, WINDOW_CLOSED_LIMIT)?;
    } else {
        ctrl.mem.align_cursor(MEM_WINDOW_ALIGN);
        bridge.write_config_u16(regs::MEMORY_BASE, mem_window_reg(ctrl.mem.start))?;
        opened |= Windows::MEM;
        cmd |= Command::MEMORY;
    }

    if ctrl.mem_pref.is_empty() {
        bridge.write_config_u16(regs::PREF_MEMORY_BASE, WINDOW_CLOSED_BASE)?;
        bridge.write_config_u16(regs::PREF_MEMORY_LIMIT, WINDOW_CLOSED_LIMIT)?;
        bridge.write_config_u32(regs::PREF_BASE_UPPER32, 0)?;
        bridge.write_config_u32(regs::PREF_LIMIT_UPPER32, 0)?;
    } else {
        ctrl.mem_pref.align_cursor(MEM_WINDOW_ALIGN);
        let start = ctrl.mem_pref.start;
        bridge.write_config_u16(regs::PREF_MEMORY_BASE, mem_window_reg(start))?;
        bridge.write_config_u32(regs::PREF_BASE_UPPER32, (start >> 32) as u32)?;
        opened |= Windows::MEM_PREF;
        cmd |= Command::MEMORY;
    }

    if !ctrl.io.is_empty() {
        ctrl.io.align_cursor(IO_WINDOW_ALIGN);
        let start = ctrl.io.start;
        bridge.write_config_u8(regs::IO_BASE, io_window_reg(start))?;
        bridge.write_config_u16(regs::IO_BASE_UPPER16, io_upper_reg(start))?;
        opened |= Windows::IO;
        cmd |= Command::IO;
    }

    bridge.write_config_u16(regs::COMMAND, (cmd | Command::MASTER).bits())?;
    Ok(opened)
}

/// Closes the `opened` forwarding windows of `bridge` around what its
/// secondary side consumed and narrows the subordinate bus number.
///
/// # Errors
///
/// Returns the first config write failure.
pub(crate) fn postsetup(
    ctrl: &mut PciController,
    bridge: &PciDevice,
    opened: Windows,
) -> Result<(), PciError> {
    bridge.write_config_u8(regs::SUBORDINATE_BUS, ctrl.last_bus_number())?;

    if opened.contains(Windows::MEM) {
        ctrl.mem.align_cursor(MEM_WINDOW_ALIGN);
        let limit = ctrl.mem.start.wrapping_sub(1);
        kdebug!("pci {}: memory window limit {:#x}", bridge.address(), limit);
        bridge.write_config_u16(regs::MEMORY_LIMIT, mem_window_reg(limit))?;
    }

    if opened.contains(Windows::MEM_PREF) {
        ctrl.mem_pref.align_cursor(MEM_WINDOW_ALIGN);
        let limit = ctrl.mem_pref.start.wrapping_sub(1);
        kdebug!("pci {}: prefetch window limit {:#x}", bridge.address(), limit);
        bridge.write_config_u16(regs::PREF_MEMORY_LIMIT, mem_window_reg(limit))?;
        bridge.write_config_u32(regs::PREF_LIMIT_UPPER32, (limit >> 32) as u32)?;
    }

    if opened.contains(Windows::IO) {
        ctrl.io.align_cursor(IO_WINDOW_ALIGN);
        let limit = ctrl.io.start.wrapping_sub(1);
        kdebug!("pci {}: I/O window limit {:#x}", bridge.address(), limit);
        bridge.write_config_u8(regs::IO_LIMIT, io_window_reg(limit))?;
        bridge.write_config_u16(regs::IO_LIMIT_UPPER16, io_upper_reg(limit))?;
    }

    Ok(())
}

/// Reads the primary and secondary bus numbers firmware programmed.
///
/// # Errors
///
/// Propagates the controller's failure.
pub(crate) fn read_bus_numbers(bridge: &PciDevice) -> Result<(u8, u8), PciError> {
    Ok((
        bridge.read_config_u8(regs::PRIMARY_BUS)?,
        bridge.read_config_u8(regs::SECONDARY_BUS)?,
    ))
}
