//! Capability list traversal.
//!
//! Capabilities form a singly linked list in configuration space. Each entry
//! is a 16-bit header: the low byte is the capability ID, the high byte the
//! offset of the next entry. The walk is bounded to [`CAP_LIST_TTL`] entries
//! so a corrupted or cyclic chain cannot hang the caller.

use hadron_driver_api::PciError;

use crate::config::ConfigAccess;
use crate::regs::{self, CAP_LIST_FLOOR, CAP_LIST_TTL};

/// One capability list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCapability {
    /// Capability ID (`regs::CAP_ID_*`).
    pub id: u8,
    /// Config-space offset of the entry header.
    pub offset: u8,
}

/// Returns the register holding the list head for `header_type`, or `None`
/// if the function has no capability list.
pub(crate) fn list_head(
    access: &ConfigAccess,
    bus: u8,
    devfn: u8,
    header_type: u8,
) -> Result<Option<u8>, PciError> {
    let status = access.read_u16(bus, devfn, regs::STATUS)?;
    if status & regs::STATUS_CAP_LIST == 0 {
        return Ok(None);
    }
    Ok(match header_type & 0x7F {
        regs::HEADER_TYPE_NORMAL | regs::HEADER_TYPE_BRIDGE => Some(regs::CAPABILITY_LIST),
        regs::HEADER_TYPE_CARDBUS => Some(regs::CB_CAPABILITY_LIST),
        _ => None,
    })
}

/// Iterator over the entries of a capability list.
///
/// Ends at a pointer below `0x40`, at an ID of `0xFF`, on a config read
/// failure, or after [`CAP_LIST_TTL`] entries.
#[derive(Debug, Clone)]
pub struct CapabilityIter<'a> {
    access: &'a ConfigAccess,
    bus: u8,
    devfn: u8,
    pos: u8,
    ttl: usize,
}

impl<'a> CapabilityIter<'a> {
    /// Starts a walk at the pointer stored in the byte register `pointer_reg`.
    pub(crate) fn from_pointer(access: &'a ConfigAccess, bus: u8, devfn: u8, pointer_reg: u8) -> Self {
        // A failed read leaves pos at 0, which ends the walk immediately.
        let pos = access.read_u8(bus, devfn, pointer_reg).unwrap_or(0);
        Self {
            access,
            bus,
            devfn,
            pos,
            ttl: CAP_LIST_TTL,
        }
    }

    /// An iterator that yields nothing.
    pub(crate) fn empty(access: &'a ConfigAccess, bus: u8, devfn: u8) -> Self {
        Self {
            access,
            bus,
            devfn,
            pos: 0,
            ttl: 0,
        }
    }
}

impl Iterator for CapabilityIter<'_> {
    type Item = RawCapability;

    fn next(&mut self) -> Option<RawCapability> {
        if self.ttl == 0 || self.pos < CAP_LIST_FLOOR {
            return None;
        }
        self.ttl -= 1;

        let offset = self.pos & !3;
        let Ok(entry) = self.access.read_u16(self.bus, self.devfn, offset) else {
            self.ttl = 0;
            return None;
        };
        let id = entry as u8;
        if id == 0xFF {
            self.ttl = 0;
            return None;
        }
        self.pos = (entry >> 8) as u8;
        Some(RawCapability { id, offset })
    }
}
