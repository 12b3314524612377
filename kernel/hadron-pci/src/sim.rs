//! Simulated host controller for unit tests.
//!
//! Holds a 256-byte configuration image per function, applies BAR decode
//! masks on writes the way hardware does, and records every write. Reads of
//! unpopulated addresses return all-ones like an empty slot on a real bus.

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use hadron_driver_api::{PciAddress, PciError, PciIdentity};

use crate::config::{AccessWidth, ConfigAccess, PciOps};
use crate::device::PciDevice;
use crate::regs;
use crate::topology::BusId;

/// Decode behaviour of one BAR register.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimBar {
    /// Writable address bits.
    size_mask: u32,
    /// Read-only type bits.
    low_bits: u32,
}

impl SimBar {
    pub(crate) fn mem32(size: u32) -> Self {
        Self {
            size_mask: !(size - 1),
            low_bits: 0,
        }
    }

    pub(crate) fn mem32_prefetch(size: u32) -> Self {
        Self {
            size_mask: !(size - 1),
            low_bits: regs::BAR_MEM_PREFETCH,
        }
    }

    /// Low half of a 64-bit BAR; pair it with [`SimBar::upper`] in the next slot.
    pub(crate) fn mem64(size: u32) -> Self {
        Self {
            size_mask: !(size - 1),
            low_bits: regs::BAR_MEM_TYPE_64,
        }
    }

    pub(crate) fn upper() -> Self {
        Self {
            size_mask: 0xFFFF_FFFF,
            low_bits: 0,
        }
    }

    pub(crate) fn io(size: u32) -> Self {
        Self {
            size_mask: !(size - 1),
            low_bits: regs::BAR_SPACE_IO,
        }
    }

    /// A register returning a fixed pattern regardless of writes.
    pub(crate) fn fixed(value: u32) -> Self {
        Self {
            size_mask: 0,
            low_bits: value,
        }
    }
}

/// One simulated PCI function.
#[derive(Clone)]
pub(crate) struct SimFunction {
    config: [u8; 256],
    bars: [Option<SimBar>; 6],
    failing: bool,
}

impl SimFunction {
    fn blank(vendor: u16, device: u16, class: u32, header_type: u8) -> Self {
        let mut f = Self {
            config: [0; 256],
            bars: [None; 6],
            failing: false,
        };
        f.set(regs::VENDOR_ID, AccessWidth::Word, u32::from(vendor));
        f.set(regs::DEVICE_ID, AccessWidth::Word, u32::from(device));
        f.set(regs::CLASS_REVISION, AccessWidth::Dword, (class << 8) | 0x01);
        f.set(regs::HEADER_TYPE, AccessWidth::Byte, u32::from(header_type));
        f
    }

    /// A type 0 function with the given 24-bit class code.
    pub(crate) fn normal(vendor: u16, device: u16, class: u32) -> Self {
        Self::blank(vendor, device, class, regs::HEADER_TYPE_NORMAL)
    }

    /// A type 1 PCI-to-PCI bridge.
    pub(crate) fn bridge(vendor: u16, device: u16) -> Self {
        Self::blank(vendor, device, 0x06_0400, regs::HEADER_TYPE_BRIDGE)
    }

    /// A type 2 CardBus bridge.
    pub(crate) fn cardbus(vendor: u16, device: u16) -> Self {
        Self::blank(vendor, device, 0x06_0700, regs::HEADER_TYPE_CARDBUS)
    }

    pub(crate) fn multi_function(mut self) -> Self {
        self.config[usize::from(regs::HEADER_TYPE)] |= regs::HEADER_TYPE_MULTI_FUNCTION;
        self
    }

    pub(crate) fn with_header_type(mut self, header_type: u8) -> Self {
        self.config[usize::from(regs::HEADER_TYPE)] = header_type;
        self
    }

    pub(crate) fn with_bar(mut self, index: usize, bar: SimBar) -> Self {
        self.bars[index] = Some(bar);
        let offset = regs::BAR0 + (index as u8) * 4;
        let current = self.get(offset, AccessWidth::Dword);
        self.set(offset, AccessWidth::Dword, (current & bar.size_mask) | bar.low_bits);
        self
    }

    /// Pre-programs a BAR as firmware would.
    pub(crate) fn with_bar_value(mut self, index: usize, value: u32) -> Self {
        let offset = regs::BAR0 + (index as u8) * 4;
        let value = match self.bars[index] {
            Some(bar) => (value & bar.size_mask) | bar.low_bits,
            None => value,
        };
        self.set(offset, AccessWidth::Dword, value);
        self
    }

    pub(crate) fn with_u8(mut self, offset: u8, value: u8) -> Self {
        self.set(offset, AccessWidth::Byte, u32::from(value));
        self
    }

    pub(crate) fn with_u16(mut self, offset: u8, value: u16) -> Self {
        self.set(offset, AccessWidth::Word, u32::from(value));
        self
    }

    /// Builds a capability list from `(offset, id, next)` triples.
    ///
    /// The first triple's offset becomes the list head.
    pub(crate) fn with_capabilities(mut self, caps: &[(u8, u8, u8)]) -> Self {
        let status = self.get(regs::STATUS, AccessWidth::Word) as u16 | regs::STATUS_CAP_LIST;
        self.set(regs::STATUS, AccessWidth::Word, u32::from(status));
        let head = if self.get(regs::HEADER_TYPE, AccessWidth::Byte) & 0x7F
            == u32::from(regs::HEADER_TYPE_CARDBUS)
        {
            regs::CB_CAPABILITY_LIST
        } else {
            regs::CAPABILITY_LIST
        };
        if let Some(&(first, _, _)) = caps.first() {
            self.set(head, AccessWidth::Byte, u32::from(first));
        }
        for &(offset, id, next) in caps {
            self.set(offset, AccessWidth::Byte, u32::from(id));
            self.set(offset + 1, AccessWidth::Byte, u32::from(next));
        }
        self
    }

    /// Every config read fails with a transport error.
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn get(&self, offset: u8, width: AccessWidth) -> u32 {
        let start = usize::from(offset);
        (0..usize::from(width.bytes())).fold(0, |acc, i| {
            acc | (u32::from(self.config[start + i]) << (8 * i))
        })
    }

    fn set(&mut self, offset: u8, width: AccessWidth, value: u32) {
        let start = usize::from(offset);
        for i in 0..usize::from(width.bytes()) {
            self.config[start + i] = (value >> (8 * i)) as u8;
        }
    }

    fn bar_count(&self) -> usize {
        if u8::try_from(self.get(regs::HEADER_TYPE, AccessWidth::Byte) & 0x7F)
            == Ok(regs::HEADER_TYPE_BRIDGE)
        {
            2
        } else {
            6
        }
    }

    fn write(&mut self, offset: u8, width: AccessWidth, value: u32) {
        self.set(offset, width, value);
        let bar_end = regs::BAR0 as usize + self.bar_count() * 4;
        let first = usize::from(offset);
        let last = first + usize::from(width.bytes()) - 1;
        for slot in 0..self.bar_count() {
            let reg = regs::BAR0 as usize + slot * 4;
            if last < reg || first > reg + 3 || reg >= bar_end {
                continue;
            }
            let reg = reg as u8;
            let raw = self.get(reg, AccessWidth::Dword);
            let decoded = match self.bars[slot] {
                Some(bar) => (raw & bar.size_mask) | bar.low_bits,
                None => 0,
            };
            self.set(reg, AccessWidth::Dword, decoded);
        }
    }
}

/// One recorded config write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SimWrite {
    pub bus: u8,
    pub devfn: u8,
    pub offset: u8,
    pub width: AccessWidth,
    pub value: u32,
}

/// A simulated controller: a set of functions addressed by bus and devfn.
pub(crate) struct SimOps {
    functions: Mutex<BTreeMap<(u8, u8), SimFunction>>,
    writes: Mutex<Vec<SimWrite>>,
    accesses: AtomicUsize,
    map_offset: Option<u64>,
}

impl SimOps {
    pub(crate) fn new() -> Self {
        Self {
            functions: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            accesses: AtomicUsize::new(0),
            map_offset: None,
        }
    }

    /// A controller whose `map` hook adds `offset` to bus addresses.
    pub(crate) fn with_map_offset(offset: u64) -> Self {
        Self {
            map_offset: Some(offset),
            ..Self::new()
        }
    }

    pub(crate) fn add(&self, bus: u8, devfn: u8, function: SimFunction) {
        self.functions.lock().unwrap().insert((bus, devfn), function);
    }

    /// Reads the current register image without counting as an access.
    pub(crate) fn peek(&self, bus: u8, devfn: u8, offset: u8, width: AccessWidth) -> u32 {
        self.functions
            .lock()
            .unwrap()
            .get(&(bus, devfn))
            .map_or(0, |f| f.get(offset, width))
    }

    /// Overwrites a register image directly, bypassing decode masks.
    pub(crate) fn poke(&self, bus: u8, devfn: u8, offset: u8, width: AccessWidth, value: u32) {
        if let Some(f) = self.functions.lock().unwrap().get_mut(&(bus, devfn)) {
            f.set(offset, width, value);
        }
    }

    pub(crate) fn writes(&self) -> Vec<SimWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn writes_to(&self, bus: u8, devfn: u8, offset: u8) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|w| w.bus == bus && w.devfn == devfn && w.offset == offset)
            .map(|w| w.value)
            .collect()
    }

    pub(crate) fn access_count(&self) -> usize {
        self.accesses.load(Ordering::Relaxed)
    }
}

impl PciOps for SimOps {
    fn read(&self, bus: u8, devfn: u8, offset: u8, width: AccessWidth) -> Result<u32, PciError> {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        let functions = self.functions.lock().unwrap();
        match functions.get(&(bus, devfn)) {
            Some(f) if f.failing => Err(PciError::Transport(-5)),
            Some(f) => Ok(f.get(offset, width)),
            None => Ok(match width {
                AccessWidth::Byte => 0xFF,
                AccessWidth::Word => 0xFFFF,
                AccessWidth::Dword => 0xFFFF_FFFF,
            }),
        }
    }

    fn write(
        &self,
        bus: u8,
        devfn: u8,
        offset: u8,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), PciError> {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        self.writes.lock().unwrap().push(SimWrite {
            bus,
            devfn,
            offset,
            width,
            value,
        });
        if let Some(f) = self.functions.lock().unwrap().get_mut(&(bus, devfn)) {
            f.write(offset, width, value);
        }
        Ok(())
    }

    fn map(&self, _bus: u8, start: u64, _end: u64) -> Option<u64> {
        self.map_offset.map(|offset| start + offset)
    }
}

/// Builds a standalone device record backed by `sim` for registry and
/// device-operation tests.
pub(crate) fn device(
    sim: &Arc<SimOps>,
    bus: u8,
    devfn: u8,
    ident: PciIdentity,
) -> PciDevice {
    let access = ConfigAccess::new(sim.clone());
    PciDevice::new(
        access,
        PciAddress::from_devfn(bus, devfn),
        BusId::ROOT,
        ident,
        regs::HEADER_TYPE_NORMAL,
    )
}

/// Shorthand identity with vendor/device and class set.
pub(crate) fn ident(vendor: u16, device: u16, class: u32) -> PciIdentity {
    PciIdentity {
        vendor_id: vendor,
        device_id: device,
        class,
        ..PciIdentity::default()
    }
}
