//! Host controllers and their address-space apertures.

use alloc::sync::Arc;
use core::ops::Range;

use hadron_driver_api::align_up;

use crate::config::{ConfigAccess, PciOps};

/// Who assigns bus numbers, BAR addresses and bridge windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusAssignment {
    /// Firmware already programmed everything; the scan only reads it back.
    #[default]
    Firmware,
    /// The scan numbers buses and carves BARs and bridge windows out of the
    /// controller's apertures.
    Dynamic,
}

/// A half-open address range `[start, end)` handed out by bumping `start`.
///
/// `start` only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aperture {
    /// Allocation cursor: the lowest address not yet handed out.
    pub start: u64,
    /// One past the last usable address.
    pub end: u64,
}

impl Aperture {
    /// An aperture with no capacity.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    /// Creates an aperture covering `range`.
    #[must_use]
    pub fn new(range: Range<u64>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }

    /// Remaining capacity in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if nothing can be allocated from this aperture.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Moves the cursor up to the next multiple of `align`.
    pub(crate) fn align_cursor(&mut self, align: u64) {
        if let Some(aligned) = align_up(self.start, align) {
            self.start = aligned;
        }
    }

    /// Bump-allocates `size` bytes aligned to `size` (a power of two).
    ///
    /// Returns `None`, leaving the cursor untouched, if the placement would
    /// run past `end`.
    pub(crate) fn allocate(&mut self, size: u64) -> Option<u64> {
        let base = align_up(self.start, size)?;
        if base.checked_add(size)? > self.end {
            return None;
        }
        self.start = base + size;
        Some(base)
    }
}

/// A PCI host controller: config-space transport plus the apertures it
/// decodes downstream.
pub struct PciController {
    access: ConfigAccess,
    assignment: BusAssignment,
    pub(crate) io: Aperture,
    pub(crate) mem: Aperture,
    pub(crate) mem_pref: Aperture,
    next_bus: u16,
}

impl PciController {
    /// Creates a controller with empty apertures.
    #[must_use]
    pub fn new(ops: Arc<dyn PciOps>, assignment: BusAssignment) -> Self {
        Self {
            access: ConfigAccess::new(ops),
            assignment,
            io: Aperture::EMPTY,
            mem: Aperture::EMPTY,
            mem_pref: Aperture::EMPTY,
            next_bus: 1,
        }
    }

    /// Sets the I/O port aperture.
    #[must_use]
    pub fn with_io(mut self, range: Range<u64>) -> Self {
        self.io = Aperture::new(range);
        self
    }

    /// Sets the non-prefetchable memory aperture.
    #[must_use]
    pub fn with_mem(mut self, range: Range<u64>) -> Self {
        self.mem = Aperture::new(range);
        self
    }

    /// Sets the prefetchable memory aperture.
    ///
    /// While this aperture is empty, prefetchable BARs are placed in and
    /// recorded as ordinary memory.
    #[must_use]
    pub fn with_mem_pref(mut self, range: Range<u64>) -> Self {
        self.mem_pref = Aperture::new(range);
        self
    }

    /// Config-space accessor for this controller.
    #[must_use]
    pub fn access(&self) -> &ConfigAccess {
        &self.access
    }

    /// Bus-number and address assignment mode.
    #[must_use]
    pub fn assignment(&self) -> BusAssignment {
        self.assignment
    }

    /// I/O aperture (cursor reflects allocations so far).
    #[must_use]
    pub fn io(&self) -> Aperture {
        self.io
    }

    /// Memory aperture (cursor reflects allocations so far).
    #[must_use]
    pub fn mem(&self) -> Aperture {
        self.mem
    }

    /// Prefetchable memory aperture (cursor reflects allocations so far).
    #[must_use]
    pub fn mem_pref(&self) -> Aperture {
        self.mem_pref
    }

    /// Hands out the next secondary bus number, or `None` once all 255 are used.
    pub(crate) fn take_bus_number(&mut self) -> Option<u8> {
        let number = u8::try_from(self.next_bus).ok()?;
        self.next_bus += 1;
        Some(number)
    }

    /// The highest bus number handed out so far.
    pub(crate) fn last_bus_number(&self) -> u8 {
        u8::try_from(self.next_bus - 1).unwrap_or(u8::MAX)
    }
}

impl core::fmt::Debug for PciController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PciController")
            .field("assignment", &self.assignment)
            .field("io", &self.io)
            .field("mem", &self.mem)
            .field("mem_pref", &self.mem_pref)
            .field("next_bus", &self.next_bus)
            .finish_non_exhaustive()
    }
}
