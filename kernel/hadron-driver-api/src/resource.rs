//! Decoded address-space windows.

use core::fmt;

bitflags::bitflags! {
    /// Address-space kind and attributes of a [`Resource`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResourceFlags: u32 {
        /// I/O port space.
        const IO       = 1 << 0;
        /// Memory space.
        const MEM      = 1 << 1;
        /// Prefetchable memory.
        const PREFETCH = 1 << 2;
        /// Decoded by a 64-bit BAR (consumes two BAR slots).
        const MEM_64   = 1 << 3;
    }
}

impl fmt::Display for ResourceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// A contiguous, inclusive address range `[start, end]`.
///
/// A resource with empty flags is unassigned and has size zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resource {
    /// First address of the window.
    pub start: u64,
    /// Last address of the window (inclusive).
    pub end: u64,
    /// Address-space kind.
    pub flags: ResourceFlags,
}

impl Resource {
    /// An unassigned resource slot.
    pub const EMPTY: Self = Self {
        start: 0,
        end: 0,
        flags: ResourceFlags::empty(),
    };

    /// Creates a resource covering `size` bytes from `start`.
    ///
    /// Returns `None` for a zero size or a window that would wrap the
    /// address space.
    #[must_use]
    pub fn from_base_size(start: u64, size: u64, flags: ResourceFlags) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let end = start.checked_add(size - 1)?;
        Some(Self { start, end, flags })
    }

    /// Returns `true` if this slot describes a decoded window.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Size of the window in bytes (zero when unassigned).
    #[must_use]
    pub fn size(&self) -> u64 {
        if self.is_assigned() {
            self.end - self.start + 1
        } else {
            0
        }
    }

    /// Returns `true` if `addr` falls inside the window.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.is_assigned() && (self.start..=self.end).contains(&addr)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_assigned() {
            return f.write_str("[unassigned]");
        }
        let kind = if self.flags.contains(ResourceFlags::IO) { "io" } else { "mem" };
        write!(f, "[{kind} {:#x}-{:#x}", self.start, self.end)?;
        if self.flags.contains(ResourceFlags::MEM_64) {
            f.write_str(" 64bit")?;
        }
        if self.flags.contains(ResourceFlags::PREFETCH) {
            f.write_str(" pref")?;
        }
        f.write_str("]")
    }
}

/// Rounds `value` up to a multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[must_use]
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
