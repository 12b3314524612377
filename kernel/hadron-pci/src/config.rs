//! Configuration-space access.
//!
//! A host controller exposes raw config reads and writes through [`PciOps`].
//! Everything above it goes through [`ConfigAccess`], which rejects
//! misaligned offsets before any hardware is touched and otherwise forwards
//! the access, returning the controller's error unchanged.

use alloc::sync::Arc;

use hadron_driver_api::PciError;

/// Width of a single configuration access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccessWidth {
    /// 8-bit access.
    Byte = 1,
    /// 16-bit access; offset must be even.
    Word = 2,
    /// 32-bit access; offset must be 4-byte aligned.
    Dword = 4,
}

impl AccessWidth {
    /// Access width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u8 {
        self as u8
    }

    /// Returns `true` if `offset` is naturally aligned for this width.
    #[must_use]
    pub const fn is_aligned(self, offset: u8) -> bool {
        offset & (self.bytes() - 1) == 0
    }
}

/// Raw configuration-space operations supplied by a host controller.
///
/// `devfn` is the combined device/function byte (`device << 3 | function`).
/// Implementations receive only naturally aligned offsets.
pub trait PciOps: Send + Sync {
    /// Reads `width` bytes at `offset`, zero-extended to 32 bits.
    ///
    /// # Errors
    ///
    /// Returns the controller's failure, which is passed to callers verbatim.
    fn read(&self, bus: u8, devfn: u8, offset: u8, width: AccessWidth) -> Result<u32, PciError>;

    /// Writes the low `width` bytes of `value` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the controller's failure, which is passed to callers verbatim.
    fn write(
        &self,
        bus: u8,
        devfn: u8,
        offset: u8,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), PciError>;

    /// Translates a decoded BAR range into an address the CPU can use.
    ///
    /// Controllers without a translation return `None`, in which case the
    /// bus address is used as-is.
    fn map(&self, _bus: u8, _start: u64, _end: u64) -> Option<u64> {
        None
    }
}

/// Alignment-checked, width-dispatched access to a controller's config space.
#[derive(Clone)]
pub struct ConfigAccess {
    ops: Arc<dyn PciOps>,
}

impl ConfigAccess {
    /// Wraps a controller's operations table.
    #[must_use]
    pub fn new(ops: Arc<dyn PciOps>) -> Self {
        Self { ops }
    }

    /// Returns the underlying operations table.
    #[must_use]
    pub fn ops(&self) -> &dyn PciOps {
        &*self.ops
    }

    fn read(&self, bus: u8, devfn: u8, offset: u8, width: AccessWidth) -> Result<u32, PciError> {
        if !width.is_aligned(offset) {
            return Err(PciError::Misaligned {
                offset,
                width: width.bytes(),
            });
        }
        self.ops.read(bus, devfn, offset, width)
    }

    fn write(
        &self,
        bus: u8,
        devfn: u8,
        offset: u8,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), PciError> {
        if !width.is_aligned(offset) {
            return Err(PciError::Misaligned {
                offset,
                width: width.bytes(),
            });
        }
        self.ops.write(bus, devfn, offset, width, value)
    }

    /// Reads an 8-bit register.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn read_u8(&self, bus: u8, devfn: u8, offset: u8) -> Result<u8, PciError> {
        self.read(bus, devfn, offset, AccessWidth::Byte).map(|v| v as u8)
    }

    /// Reads a 16-bit register.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] for odd offsets, otherwise the controller's failure.
    pub fn read_u16(&self, bus: u8, devfn: u8, offset: u8) -> Result<u16, PciError> {
        self.read(bus, devfn, offset, AccessWidth::Word).map(|v| v as u16)
    }

    /// Reads a 32-bit register.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] unless `offset` is 4-byte aligned, otherwise
    /// the controller's failure.
    pub fn read_u32(&self, bus: u8, devfn: u8, offset: u8) -> Result<u32, PciError> {
        self.read(bus, devfn, offset, AccessWidth::Dword)
    }

    /// Writes an 8-bit register.
    ///
    /// # Errors
    ///
    /// Propagates the controller's failure.
    pub fn write_u8(&self, bus: u8, devfn: u8, offset: u8, value: u8) -> Result<(), PciError> {
        self.write(bus, devfn, offset, AccessWidth::Byte, u32::from(value))
    }

    /// Writes a 16-bit register.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] for odd offsets, otherwise the controller's failure.
    pub fn write_u16(&self, bus: u8, devfn: u8, offset: u8, value: u16) -> Result<(), PciError> {
        self.write(bus, devfn, offset, AccessWidth::Word, u32::from(value))
    }

    /// Writes a 32-bit register.
    ///
    /// # Errors
    ///
    /// [`PciError::Misaligned`] unless `offset` is 4-byte aligned, otherwise
    /// the controller's failure.
    pub fn write_u32(&self, bus: u8, devfn: u8, offset: u8, value: u32) -> Result<(), PciError> {
        self.write(bus, devfn, offset, AccessWidth::Dword, value)
    }
}

impl core::fmt::Debug for ConfigAccess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConfigAccess").finish_non_exhaustive()
    }
}
