//! Standard PCI configuration space register layout.
//!
//! Offsets and bit positions follow the PCI Local Bus specification. Offsets
//! shared by type 0 (general device) and type 1 (PCI-to-PCI bridge) headers
//! come first, followed by the type-specific ones.

/// Vendor ID (16-bit, offset 0x00). Read as a dword, the device ID follows.
pub const VENDOR_ID: u8 = 0x00;
/// Device ID (16-bit, offset 0x02).
pub const DEVICE_ID: u8 = 0x02;
/// Command register (16-bit, offset 0x04).
pub const COMMAND: u8 = 0x04;
/// Status register (16-bit, offset 0x06).
pub const STATUS: u8 = 0x06;
/// Revision ID in the low byte, 24-bit class code above it (32-bit, offset 0x08).
pub const CLASS_REVISION: u8 = 0x08;
/// Header type (8-bit, offset 0x0E). Bit 7 = multi-function.
pub const HEADER_TYPE: u8 = 0x0E;
/// Base Address Register 0 (32-bit, offset 0x10). BAR1-5 at +4 intervals.
pub const BAR0: u8 = 0x10;
/// Base Address Register 1 (32-bit, offset 0x14).
pub const BAR1: u8 = 0x14;
/// Capabilities Pointer (8-bit, offset 0x34) for type 0 and type 1 headers.
pub const CAPABILITY_LIST: u8 = 0x34;
/// Interrupt Line (8-bit, offset 0x3C).
pub const INTERRUPT_LINE: u8 = 0x3C;
/// Interrupt Pin (8-bit, offset 0x3D).
pub const INTERRUPT_PIN: u8 = 0x3D;

// -- Type 0 header ------------------------------------------------------------

/// Subsystem Vendor ID (16-bit, offset 0x2C).
pub const SUBSYSTEM_VENDOR_ID: u8 = 0x2C;
/// Subsystem Device ID (16-bit, offset 0x2E).
pub const SUBSYSTEM_ID: u8 = 0x2E;

// -- Type 1 (PCI-to-PCI bridge) header ------------------------------------------

/// Primary Bus Number (8-bit, offset 0x18).
pub const PRIMARY_BUS: u8 = 0x18;
/// Secondary Bus Number (8-bit, offset 0x19).
pub const SECONDARY_BUS: u8 = 0x19;
/// Subordinate Bus Number (8-bit, offset 0x1A).
pub const SUBORDINATE_BUS: u8 = 0x1A;
/// I/O Base, address bits 15:12 in the high nibble (8-bit, offset 0x1C).
pub const IO_BASE: u8 = 0x1C;
/// I/O Limit, address bits 15:12 in the high nibble (8-bit, offset 0x1D).
pub const IO_LIMIT: u8 = 0x1D;
/// Memory Base, address bits 31:20 in bits 15:4 (16-bit, offset 0x20).
pub const MEMORY_BASE: u8 = 0x20;
/// Memory Limit (16-bit, offset 0x22).
pub const MEMORY_LIMIT: u8 = 0x22;
/// Prefetchable Memory Base (16-bit, offset 0x24).
pub const PREF_MEMORY_BASE: u8 = 0x24;
/// Prefetchable Memory Limit (16-bit, offset 0x26).
pub const PREF_MEMORY_LIMIT: u8 = 0x26;
/// Prefetchable Base, upper 32 bits (32-bit, offset 0x28).
pub const PREF_BASE_UPPER32: u8 = 0x28;
/// Prefetchable Limit, upper 32 bits (32-bit, offset 0x2C).
pub const PREF_LIMIT_UPPER32: u8 = 0x2C;
/// I/O Base, upper 16 bits (16-bit, offset 0x30).
pub const IO_BASE_UPPER16: u8 = 0x30;
/// I/O Limit, upper 16 bits (16-bit, offset 0x32).
pub const IO_LIMIT_UPPER16: u8 = 0x32;

// -- Type 2 (CardBus bridge) header ---------------------------------------------

/// Capabilities Pointer for CardBus bridges (8-bit, offset 0x14).
pub const CB_CAPABILITY_LIST: u8 = 0x14;

// -- Header types -----------------------------------------------------------------

/// General device header.
pub const HEADER_TYPE_NORMAL: u8 = 0x00;
/// PCI-to-PCI bridge header.
pub const HEADER_TYPE_BRIDGE: u8 = 0x01;
/// CardBus bridge header.
pub const HEADER_TYPE_CARDBUS: u8 = 0x02;
/// Multi-function bit of the header type register.
pub const HEADER_TYPE_MULTI_FUNCTION: u8 = 0x80;

/// Base/subclass code of a PCI-to-PCI bridge (class code without prog-if).
pub const CLASS_BRIDGE_PCI: u32 = 0x0604;

// -- Status register bits -----------------------------------------------------------

/// Bit 4 of the Status register: capabilities list present.
pub const STATUS_CAP_LIST: u16 = 1 << 4;

// -- BAR bits -------------------------------------------------------------------------

/// BAR bit 0: I/O space indicator.
pub const BAR_SPACE_IO: u32 = 0x01;
/// BAR bits 2:1 == 0b10: 64-bit memory BAR.
pub const BAR_MEM_TYPE_64: u32 = 0x04;
/// BAR bit 3: prefetchable memory.
pub const BAR_MEM_PREFETCH: u32 = 0x08;
/// Address bits of an I/O BAR.
pub const BAR_IO_MASK: u32 = !0x03;
/// Address bits of a memory BAR.
pub const BAR_MEM_MASK: u32 = !0x0F;

// -- Capability lists ------------------------------------------------------------------

/// Offset of the next-pointer byte inside a capability header.
pub const CAP_LIST_NEXT: u8 = 1;
/// First offset past the standard header; list pointers below it end the list.
pub const CAP_LIST_FLOOR: u8 = 0x40;
/// Maximum number of capability entries visited before giving up.
pub const CAP_LIST_TTL: usize = 48;

/// Power Management capability ID.
pub const CAP_ID_PM: u8 = 0x01;
/// MSI capability ID.
pub const CAP_ID_MSI: u8 = 0x05;
/// Vendor-specific capability ID (used by VirtIO PCI).
pub const CAP_ID_VENDOR: u8 = 0x09;
/// PCI Express capability ID.
pub const CAP_ID_EXP: u8 = 0x10;
/// MSI-X capability ID.
pub const CAP_ID_MSIX: u8 = 0x11;

bitflags::bitflags! {
    /// Bits of the Command register this subsystem manipulates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command: u16 {
        /// Respond to I/O space accesses.
        const IO     = 1 << 0;
        /// Respond to memory space accesses.
        const MEMORY = 1 << 1;
        /// Enable bus mastering.
        const MASTER = 1 << 2;
    }
}
