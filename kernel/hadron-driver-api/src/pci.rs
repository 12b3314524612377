//! PCI bus types for device identification and driver matching.

/// PCI bus/device/function address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciAddress {
    /// Bus number (0-255).
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl PciAddress {
    /// Builds an address from a bus number and a combined devfn byte.
    #[must_use]
    pub const fn from_devfn(bus: u8, devfn: u8) -> Self {
        Self {
            bus,
            device: devfn >> 3,
            function: devfn & 0x07,
        }
    }

    /// Returns the combined device/function byte (`device << 3 | function`).
    #[must_use]
    pub const fn devfn(&self) -> u8 {
        ((self.device & 0x1F) << 3) | (self.function & 0x07)
    }
}

impl core::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Wildcard value for PCI ID matching: matches any vendor/device ID.
pub const PCI_ANY_ID: u16 = 0xFFFF;

/// The identification registers of a discovered function, as seen by matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PciIdentity {
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Subsystem vendor ID (zero for bridges).
    pub subsystem_vendor_id: u16,
    /// Subsystem device ID (zero for bridges).
    pub subsystem_device_id: u16,
    /// 24-bit class code: `(class << 16) | (subclass << 8) | prog_if`.
    pub class: u32,
    /// Revision ID.
    pub revision: u8,
}

impl PciIdentity {
    /// Base class byte.
    #[must_use]
    pub const fn base_class(&self) -> u8 {
        (self.class >> 16) as u8
    }

    /// Subclass byte.
    #[must_use]
    pub const fn subclass(&self) -> u8 {
        (self.class >> 8) as u8
    }

    /// Programming interface byte.
    #[must_use]
    pub const fn prog_if(&self) -> u8 {
        self.class as u8
    }
}

/// How the class fields of a [`PciDeviceId`] take part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassMatch {
    /// Compare only the bits selected by `class_mask`; a zero mask ignores
    /// the class entirely.
    #[default]
    Masked,
    /// Historical expression `((id.class ^ dev.class) & (id.class_mask == 0)) != 0`.
    ///
    /// A pattern only matches when its mask is zero and the low bit of the
    /// two class codes differs. Kept bit-for-bit for drivers whose ID tables
    /// were written against it.
    Literal,
}

/// PCI device ID for driver-to-device matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID (`PCI_ANY_ID` = wildcard, `0` = end of table).
    pub vendor: u16,
    /// Device ID (`PCI_ANY_ID` = wildcard).
    pub device: u16,
    /// Subsystem vendor ID (`PCI_ANY_ID` = wildcard).
    pub subvendor: u16,
    /// Subsystem device ID (`PCI_ANY_ID` = wildcard).
    pub subdevice: u16,
    /// Class code: `(class << 16) | (subclass << 8) | prog_if`.
    pub class: u32,
    /// Mask applied to class before comparison (0 = ignore class).
    pub class_mask: u32,
}

impl PciDeviceId {
    /// Table terminator. Entries after it are never considered.
    pub const SENTINEL: Self = Self {
        vendor: 0,
        device: 0,
        subvendor: 0,
        subdevice: 0,
        class: 0,
        class_mask: 0,
    };

    /// Matches every function.
    pub const ANY: Self = Self {
        vendor: PCI_ANY_ID,
        device: PCI_ANY_ID,
        subvendor: PCI_ANY_ID,
        subdevice: PCI_ANY_ID,
        class: 0,
        class_mask: 0,
    };

    /// Creates an ID entry matching a specific vendor/device pair.
    #[must_use]
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self {
            vendor,
            device,
            subvendor: PCI_ANY_ID,
            subdevice: PCI_ANY_ID,
            class: 0,
            class_mask: 0,
        }
    }

    /// Narrows this entry to a subsystem vendor/device pair.
    #[must_use]
    pub const fn with_subsystem(mut self, subvendor: u16, subdevice: u16) -> Self {
        self.subvendor = subvendor;
        self.subdevice = subdevice;
        self
    }

    /// Creates an ID entry matching a PCI class/subclass.
    #[must_use]
    pub const fn with_class(class: u8, subclass: u8) -> Self {
        Self {
            class: ((class as u32) << 16) | ((subclass as u32) << 8),
            class_mask: 0xFF_FF00,
            ..Self::ANY
        }
    }

    /// Creates an ID entry matching a PCI class, subclass, and programming interface.
    #[must_use]
    pub const fn with_class_progif(class: u8, subclass: u8, prog_if: u8) -> Self {
        Self {
            class: ((class as u32) << 16) | ((subclass as u32) << 8) | (prog_if as u32),
            class_mask: 0xFF_FFFF,
            ..Self::ANY
        }
    }

    /// Returns `true` for the table terminator.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.vendor == 0
    }

    /// Returns `true` if this entry matches `ident` under [`ClassMatch::Masked`].
    #[must_use]
    pub fn matches(&self, ident: &PciIdentity) -> bool {
        self.matches_with(ident, ClassMatch::Masked)
    }

    /// Returns `true` if this entry matches `ident` under the given class rule.
    ///
    /// The ID fields are checked in order: vendor, device, subsystem vendor,
    /// subsystem device, then class.
    #[must_use]
    pub fn matches_with(&self, ident: &PciIdentity, mode: ClassMatch) -> bool {
        if self.vendor != PCI_ANY_ID && self.vendor != ident.vendor_id {
            return false;
        }
        if self.device != PCI_ANY_ID && self.device != ident.device_id {
            return false;
        }
        if self.subvendor != PCI_ANY_ID && self.subvendor != ident.subsystem_vendor_id {
            return false;
        }
        if self.subdevice != PCI_ANY_ID && self.subdevice != ident.subsystem_device_id {
            return false;
        }
        match mode {
            ClassMatch::Masked => {
                self.class_mask == 0
                    || (ident.class & self.class_mask) == (self.class & self.class_mask)
            }
            ClassMatch::Literal => {
                ((self.class ^ ident.class) & u32::from(self.class_mask == 0)) != 0
            }
        }
    }
}

/// Returns a human-readable name for a PCI class/subclass pair.
#[must_use]
pub fn class_name(class: u8, subclass: u8) -> &'static str {
    match (class, subclass) {
        (0x00, 0x00) => "Non-VGA Unclassified",
        (0x01, 0x01) => "IDE Controller",
        (0x01, 0x06) => "SATA Controller",
        (0x01, 0x08) => "NVM Controller",
        (0x02, 0x00) => "Ethernet Controller",
        (0x03, 0x00) => "VGA Controller",
        (0x04, 0x00) => "Video Device",
        (0x04, 0x03) => "Audio Device",
        (0x06, 0x00) => "Host Bridge",
        (0x06, 0x01) => "ISA Bridge",
        (0x06, 0x04) => "PCI-to-PCI Bridge",
        (0x06, 0x07) => "CardBus Bridge",
        (0x08, 0x00) => "PIC",
        (0x08, 0x03) => "RTC Controller",
        (0x0C, 0x03) => "USB Controller",
        (0x0C, 0x05) => "SMBus Controller",
        _ => "Unknown",
    }
}
