//! PCI bus support for Hadron OS.
//!
//! The crate turns a host controller's raw configuration-space accessors
//! into a tree of discovered functions and binds drivers to them:
//!
//! - [`config`] -- the [`PciOps`] trait controllers implement and the
//!   alignment-checked [`ConfigAccess`] wrapper over it.
//! - [`controller`] -- a host controller with its I/O and memory apertures
//!   and its bus-number policy.
//! - [`topology`] -- the bus/device tree an enumeration produces.
//! - [`device`] -- discovered functions: identity, decoded BARs, command
//!   register and capability helpers.
//! - [`caps`] -- bounded capability list walking.
//! - [`driver`] and [`registry`] -- the driver interface and the registry
//!   that matches published devices against registered drivers.
//!
//! Bus scanning, BAR sizing and bridge window programming run inside
//! [`PciRegistry::register_controller`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod bar;
mod bridge;
pub mod caps;
pub mod config;
pub mod controller;
pub mod device;
pub mod driver;
pub mod registry;
pub mod regs;
mod scan;
pub mod topology;

#[cfg(test)]
pub(crate) mod sim;

pub use caps::{CapabilityIter, RawCapability};
pub use config::{AccessWidth, ConfigAccess, PciOps};
pub use controller::{Aperture, BusAssignment, PciController};
pub use device::{PciDevice, PCI_NUM_RESOURCES};
pub use driver::PciDriver;
pub use registry::PciRegistry;
pub use topology::{BusId, DeviceId, PciBus, PciRoot, PciTopology};
