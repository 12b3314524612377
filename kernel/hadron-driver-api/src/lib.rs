//! Driver-facing API types for the Hadron PCI subsystem.
//!
//! This crate defines the vocabulary shared between the PCI core and the
//! drivers it binds:
//!
//! - [`PciAddress`] and [`PciDeviceId`] -- where a function lives and how a
//!   driver describes the functions it supports.
//! - [`Resource`] and [`ResourceFlags`] -- decoded BAR windows.
//! - [`DriverError`] and [`PciError`] -- failures reported by drivers and by
//!   configuration-space transports.
//! - [`DriverInfo`] -- static driver identity used in logs and queries.

#![cfg_attr(not(test), no_std)]

pub mod driver;
pub mod error;
pub mod pci;
pub mod resource;

// Re-export all public types at the crate root for ergonomic imports.
pub use driver::DriverInfo;
pub use error::{DriverError, PciError};
pub use pci::{class_name, ClassMatch, PciAddress, PciDeviceId, PciIdentity, PCI_ANY_ID};
pub use resource::{align_up, Resource, ResourceFlags};
