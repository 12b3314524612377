//! Core logging and synchronization primitives for the Hadron PCI stack.
//!
//! This crate holds the pieces every other crate in the workspace leans on:
//! the leveled kernel log ([`klog!`] and friends) and the [`SpinLock`]
//! used to serialize the device/driver registry.
//!
//! Everything here is host-testable with `cargo test` and, for the lock,
//! with loom (`RUSTFLAGS="--cfg loom"`).
//!
//! [`SpinLock`]: sync::SpinLock

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod log;
pub mod sync;
