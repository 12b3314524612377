//! Device/driver registry.
//!
//! The registry owns the list of published devices, the list of registered
//! drivers and the roots of every registered controller. All list updates
//! and binding decisions happen under one lock, but driver callbacks never
//! run with it held: a device is first claimed (`Unbound -> Probing` or
//! `Bound -> Removing`) under the lock, the callback runs unlocked, and the
//! result is committed under the lock again. A claimed device is never
//! touched by another binding decision, so decisions on one device are
//! serialized while callbacks remain free to call back into the registry.
//!
//! A driver that shows up while a device is claimed is queued on that
//! device and tried once the claim ends, so the final bindings do not
//! depend on whether drivers or devices were registered first.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use hadron_core::sync::SpinLock;
use hadron_core::{kdebug, kinfo};
use hadron_driver_api::{ClassMatch, DriverError};

use crate::controller::PciController;
use crate::device::PciDevice;
use crate::driver::{matching_ids, PciDriver};
use crate::scan;
use crate::topology::PciRoot;

fn same_driver(a: &Arc<dyn PciDriver>, b: &Arc<dyn PciDriver>) -> bool {
    core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

enum Binding {
    Unbound,
    /// A probe is running outside the lock.
    Probing,
    Bound(Arc<dyn PciDriver>),
    /// The bound driver's `remove` is running outside the lock.
    Removing,
}

struct DeviceEntry {
    dev: Arc<PciDevice>,
    binding: Binding,
    /// Drivers registered while the device was claimed.
    pending: Vec<Arc<dyn PciDriver>>,
}

struct Inner {
    devices: Vec<DeviceEntry>,
    drivers: Vec<Arc<dyn PciDriver>>,
    roots: Vec<Arc<PciRoot>>,
}

impl Inner {
    fn entry_mut(&mut self, dev: &Arc<PciDevice>) -> Option<&mut DeviceEntry> {
        self.devices.iter_mut().find(|e| Arc::ptr_eq(&e.dev, dev))
    }

    fn has_device(&self, dev: &Arc<PciDevice>) -> bool {
        self.devices.iter().any(|e| Arc::ptr_eq(&e.dev, dev))
    }

    fn has_driver(&self, drv: &Arc<dyn PciDriver>) -> bool {
        self.drivers.iter().any(|d| same_driver(d, drv))
    }
}

/// Outcome of committing a successful probe.
enum Commit {
    Bound,
    /// The driver went away during the probe.
    DriverGone,
    /// The device went away during the probe.
    DeviceGone,
}

/// Matches published devices against registered drivers.
pub struct PciRegistry {
    inner: SpinLock<Inner>,
    class_match: ClassMatch,
}

impl PciRegistry {
    /// Creates an empty registry using [`ClassMatch::Masked`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_class_match(ClassMatch::Masked)
    }

    /// Creates an empty registry with an explicit class-matching rule.
    #[must_use]
    pub const fn with_class_match(class_match: ClassMatch) -> Self {
        Self {
            inner: SpinLock::named(
                "pci_registry",
                Inner {
                    devices: Vec::new(),
                    drivers: Vec::new(),
                    roots: Vec::new(),
                },
            ),
            class_match,
        }
    }

    /// Class-matching rule applied to driver ID tables.
    #[must_use]
    pub fn class_match(&self) -> ClassMatch {
        self.class_match
    }

    /// Registers `drv` and offers it every unbound device it matches.
    ///
    /// # Errors
    ///
    /// [`DriverError::AlreadyRegistered`] if `drv` is already registered.
    pub fn register_driver(&self, drv: Arc<dyn PciDriver>) -> Result<(), DriverError> {
        let devices: Vec<_> = {
            let mut inner = self.inner.lock();
            if inner.has_driver(&drv) {
                return Err(DriverError::AlreadyRegistered);
            }
            inner.drivers.push(Arc::clone(&drv));
            inner.devices.iter().map(|e| Arc::clone(&e.dev)).collect()
        };
        kinfo!("pci: registered driver {}", drv.info());

        for dev in devices {
            if matching_ids(drv.id_table(), *dev.identity(), self.class_match)
                .next()
                .is_none()
            {
                continue;
            }
            {
                let mut inner = self.inner.lock();
                if !inner.has_driver(&drv) {
                    break;
                }
                let Some(entry) = inner.entry_mut(&dev) else {
                    continue;
                };
                match entry.binding {
                    Binding::Unbound => entry.binding = Binding::Probing,
                    Binding::Bound(_) => continue,
                    Binding::Probing | Binding::Removing => {
                        if !entry.pending.iter().any(|d| same_driver(d, &drv)) {
                            entry.pending.push(Arc::clone(&drv));
                        }
                        continue;
                    }
                }
            }
            self.settle(&dev, alloc::vec![Arc::clone(&drv)]);
        }
        Ok(())
    }

    /// Unbinds every device bound to `drv` and removes it from the registry.
    ///
    /// `drv.remove` has returned for every such device when this returns.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotRegistered`] if `drv` is not registered.
    pub fn unregister_driver(&self, drv: &Arc<dyn PciDriver>) -> Result<(), DriverError> {
        let bound: Vec<_> = {
            let mut inner = self.inner.lock();
            let pos = inner
                .drivers
                .iter()
                .position(|d| same_driver(d, drv))
                .ok_or(DriverError::NotRegistered)?;
            inner.drivers.remove(pos);

            let mut bound = Vec::new();
            for entry in &mut inner.devices {
                entry.pending.retain(|d| !same_driver(d, drv));
                if matches!(&entry.binding, Binding::Bound(d) if same_driver(d, drv)) {
                    entry.binding = Binding::Removing;
                    bound.push(Arc::clone(&entry.dev));
                }
            }
            bound
        };
        kinfo!("pci: unregistered driver {}", drv.info());

        for dev in bound {
            drv.remove(&dev);
            kinfo!("pci {}: unbound from {}", dev.address(), drv.info());
            if let Some(candidates) = self.next_candidates(&dev) {
                self.settle(&dev, candidates);
            }
        }
        Ok(())
    }

    /// Publishes `dev` and binds it to the first registered driver whose
    /// probe accepts it.
    ///
    /// # Errors
    ///
    /// [`DriverError::AlreadyRegistered`] if `dev` is already published.
    pub fn register_device(&self, dev: Arc<PciDevice>) -> Result<(), DriverError> {
        let drivers = {
            let mut inner = self.inner.lock();
            if inner.has_device(&dev) {
                return Err(DriverError::AlreadyRegistered);
            }
            inner.devices.push(DeviceEntry {
                dev: Arc::clone(&dev),
                binding: Binding::Probing,
                pending: Vec::new(),
            });
            inner.drivers.clone()
        };
        self.settle(&dev, drivers);
        Ok(())
    }

    /// Withdraws `dev`, calling its driver's `remove` if it is bound.
    ///
    /// A probe still running for `dev` finishes on its own; its driver gets
    /// `remove` if the probe succeeded.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotRegistered`] if `dev` was not published.
    pub fn unregister_device(&self, dev: &Arc<PciDevice>) -> Result<(), DriverError> {
        let entry = {
            let mut inner = self.inner.lock();
            let pos = inner
                .devices
                .iter()
                .position(|e| Arc::ptr_eq(&e.dev, dev))
                .ok_or(DriverError::NotRegistered)?;
            inner.devices.remove(pos)
        };
        if let Binding::Bound(drv) = entry.binding {
            drv.remove(dev);
            kinfo!("pci {}: unbound from {}", dev.address(), drv.info());
        }
        Ok(())
    }

    /// Enumerates everything behind `ctrl`, then publishes the devices found.
    ///
    /// Devices are published bus by bus: a bus's own devices first, then
    /// each child bus in discovery order.
    ///
    /// # Errors
    ///
    /// Propagates a publication failure.
    pub fn register_controller(&self, mut ctrl: PciController) -> Result<Arc<PciRoot>, DriverError> {
        let topology = scan::enumerate(&mut ctrl);
        let root = Arc::new(PciRoot::new(&ctrl, topology));
        for dev in root.topology().depth_first() {
            self.register_device(dev)?;
        }
        self.inner.lock().roots.push(Arc::clone(&root));
        Ok(root)
    }

    // -- Queries --------------------------------------------------------------

    /// Published devices in publication order.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<PciDevice>> {
        self.inner.lock().devices.iter().map(|e| Arc::clone(&e.dev)).collect()
    }

    /// The driver `dev` is bound to, if any.
    #[must_use]
    pub fn bound_driver(&self, dev: &Arc<PciDevice>) -> Option<Arc<dyn PciDriver>> {
        let inner = self.inner.lock();
        inner
            .devices
            .iter()
            .find(|e| Arc::ptr_eq(&e.dev, dev))
            .and_then(|e| match &e.binding {
                Binding::Bound(drv) => Some(Arc::clone(drv)),
                _ => None,
            })
    }

    /// Number of registered drivers.
    #[must_use]
    pub fn driver_count(&self) -> usize {
        self.inner.lock().drivers.len()
    }

    /// Roots of every registered controller, in registration order.
    #[must_use]
    pub fn roots(&self) -> Vec<Arc<PciRoot>> {
        self.inner.lock().roots.clone()
    }

    // -- Binding --------------------------------------------------------------

    /// Probes a claimed device with `candidates`, then with any drivers that
    /// queued up meanwhile, until one binds or none is left.
    ///
    /// Each driver is probed once per matching table entry until a probe
    /// succeeds.
    fn settle(&self, dev: &Arc<PciDevice>, mut candidates: Vec<Arc<dyn PciDriver>>) {
        loop {
            'drivers: for drv in candidates {
                for id in matching_ids(drv.id_table(), *dev.identity(), self.class_match) {
                    {
                        let inner = self.inner.lock();
                        if !inner.has_device(dev) {
                            return;
                        }
                        if !inner.has_driver(&drv) {
                            continue 'drivers;
                        }
                    }

                    if let Err(err) = drv.probe(dev, id) {
                        kdebug!("pci {}: {} probe failed: {}", dev.address(), drv.info(), err);
                        continue;
                    }
                    match self.commit(dev, &drv) {
                        Commit::Bound => {
                            kinfo!("pci {}: bound to {}", dev.address(), drv.info());
                            return;
                        }
                        Commit::DriverGone => {
                            drv.remove(dev);
                            continue 'drivers;
                        }
                        Commit::DeviceGone => {
                            drv.remove(dev);
                            return;
                        }
                    }
                }
            }

            match self.next_candidates(dev) {
                Some(next) => candidates = next,
                None => return,
            }
        }
    }

    fn commit(&self, dev: &Arc<PciDevice>, drv: &Arc<dyn PciDriver>) -> Commit {
        let mut inner = self.inner.lock();
        if !inner.has_driver(drv) {
            return if inner.has_device(dev) {
                Commit::DriverGone
            } else {
                Commit::DeviceGone
            };
        }
        match inner.entry_mut(dev) {
            Some(entry) => {
                entry.binding = Binding::Bound(Arc::clone(drv));
                entry.pending.clear();
                Commit::Bound
            }
            None => Commit::DeviceGone,
        }
    }

    /// Ends the current claim on `dev`. Returns the queued drivers, keeping
    /// the claim, if there are any; otherwise marks the device unbound.
    fn next_candidates(&self, dev: &Arc<PciDevice>) -> Option<Vec<Arc<dyn PciDriver>>> {
        let mut inner = self.inner.lock();
        let entry = inner.entry_mut(dev)?;
        if entry.pending.is_empty() {
            entry.binding = Binding::Unbound;
            return None;
        }
        entry.binding = Binding::Probing;
        Some(mem::take(&mut entry.pending))
    }
}

impl Default for PciRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PciRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PciRegistry")
            .field("class_match", &self.class_match)
            .finish_non_exhaustive()
    }
}
