//! Device registry
//!
//! Attach and detach entry points for the bus glue. The registry allocates
//! the lowest free identifier under its lock, resets the controller once,
//! and publishes the device under `o2scr<id>`.

use crate::config::ControllerConfig;
use crate::device::Device;
use crate::error::{Result, ScrError};
use crate::mmio::RegisterAccess;
use o2scr_chip::pcmcia::MAX_DEVICES;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Attached readers, by identifier
#[derive(Debug)]
pub struct DeviceRegistry<R: RegisterAccess> {
    config: ControllerConfig,
    max_devices: u32,
    devices: Mutex<BTreeMap<u32, Arc<Device<R>>>>,
}

impl<R: RegisterAccess> Default for DeviceRegistry<R> {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl<R: RegisterAccess> DeviceRegistry<R> {
    /// Empty registry applying `config` to every attached device
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_limit(config, MAX_DEVICES)
    }

    /// Empty registry with a custom identifier limit
    pub fn with_limit(config: ControllerConfig, max_devices: u32) -> Self {
        Self {
            config,
            max_devices,
            devices: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, Arc<Device<R>>>> {
        self.devices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Attach a reader whose windows are already mapped
    ///
    /// On failure `regs` is dropped, releasing the windows.
    ///
    /// # Errors
    ///
    /// Returns `ScrError::ResourceExhausted` if every identifier is taken.
    pub fn attach(&self, regs: R) -> Result<Arc<Device<R>>> {
        let mut devices = self.lock();

        let id = (0..self.max_devices)
            .find(|id| !devices.contains_key(id))
            .ok_or_else(|| {
                ScrError::resource_exhausted(format!(
                    "all {} device identifiers in use",
                    self.max_devices
                ))
            })?;

        let device = Arc::new(Device::new(id, regs, self.config.clone()));
        device.open()?.reset()?;

        devices.insert(id, Arc::clone(&device));
        tracing::info!(
            "Attached {} (commands time out after {:?})",
            device.name(),
            self.config.worst_case_wait()
        );
        Ok(device)
    }

    /// Detach a reader
    ///
    /// The identifier becomes free at once. The registers are released when
    /// the last outstanding reference to the device drops.
    pub fn detach(&self, id: u32) -> Option<Arc<Device<R>>> {
        let device = self.lock().remove(&id)?;
        tracing::info!("Detached {}", device.name());
        Some(device)
    }

    /// Look up an attached reader
    pub fn get(&self, id: u32) -> Option<Arc<Device<R>>> {
        self.lock().get(&id).cloned()
    }

    /// Identifiers in use, ascending
    pub fn ids(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    /// Number of attached readers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is attached
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
