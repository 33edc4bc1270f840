//! # SX127x Device Manager
//!
//! This module provides the Sx127xDeviceManager struct, a keyed registry of
//! attached radios. Devices are registered under a caller-chosen identifier
//! and resolved by key, so consumers never walk a device list. One
//! registry-wide lock serializes registration, lookup and removal; it is
//! never held across register I/O, which stays under each device's own lock.

use crate::error::Sx127xError;
use crate::sx127x::device::Sx127x;
use crate::sx127x::hal::Hal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keyed registry of attached SX127x devices sharing one bus type.
pub struct Sx127xDeviceManager<B: Hal> {
    devices: Mutex<HashMap<String, Arc<Sx127x<B>>>>,
}

impl<B: Hal> Default for Sx127xDeviceManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Hal> Sx127xDeviceManager<B> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a radio on `bus` and registers it under `id`.
    pub fn attach_device(
        &self,
        id: &str,
        bus: B,
        fosc: u64,
    ) -> Result<Arc<Sx127x<B>>, Sx127xError> {
        let mut devices = self.devices.lock().unwrap();
        if devices.contains_key(id) {
            return Err(Sx127xError::InvalidArgument(format!(
                "device id {id:?} already registered"
            )));
        }
        let device = Sx127x::attach(bus, fosc)?;
        devices.insert(id.to_string(), Arc::clone(&device));
        log::info!("registered device {id}");
        Ok(device)
    }

    /// Registers an already-attached device under `id`.
    pub fn insert(&self, id: &str, device: Arc<Sx127x<B>>) -> Result<(), Sx127xError> {
        let mut devices = self.devices.lock().unwrap();
        if devices.contains_key(id) {
            return Err(Sx127xError::InvalidArgument(format!(
                "device id {id:?} already registered"
            )));
        }
        devices.insert(id.to_string(), device);
        Ok(())
    }

    /// Resolves a device by its identifier.
    pub fn get(&self, id: &str) -> Option<Arc<Sx127x<B>>> {
        self.devices.lock().unwrap().get(id).cloned()
    }

    /// Removes a device from the registry, returning its handle so callers
    /// can finish tearing it down.
    pub fn detach_device(&self, id: &str) -> Option<Arc<Sx127x<B>>> {
        let removed = self.devices.lock().unwrap().remove(id);
        if removed.is_some() {
            log::info!("detached device {id}");
        }
        removed
    }

    /// Identifiers of all registered devices.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}
