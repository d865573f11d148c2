//! [`ErgRegistry`] – the set of tracked devices.
//!
//! Shared between the discovery task, the workers and the dispatcher.  The
//! lock is a plain `std` `RwLock` and is never held across an `.await`.
//! Entries keep discovery order.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rowlink_types::{DeviceId, RowError};

use crate::handle::ErgHandle;

struct Entry {
    handle: ErgHandle,
    alias: Option<String>,
}

impl Entry {
    fn name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.handle.id().to_string())
    }
}

/// Tracked ergs, in the order they were discovered.
#[derive(Default)]
pub struct ErgRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ErgRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new device.  Returns `false` (and changes nothing) when a
    /// device with the same identity is already tracked.
    pub fn register(&self, handle: ErgHandle) -> bool {
        let mut entries = self.write();
        if entries.iter().any(|e| e.handle.id() == handle.id()) {
            return false;
        }
        entries.push(Entry {
            handle,
            alias: None,
        });
        true
    }

    /// Stop tracking `id`, returning its handle if it was tracked.
    pub fn unregister(&self, id: &DeviceId) -> Option<ErgHandle> {
        let mut entries = self.write();
        let pos = entries.iter().position(|e| e.handle.id() == id)?;
        Some(entries.remove(pos).handle)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.read().iter().any(|e| e.handle.id() == id)
    }

    pub fn handle(&self, id: &DeviceId) -> Option<ErgHandle> {
        self.read()
            .iter()
            .find(|e| e.handle.id() == id)
            .map(|e| e.handle.clone())
    }

    pub fn handles(&self) -> Vec<ErgHandle> {
        self.read().iter().map(|e| e.handle.clone()).collect()
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.read().iter().map(|e| e.handle.id().clone()).collect()
    }

    /// Display name of every device: its alias, or its identity.
    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(Entry::name).collect()
    }

    pub fn alias(&self, id: &DeviceId) -> Option<String> {
        self.read()
            .iter()
            .find(|e| e.handle.id() == id)
            .and_then(|e| e.alias.clone())
    }

    /// Give `id` a display name.
    ///
    /// # Errors
    ///
    /// [`RowError::NameConflict`] when another tracked device already goes
    /// by `alias`; [`RowError::Disconnected`] when `id` is not tracked.
    pub fn set_alias(&self, id: &DeviceId, alias: &str) -> Result<(), RowError> {
        let mut entries = self.write();
        if entries
            .iter()
            .any(|e| e.handle.id() != id && e.name() == alias)
        {
            return Err(RowError::NameConflict(alias.to_string()));
        }
        let entry = entries
            .iter_mut()
            .find(|e| e.handle.id() == id)
            .ok_or_else(|| RowError::Disconnected {
                device: id.clone(),
                details: "device is not tracked".to_string(),
            })?;
        entry.alias = Some(alias.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
