//! Fixed-capacity device table.
//!
//! The table is the root of truth for which devices exist and their
//! connection status. It holds `DEV_MAX` slots for the lifetime of the
//! process; slots are never resized or moved. Slot 0 is reserved for the
//! root controller pseudo-device representing the daemon itself.
//!
//! Each slot carries its own lock. Status and handle may only be touched
//! while holding that slot's lock; there is no table-wide lock, so two
//! threads may work on different slots without coordination.

use crate::transport::TransportHandle;
use hidkeeper_common::{DeviceInfo, DeviceStatus, DEV_MAX};
use std::sync::{Mutex, MutexGuard};

/// Index of the root controller pseudo-device.
pub const ROOT_SLOT: usize = 0;

/// One device slot. The transport handle is owned by the transport
/// subsystem; the table only gates access to it.
#[derive(Default)]
pub struct DeviceRecord {
    pub status: DeviceStatus,
    pub handle: Option<TransportHandle>,
    pub info: Option<DeviceInfo>,
}

/// Fixed arena of independently lockable device slots.
pub struct DeviceTable {
    slots: [Mutex<DeviceRecord>; DEV_MAX],
}

impl DeviceTable {
    /// Create a table with every slot zeroed to `Unused`.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(DeviceRecord::default())),
        }
    }

    /// Lock one slot. Panics on out-of-range index; slot indices come from
    /// iteration over `0..DEV_MAX` and are stable for the process lifetime.
    pub fn lock(&self, slot: usize) -> MutexGuard<'_, DeviceRecord> {
        self.slots[slot].lock().unwrap()
    }

    /// Read a slot's status under its lock.
    pub fn status(&self, slot: usize) -> DeviceStatus {
        self.lock(slot).status
    }

    /// Write a slot's status under its lock.
    pub fn set_status(&self, slot: usize, status: DeviceStatus) {
        self.lock(slot).status = status;
    }

    /// Number of non-root slots currently in an active state.
    pub fn active_count(&self) -> usize {
        (1..DEV_MAX).filter(|&i| self.status(i).is_active()).count()
    }

    pub const fn len(&self) -> usize {
        DEV_MAX
    }

    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_all_unused() {
        let table = DeviceTable::new();
        for i in 0..DEV_MAX {
            assert_eq!(table.status(i), DeviceStatus::Unused);
        }
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn test_status_transitions() {
        let table = DeviceTable::new();
        table.set_status(3, DeviceStatus::Connecting);
        assert_eq!(table.status(3), DeviceStatus::Connecting);
        table.set_status(3, DeviceStatus::Connected);
        assert_eq!(table.status(3), DeviceStatus::Connected);
        assert_eq!(table.active_count(), 1);
        table.set_status(3, DeviceStatus::Unused);
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn test_root_slot_excluded_from_active_count() {
        let table = DeviceTable::new();
        table.set_status(ROOT_SLOT, DeviceStatus::Connected);
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn test_concurrent_status_writes_are_not_torn() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(DeviceTable::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let status = if t % 2 == 0 {
                        DeviceStatus::Connected
                    } else {
                        DeviceStatus::Unused
                    };
                    table.set_status(5, status);
                    // Any observed value must be one of the written states
                    let seen = table.status(5);
                    assert!(seen == DeviceStatus::Connected || seen == DeviceStatus::Unused);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
