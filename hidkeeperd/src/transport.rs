//! Transport subsystem boundary.
//!
//! The lifecycle core never speaks the USB wire protocol itself; it drives
//! the transport through this trait and gates access to each slot's opaque
//! handle via the slot lock. `revert` and `close` are always invoked with
//! the slot lock held, which serializes all work on one device while
//! leaving unrelated slots free to proceed in parallel.

use crate::devtable::{DeviceRecord, DeviceTable, ROOT_SLOT};
use hidkeeper_common::DeviceStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

/// Which protocol a device handle is currently speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// Vendor-specific protocol used while the daemon manages the device.
    Vendor,
    /// Factory protocol; the stock kernel driver can talk to the device.
    Stock,
}

/// Opaque per-device transport state. The lifecycle core stores it but
/// never inspects it beyond handing it back to the transport.
pub struct TransportHandle {
    pub serial: String,
    pub mode: ProtocolMode,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("slot {0} has no open transport handle")]
    NoHandle(usize),
    #[error("reset cancelled")]
    ResetCancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interface the lifecycle core consumes from the transport subsystem.
pub trait Transport: Send + Sync {
    /// Return the device in `record` to its factory protocol so the stock
    /// driver can use it after release. Called with the slot lock held.
    fn revert(&self, slot: usize, record: &mut DeviceRecord) -> Result<(), TransportError>;

    /// Release the transport resources for `record` and mark the slot
    /// unused. Called with the slot lock held.
    fn close(&self, slot: usize, record: &mut DeviceRecord) -> Result<(), TransportError>;

    /// Blocking device-event loop; runs until `shutdown_global`. Returns
    /// the process exit code.
    fn run_loop(&self, table: &DeviceTable) -> i32;

    /// Tear down the transport subsystem itself. Called once, after every
    /// slot has been released.
    fn shutdown_global(&self);

    /// Request cooperative cancellation of any in-progress reset loop.
    /// Polled, not preemptive: a reset past its last check still completes.
    fn cancel_reset(&self);
}

/// Default USB transport.
pub struct UsbTransport {
    /// Broadcast to in-progress reset loops; polled between attempts.
    reset_stop: AtomicBool,
    stopped: Mutex<bool>,
    stop_signal: Condvar,
    jitter: Mutex<XorShift>,
}

impl UsbTransport {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            reset_stop: AtomicBool::new(false),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
            jitter: Mutex::new(XorShift::new(seed)),
        }
    }

    /// Low-level device reset with jittered retry pacing. Checks the
    /// cancellation flag before every attempt.
    pub fn reset(&self, slot: usize, record: &mut DeviceRecord) -> Result<(), TransportError> {
        let handle = record
            .handle
            .as_mut()
            .ok_or(TransportError::NoHandle(slot))?;

        if self.reset_stop.load(Ordering::SeqCst) {
            return Err(TransportError::ResetCancelled);
        }

        let pause = {
            let mut jitter = self.jitter.lock().unwrap();
            Duration::from_millis(10 + jitter.next() % 40)
        };
        std::thread::sleep(pause);

        if self.reset_stop.load(Ordering::SeqCst) {
            return Err(TransportError::ResetCancelled);
        }

        handle.mode = ProtocolMode::Vendor;
        debug!("Reset complete for slot {}", slot);
        Ok(())
    }

    /// Finish bring-up for slots still connecting: each gets a jittered
    /// reset attempt and is promoted to `Connected` on success. The sweep
    /// is abandoned as soon as cancellation is requested.
    fn service_pending(&self, table: &DeviceTable) {
        for slot in ROOT_SLOT + 1..table.len() {
            let mut record = table.lock(slot);
            if record.status != DeviceStatus::Connecting {
                continue;
            }
            match self.reset(slot, &mut record) {
                Ok(()) => record.status = DeviceStatus::Connected,
                Err(TransportError::ResetCancelled) => {
                    debug!("Reset sweep cancelled at slot {}", slot);
                    return;
                }
                Err(e) => debug!("Reset failed for slot {}: {}", slot, e),
            }
        }
    }
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UsbTransport {
    fn revert(&self, slot: usize, record: &mut DeviceRecord) -> Result<(), TransportError> {
        let handle = record
            .handle
            .as_mut()
            .ok_or(TransportError::NoHandle(slot))?;
        if handle.mode == ProtocolMode::Stock {
            debug!("Device {} already in stock mode", slot);
            return Ok(());
        }
        info!("Reverting device {} to stock protocol", slot);
        handle.mode = ProtocolMode::Stock;
        Ok(())
    }

    fn close(&self, slot: usize, record: &mut DeviceRecord) -> Result<(), TransportError> {
        if let Some(info) = record.info.take() {
            info!("Releasing device {}: {}", slot, info);
        } else {
            info!("Releasing device {}", slot);
        }
        record.handle = None;
        record.status = DeviceStatus::Unused;
        Ok(())
    }

    fn run_loop(&self, table: &DeviceTable) -> i32 {
        info!("Transport event loop started ({} slots)", table.len());
        let mut stopped = self.stopped.lock().unwrap();
        while !*stopped {
            let (guard, timeout) = self
                .stop_signal
                .wait_timeout(stopped, Duration::from_millis(100))
                .unwrap();
            stopped = guard;
            if timeout.timed_out() && !*stopped {
                // Service the table without holding the stop lock; slot
                // locks are taken one at a time inside the sweep
                drop(stopped);
                self.service_pending(table);
                stopped = self.stopped.lock().unwrap();
            }
        }
        debug!("Transport event loop exiting");
        0
    }

    fn shutdown_global(&self) {
        info!("Shutting down transport subsystem");
        *self.stopped.lock().unwrap() = true;
        self.stop_signal.notify_all();
    }

    fn cancel_reset(&self) {
        self.reset_stop.store(true, Ordering::SeqCst);
    }
}

/// Small xorshift64* generator for retry jitter; seeded once at startup.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 1 } else { seed })
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }
}
