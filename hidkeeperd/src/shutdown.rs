//! Two-phase device teardown.
//!
//! Runs in ordinary thread context, reached either from the deferred
//! signal consumer or from normal run-loop fall-through. Devices can have
//! parent/child relationships (a wireless receiver exposing child
//! devices), so every active slot is reverted to the stock protocol before
//! any slot's resources are released; closing a parent first could orphan
//! a child mid-transition. Only one slot lock is ever held at a time,
//! which keeps teardown deadlock-free against the event threads that also
//! lock one slot at a time.

use crate::devnode;
use crate::devtable::ROOT_SLOT;
use crate::DaemonCtx;
use hidkeeper_common::DEV_MAX;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Tear down every active device, remove the root controller node and shut
/// the transport subsystem down. Safe to request more than once: only the
/// first caller runs the sequence, later callers are logged and dropped.
pub fn run(ctx: &DaemonCtx) {
    if ctx.shutdown_started.swap(true, Ordering::SeqCst) {
        warn!("Shutdown already in progress, ignoring duplicate request");
        return;
    }

    // Abort any USB resets in progress
    ctx.transport.cancel_reset();

    // Pass 1: put every active device back into stock protocol so the
    // stock driver can still talk to it once released.
    for slot in 1..DEV_MAX {
        let mut record = ctx.table.lock(slot);
        if record.status.is_active() {
            if let Err(e) = ctx.transport.revert(slot, &mut record) {
                warn!("Failed to revert device {}: {}", slot, e);
            }
        }
    }

    // Pass 2: release resources. Separate loop so devices with children
    // are not removed before the children have been set back to idle.
    for slot in 1..DEV_MAX {
        let mut record = ctx.table.lock(slot);
        if record.status.is_active() {
            if let Err(e) = ctx.transport.close(slot, &mut record) {
                warn!("Failed to close device {}: {}", slot, e);
            }
        }
    }

    info!("Closing root controller");
    if let Err(e) = devnode::remove_root(&ctx.config.devroot, ROOT_SLOT) {
        warn!("Failed to remove root controller node: {}", e);
    }
    ctx.transport.shutdown_global();
}
