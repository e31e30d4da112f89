//! Hidkeeper Daemon Library
//!
//! This library provides the core lifecycle of the hidkeeper daemon:
//! - Fixed-capacity device table with per-slot locking
//! - Signal-safe shutdown relay and two-phase device teardown
//! - Single-instance enforcement and root device node management
//! - Command-line configuration

use hidkeeper_common::DaemonError;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod devnode;
pub mod devtable;
pub mod pidfile;
pub mod shutdown;
pub mod signals;
pub mod transport;

// Re-export common types
pub use hidkeeper_common::{DeviceInfo, DeviceStatus, UsbId, DEV_MAX};

/// Startup invariants that must hold before any device state is created:
/// exactly one instance, and root privileges unless explicitly overridden.
/// Failing either aborts the process with nothing to tear down.
pub fn preflight(config: &config::DaemonConfig, pid_path: &Path) -> Result<(), DaemonError> {
    if let Some(pid) = pidfile::check_running(pid_path) {
        return Err(DaemonError::AlreadyRunning(pid));
    }
    if config.force_root && !nix::unistd::getuid().is_root() {
        return Err(DaemonError::InsufficientPrivileges);
    }
    Ok(())
}

/// Shared state of a running daemon: the device table, the immutable
/// startup configuration, and the transport subsystem behind its trait
/// boundary.
pub struct DaemonCtx {
    pub table: devtable::DeviceTable,
    pub config: config::DaemonConfig,
    pub transport: Arc<dyn transport::Transport>,
    /// Set by the first teardown entry; later entries are logged and dropped.
    pub shutdown_started: AtomicBool,
}

impl DaemonCtx {
    pub fn new(config: config::DaemonConfig, transport: Arc<dyn transport::Transport>) -> Self {
        Self {
            table: devtable::DeviceTable::new(),
            config,
            transport,
            shutdown_started: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_preflight_rejects_running_instance() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("daemon.pid");
        fs::write(&pid_path, format!("{}\n", std::process::id())).unwrap();

        let config = config::DaemonConfig {
            force_root: false,
            ..config::DaemonConfig::default()
        };
        match preflight(&config, &pid_path) {
            Err(DaemonError::AlreadyRunning(pid)) => {
                assert_eq!(pid, std::process::id() as i32);
            }
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
    }

    #[test]
    fn test_preflight_privilege_check() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("daemon.pid");

        // With the override, uid never matters
        let relaxed = config::DaemonConfig {
            force_root: false,
            ..config::DaemonConfig::default()
        };
        assert!(preflight(&relaxed, &pid_path).is_ok());

        let strict = config::DaemonConfig::default();
        let result = preflight(&strict, &pid_path);
        if nix::unistd::getuid().is_root() {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(DaemonError::InsufficientPrivileges)));
        }
    }
}
