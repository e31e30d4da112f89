//! Single-instance enforcement via pidfile.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Default pidfile location.
pub const PID_PATH: &str = "/run/hidkeeperd.pid";

/// PID of a live instance recorded at `path`, if any. A missing,
/// unparseable or stale pidfile means no instance is running.
pub fn check_running(path: &Path) -> Option<i32> {
    let contents = fs::read_to_string(path).ok()?;
    let pid = contents.trim().parse::<i32>().ok()?;
    if pid <= 0 {
        return None;
    }
    // kill with a null signal probes for existence without delivering
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => Some(pid),
        Err(_) => {
            debug!("Stale pidfile for PID {}", pid);
            None
        }
    }
}

/// Record this process in the pidfile.
pub fn write_pid(path: &Path) -> io::Result<()> {
    fs::write(path, format!("{}\n", std::process::id()))
}

/// Best-effort pidfile removal at exit.
pub fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("Unable to remove pidfile {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_own_pid_is_detected_as_running() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        assert_eq!(check_running(&path), Some(std::process::id() as i32));
    }

    #[test]
    fn test_stale_pid_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        // Beyond any realistic pid_max, so the liveness probe fails
        fs::write(&path, format!("{}\n", i32::MAX)).unwrap();
        assert_eq!(check_running(&path), None);
    }

    #[test]
    fn test_missing_or_garbage_pidfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        assert_eq!(check_running(&path), None);
        fs::write(&path, "not a pid\n").unwrap();
        assert_eq!(check_running(&path), None);
        fs::write(&path, "-4\n").unwrap();
        assert_eq!(check_running(&path), None);
    }

    #[test]
    fn test_write_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        write_pid(&path).unwrap();
        assert!(path.exists());
        remove(&path);
        assert!(!path.exists());
        // Removing again is harmless
        remove(&path);
    }
}
