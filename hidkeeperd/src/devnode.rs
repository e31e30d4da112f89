//! Root controller device node.
//!
//! The daemon's own filesystem presence: a directory node per slot under
//! the device root, created at startup for the root controller and removed
//! as the final step of shutdown. When a gid is configured, access to the
//! node is restricted to that group; otherwise it is world-readable.

use nix::unistd::{chown, Gid};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default device root; slot nodes live at `<root><slot>`.
pub const DEVICE_ROOT: &str = "/dev/hidkeeper";

/// Filesystem path of one slot's node.
pub fn node_path(base: &Path, slot: usize) -> PathBuf {
    PathBuf::from(format!("{}{}", base.display(), slot))
}

/// Create a slot's node directory and its version file, applying the
/// configured group restriction.
pub fn create_root(base: &Path, slot: usize, gid: Option<u32>) -> io::Result<PathBuf> {
    let path = node_path(base, slot);
    fs::create_dir_all(&path)?;
    fs::write(path.join("version"), concat!(env!("CARGO_PKG_VERSION"), "\n"))?;

    let mut perms = fs::metadata(&path)?.permissions();
    if let Some(gid) = gid {
        perms.set_mode(0o750);
        fs::set_permissions(&path, perms)?;
        chown(&path, None, Some(Gid::from_raw(gid))).map_err(io::Error::from)?;
    } else {
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }
    Ok(path)
}

/// Remove a slot's node directory. Missing nodes are not an error.
pub fn remove_root(base: &Path, slot: usize) -> io::Result<()> {
    let path = node_path(base, slot);
    if path.exists() {
        fs::remove_dir_all(&path)?;
        debug!("Removed device node {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_remove_root_node() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("hidkeeper");

        let path = create_root(&base, 0, None).unwrap();
        assert_eq!(path, dir.path().join("hidkeeper0"));
        assert!(path.is_dir());

        let version = fs::read_to_string(path.join("version")).unwrap();
        assert_eq!(version.trim(), env!("CARGO_PKG_VERSION"));

        remove_root(&base, 0).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_missing_node_is_ok() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("hidkeeper");
        assert!(remove_root(&base, 0).is_ok());
    }

    #[test]
    fn test_node_path_appends_slot() {
        assert_eq!(
            node_path(Path::new("/dev/hidkeeper"), 3),
            PathBuf::from("/dev/hidkeeper3")
        );
    }
}
