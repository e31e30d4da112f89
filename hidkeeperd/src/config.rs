//! Command-line configuration.
//!
//! Everything here is decided once during startup and immutable afterwards:
//! the feature bitset, the ignored-device list, the device node group and
//! the privilege override. No subsystem may mutate configuration after the
//! daemon enters its run loop.

use crate::devnode;
use hidkeeper_common::{UsbId, DEV_MAX};
use std::path::PathBuf;
use tracing::info;

/// Process-wide feature bitset, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features(u32);

impl Features {
    /// Key rebinding and macros.
    pub const BIND: u32 = 1 << 0;
    /// Key monitoring / notification delivery.
    pub const NOTIFY: u32 = 1 << 1;
    /// Mouse acceleration emulation (only meaningful on macOS).
    pub const MOUSE_ACCEL: u32 = 1 << 2;

    pub fn all() -> Self {
        Self(Self::BIND | Self::NOTIFY | Self::MOUSE_ACCEL)
    }

    pub fn has(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    fn clear(&mut self, mask: u32) {
        self.0 &= !mask;
    }
}

/// Append-only list of vendor/product ids whose devices are left unmanaged.
///
/// Fixed capacity of `DEV_MAX` entries; the all-zero id marks a free slot
/// and terminates the effective list.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreList {
    entries: [UsbId; DEV_MAX],
}

impl IgnoreList {
    /// Append into the first free slot. Returns false when the list is full
    /// or the id is the reserved all-zero pair.
    pub fn push(&mut self, id: UsbId) -> bool {
        if id.is_empty() {
            return false;
        }
        for entry in self.entries.iter_mut() {
            if entry.is_empty() {
                *entry = id;
                return true;
            }
        }
        false
    }

    pub fn contains(&self, id: UsbId) -> bool {
        for entry in &self.entries {
            if entry.is_empty() {
                return false;
            }
            if *entry == id {
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.iter().take_while(|e| !e.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable daemon configuration assembled from the command line.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub features: Features,
    pub ignore: IgnoreList,
    /// Restrict device node access to this group id.
    pub gid: Option<u32>,
    /// Refuse to run without root privileges.
    pub force_root: bool,
    pub experimental: bool,
    /// Base path for device nodes; slot nodes live at `<devroot><slot>`.
    pub devroot: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            features: Features::all(),
            ignore: IgnoreList::default(),
            gid: None,
            force_root: true,
            experimental: false,
            devroot: PathBuf::from(devnode::DEVICE_ROOT),
        }
    }
}

/// What the command line asks the process to do.
#[derive(Debug)]
pub enum CliAction {
    Run(Box<DaemonConfig>),
    Help,
    Version,
    /// Diagnostic keymap lookup; prints the match and exits.
    Search { id: UsbId, name: String },
}

/// Parse command-line arguments (without the program name).
///
/// `--help` and `--version` win no matter where they appear; unknown
/// options are ignored.
pub fn parse_args<I>(args: I) -> CliAction
where
    I: IntoIterator<Item = String>,
{
    let args: Vec<String> = args.into_iter().collect();

    for arg in &args {
        if arg == "--help" {
            return CliAction::Help;
        } else if arg == "--version" {
            return CliAction::Version;
        }
    }

    let mut config = DaemonConfig::default();
    for arg in &args {
        if let Some(gid) = arg.strip_prefix("--gid=") {
            if let Ok(gid) = gid.parse::<u32>() {
                config.gid = Some(gid);
                info!("Setting device node gid: {}", gid);
            }
        } else if arg == "--nobind" {
            config
                .features
                .clear(Features::BIND | Features::NOTIFY);
            info!("Key binding and key notifications are disabled");
        } else if arg == "--nonotify" {
            config.features.clear(Features::NOTIFY);
            info!("Key notifications are disabled");
        } else if arg == "--nonroot" {
            config.force_root = false;
        } else if let Some(pair) = arg.strip_prefix("--ignore=") {
            if let Some(id) = UsbId::parse(pair) {
                config.ignore.push(id);
            }
        } else if let Some(term) = arg.strip_prefix("--search=") {
            let (id, name) = parse_search(term);
            return CliAction::Search { id, name };
        } else if arg == "--enable-experimental" {
            config.experimental = true;
            info!("Support for experimental devices is enabled");
        } else if cfg!(target_os = "macos") && arg == "--nomouseaccel" {
            config.features.clear(Features::MOUSE_ACCEL);
            info!("Mouse acceleration disabled");
        }
    }

    CliAction::Run(Box::new(config))
}

/// Split a search term of the form `[vid:pid/]name`. A bare `vid:pid` with
/// no name searches for the first unassigned key id on that device.
fn parse_search(term: &str) -> (UsbId, String) {
    if let Some((prefix, rest)) = term.split_once('/') {
        if let Some(id) = UsbId::parse(prefix) {
            return (id, rest.to_string());
        }
    }
    if let Some(id) = UsbId::parse(term) {
        return (id, String::new());
    }
    (UsbId::default(), term.to_string())
}
