//! Key name tables used by the daemon's diagnostic key lookup.
//!
//! The base table maps key ids (table indices) to canonical lowercase key
//! names. Some boards rearrange or extend the layout; those differences are
//! applied as per-device patches on top of the base table before lookup.

use crate::UsbId;

/// Total number of key ids, including the extended range reserved for
/// device-specific keys. Ids past the base table are free until a patch
/// claims them.
pub const N_KEYS_EXTENDED: usize = 160;

/// Base key name table; index is the key id.
static BASE_KEYS: &[&str] = &[
    "esc", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11",
    "f12", "prtscn", "scroll", "pause", "grave", "1", "2", "3", "4", "5", "6",
    "7", "8", "9", "0", "minus", "equal", "bspace", "tab", "q", "w", "e", "r",
    "t", "y", "u", "i", "o", "p", "lbrace", "rbrace", "bslash", "caps", "a",
    "s", "d", "f", "g", "h", "j", "k", "l", "colon", "quote", "enter",
    "lshift", "z", "x", "c", "v", "b", "n", "m", "comma", "dot", "slash",
    "rshift", "lctrl", "lwin", "lalt", "space", "ralt", "rwin", "rmenu",
    "rctrl", "ins", "home", "pgup", "del", "end", "pgdn", "up", "left",
    "down", "right", "numlock", "numslash", "numstar", "numminus", "numplus",
    "numenter", "num7", "num8", "num9", "num4", "num5", "num6", "num1",
    "num2", "num3", "num0", "numdot", "mute", "volup", "voldn", "stop",
    "prev", "play", "next", "light", "lock", "fn",
];

/// One device's deviations from the base table. An entry of `None` removes
/// the key at that id.
struct KeymapPatch {
    id: UsbId,
    entries: &'static [(usize, Option<&'static str>)],
}

// Boards with macro key banks place them in the extended range; boards
// without a Fn key free that id.
static PATCHES: &[KeymapPatch] = &[
    KeymapPatch {
        id: UsbId::new(0x1b1c, 0x1b2d),
        entries: &[
            (114, Some("g1")),
            (115, Some("g2")),
            (116, Some("g3")),
            (117, Some("g4")),
            (118, Some("g5")),
            (119, Some("g6")),
            (120, Some("mr")),
            (113, None),
        ],
    },
    KeymapPatch {
        id: UsbId::new(0x1b1c, 0x1c11),
        entries: &[(113, None), (107, Some("profswitch"))],
    },
];

/// A key name table with any device-specific patches already applied.
pub struct Keymap {
    keys: Vec<Option<&'static str>>,
}

/// Build the keymap for a device, applying any patches registered for its
/// vendor/product id. An unrecognized id yields the unpatched base table.
pub fn patched(id: UsbId) -> Keymap {
    let mut keys: Vec<Option<&'static str>> = BASE_KEYS.iter().copied().map(Some).collect();
    keys.resize(N_KEYS_EXTENDED, None);
    for patch in PATCHES {
        if patch.id == id {
            for &(idx, name) in patch.entries {
                keys[idx] = name;
            }
        }
    }
    Keymap { keys }
}

impl Keymap {
    /// Case-insensitive name lookup; returns the key id and canonical name.
    pub fn lookup(&self, name: &str) -> Option<(usize, &'static str)> {
        self.keys.iter().enumerate().find_map(|(i, k)| match k {
            Some(n) if n.eq_ignore_ascii_case(name) => Some((i, *n)),
            _ => None,
        })
    }

    /// Id of the first unassigned entry, if any.
    pub fn first_free(&self) -> Option<usize> {
        self.keys.iter().position(|k| k.is_none())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_lookup() {
        let map = patched(UsbId::default());
        assert_eq!(map.lookup("esc"), Some((0, "esc")));
        assert_eq!(map.lookup("ESC"), Some((0, "esc")));
        assert_eq!(map.lookup("enter"), Some((56, "enter")));
    }

    #[test]
    fn test_lookup_miss() {
        let map = patched(UsbId::default());
        assert!(map.lookup("notakey").is_none());
    }

    #[test]
    fn test_lookup_with_unknown_device_id() {
        // Unrecognized ids fall back to the base table
        let map = patched(UsbId::new(0x046d, 0xc21f));
        assert_eq!(map.lookup("esc"), Some((0, "esc")));
    }

    #[test]
    fn test_patch_applied() {
        let map = patched(UsbId::new(0x1b1c, 0x1b2d));
        assert_eq!(map.lookup("g1"), Some((114, "g1")));
        // The patch removes the Fn key on this board
        assert!(map.lookup("fn").is_none());

        let base = patched(UsbId::default());
        assert!(base.lookup("g1").is_none());
        assert!(base.lookup("fn").is_some());
    }

    #[test]
    fn test_first_free_follows_patches() {
        let base = patched(UsbId::default());
        assert_eq!(base.first_free(), Some(BASE_KEYS.len()));

        // Removing the Fn key opens a hole before the extended range
        let map = patched(UsbId::new(0x1b1c, 0x1c11));
        assert_eq!(map.first_free(), Some(113));
    }
}
