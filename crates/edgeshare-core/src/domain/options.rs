//! Option identifiers and option sets.
//!
//! Options tune switching and clipboard behaviour.  Each option is identified
//! by a four-character code packed into a `u32` (`SSWT` = switch delay) so it
//! can be sent verbatim to secondary screens in a `DSOP` message.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

/// A four-character option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionId(pub u32);

const fn code(tag: &[u8; 4]) -> OptionId {
    OptionId(u32::from_be_bytes(*tag))
}

impl OptionId {
    /// Wire protocol tag (0 = Synergy, 1 = Barrier).
    pub const PROTOCOL: OptionId = code(b"PROT");
    /// Keep-alive rate in milliseconds.
    pub const HEARTBEAT: OptionId = code(b"HART");
    /// Corners in which switching is disabled ([`crate::CornerMask`] bits).
    pub const SWITCH_CORNERS: OptionId = code(b"SSCM");
    /// Corner size in pixels.
    pub const SWITCH_CORNER_SIZE: OptionId = code(b"SSCS");
    /// Milliseconds the cursor must rest on an edge before switching.
    pub const SWITCH_DELAY: OptionId = code(b"SSWT");
    /// Window in milliseconds for a double tap on an edge.
    pub const SWITCH_TWO_TAP: OptionId = code(b"SSTT");
    pub const SWITCH_NEEDS_SHIFT: OptionId = code(b"SSNS");
    pub const SWITCH_NEEDS_CONTROL: OptionId = code(b"SSNC");
    pub const SWITCH_NEEDS_ALT: OptionId = code(b"SSNA");
    /// Forward relative motion while the cursor is locked on a secondary.
    pub const RELATIVE_MOVES: OptionId = code(b"MDLT");
    pub const DISABLE_LOCK_TO_SCREEN: OptionId = code(b"DLTS");
    pub const CLIPBOARD_SHARING: OptionId = code(b"CLPS");
    /// Largest clipboard payload to share, in KiB.
    pub const CLIPBOARD_SHARING_SIZE: OptionId = code(b"CLSZ");
    pub const SCREENSAVER_SYNC: OptionId = code(b"SSVR");

    /// The four ASCII bytes of the code.
    pub fn as_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// Default clipboard size limit in KiB.
pub const DEFAULT_CLIPBOARD_SIZE_KB: i32 = 3072;

/// An ordered set of option values.
///
/// Ordering by id keeps the `DSOP` payload deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    values: BTreeMap<OptionId, i32>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: OptionId) -> Option<i32> {
        self.values.get(&id).copied()
    }

    pub fn set(&mut self, id: OptionId, value: i32) {
        self.values.insert(id, value);
    }

    pub fn remove(&mut self, id: OptionId) -> Option<i32> {
        self.values.remove(&id)
    }

    pub fn contains(&self, id: OptionId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterates `(id, value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionId, i32)> + '_ {
        self.values.iter().map(|(id, v)| (*id, *v))
    }

    /// Returns `true` if the option is present and non-zero.
    pub fn flag(&self, id: OptionId) -> bool {
        self.get(id).is_some_and(|v| v != 0)
    }

    /// Flattens the set into the `id, value, id, value, ...` form used by `DSOP`.
    pub fn to_wire(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.values.len() * 2);
        for (id, value) in self.iter() {
            out.push(id.0);
            out.push(value as u32);
        }
        out
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = (&'a OptionId, &'a i32);
    type IntoIter = btree_map::Iter<'a, OptionId, i32>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl FromIterator<(OptionId, i32)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (OptionId, i32)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
