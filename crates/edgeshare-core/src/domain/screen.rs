//! Screen identity and geometry.
//!
//! A screen is known by a case-insensitive [`ScreenName`] and occupies a
//! rectangle ([`ScreenShape`]) in its own coordinate space.  Switching between
//! screens happens across one of the four [`Direction`]s.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ── ScreenName ────────────────────────────────────────────────────────────────

/// Case-insensitive screen name.
///
/// The original spelling is kept for display and logging, but two names that
/// differ only in ASCII case compare (and hash) equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenName(String);

impl ScreenName {
    /// Wraps `name` without validating it.  Use [`ScreenName::is_valid`] to check.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as originally spelled.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name is non-empty and only uses `[A-Za-z0-9._-]`.
    ///
    /// These are the characters a hostname-like screen name may contain.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    }
}

impl PartialEq for ScreenName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ScreenName {}

impl Hash for ScreenName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_u8(0xFF);
    }
}

impl PartialOrd for ScreenName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScreenName {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let b = other.0.bytes().map(|b| b.to_ascii_lowercase());
        a.cmp(b)
    }
}

impl fmt::Display for ScreenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScreenName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScreenName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ── Direction ─────────────────────────────────────────────────────────────────

/// One of the four sides of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
}

impl Direction {
    /// All four directions in a stable order.
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Top,
        Direction::Bottom,
    ];

    /// Returns the side facing this one (Left ↔ Right, Top ↔ Bottom).
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
        }
    }

    /// Returns `true` for Left and Right.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    /// Bit used for this side in a "sides with neighbors" mask.
    pub fn mask(self) -> u32 {
        match self {
            Direction::Left => 1 << 0,
            Direction::Right => 1 << 1,
            Direction::Top => 1 << 2,
            Direction::Bottom => 1 << 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Top => "top",
            Direction::Bottom => "bottom",
        };
        f.write_str(s)
    }
}

// ── ScreenShape ───────────────────────────────────────────────────────────────

/// A screen rectangle in that screen's own coordinate space.
///
/// `x`/`y` is the top-left corner; a multi-monitor desktop may start at
/// negative coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenShape {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenShape {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rightmost X coordinate (exclusive).
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Returns `true` if the shape has a positive area.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// The pixel at the middle of the shape.
    pub fn center(&self) -> (i32, i32) {
        (self.x + (self.width >> 1), self.y + (self.height >> 1))
    }

    /// Returns which corner, if any, `(x, y)` sits in.
    ///
    /// A point is in a corner when it touches one edge and lies within `size`
    /// pixels of the perpendicular edge.
    pub fn corner_at(&self, x: i32, y: i32, size: i32) -> CornerMask {
        let x_side = if x <= self.x {
            -1
        } else if x >= self.right() - 1 {
            1
        } else {
            0
        };
        let y_side = if y <= self.y {
            -1
        } else if y >= self.bottom() - 1 {
            1
        } else {
            0
        };

        if x_side != 0 {
            if y < self.y + size {
                return if x_side < 0 { CornerMask::TOP_LEFT } else { CornerMask::TOP_RIGHT };
            } else if y >= self.bottom() - size {
                return if x_side < 0 {
                    CornerMask::BOTTOM_LEFT
                } else {
                    CornerMask::BOTTOM_RIGHT
                };
            }
        }

        if y_side != 0 {
            if x < self.x + size {
                return if y_side < 0 { CornerMask::TOP_LEFT } else { CornerMask::BOTTOM_LEFT };
            } else if x >= self.right() - size {
                return if y_side < 0 {
                    CornerMask::TOP_RIGHT
                } else {
                    CornerMask::BOTTOM_RIGHT
                };
            }
        }

        CornerMask::NONE
    }
}

// ── Bitmasks ──────────────────────────────────────────────────────────────────

/// Keyboard modifier and toggle state as sent in `CINN` and key messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ModifierMask(pub u16);

impl ModifierMask {
    pub const SHIFT: u16 = 0x0001;
    pub const CONTROL: u16 = 0x0002;
    pub const ALT: u16 = 0x0004;
    pub const META: u16 = 0x0008;
    pub const SUPER: u16 = 0x0010;
    pub const ALT_GR: u16 = 0x0020;
    pub const CAPS_LOCK: u16 = 0x1000;
    pub const NUM_LOCK: u16 = 0x2000;
    pub const SCROLL_LOCK: u16 = 0x4000;

    /// Returns `true` if every bit in `bits` is set.
    pub fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

/// Set of screen corners in which switching is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CornerMask(pub u32);

impl CornerMask {
    pub const NONE: CornerMask = CornerMask(0);
    pub const TOP_LEFT: CornerMask = CornerMask(1 << 0);
    pub const TOP_RIGHT: CornerMask = CornerMask(1 << 1);
    pub const BOTTOM_LEFT: CornerMask = CornerMask(1 << 2);
    pub const BOTTOM_RIGHT: CornerMask = CornerMask(1 << 3);
    pub const ALL: CornerMask = CornerMask(0x0F);

    /// Returns `true` if the two masks share any corner.
    pub fn intersects(self, other: CornerMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Parses a corner name such as `top-left`, `left` (both left corners) or `all`.
    pub fn from_name(name: &str) -> Option<CornerMask> {
        let mask = match name.to_ascii_lowercase().as_str() {
            "none" => Self::NONE,
            "top-left" => Self::TOP_LEFT,
            "top-right" => Self::TOP_RIGHT,
            "bottom-left" => Self::BOTTOM_LEFT,
            "bottom-right" => Self::BOTTOM_RIGHT,
            "left" => Self::TOP_LEFT | Self::BOTTOM_LEFT,
            "right" => Self::TOP_RIGHT | Self::BOTTOM_RIGHT,
            "top" => Self::TOP_LEFT | Self::TOP_RIGHT,
            "bottom" => Self::BOTTOM_LEFT | Self::BOTTOM_RIGHT,
            "all" => Self::ALL,
            _ => return None,
        };
        Some(mask)
    }
}

impl std::ops::BitOr for CornerMask {
    type Output = CornerMask;

    fn bitor(self, rhs: CornerMask) -> CornerMask {
        CornerMask(self.0 | rhs.0)
    }
}

// ── Clipboard slots ───────────────────────────────────────────────────────────

/// The fixed clipboard channels shared between screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClipboardSlot {
    /// The regular copy/paste clipboard.
    Clipboard = 0,
    /// The X11-style primary selection.
    Selection = 1,
}

impl ClipboardSlot {
    pub const ALL: [ClipboardSlot; 2] = [ClipboardSlot::Clipboard, ClipboardSlot::Selection];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for ClipboardSlot {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ClipboardSlot::Clipboard),
            1 => Ok(ClipboardSlot::Selection),
            _ => Err(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
