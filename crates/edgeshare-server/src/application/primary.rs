//! The local ("primary") screen as seen by the server.
//!
//! The server does not capture or inject input itself.  A platform backend
//! implements [`PrimaryScreen`] so the server can hide or show the local
//! cursor, read and write the local clipboard, and learn the screen shape.
//! The same backend reports what the user does as [`PrimaryInput`] events.
//!
//! Infrastructure adapters live in `crate::infrastructure::primary`.

use edgeshare_core::{ClipboardSlot, ScreenShape};

/// Operations the server needs from the local screen.
///
/// Implementations must be cheap: every method is called from the server's
/// event loop.
#[cfg_attr(test, mockall::automock)]
pub trait PrimaryScreen: Send {
    /// The local desktop rectangle.
    fn shape(&self) -> ScreenShape;

    /// Current position of the local cursor.
    fn cursor_pos(&self) -> (i32, i32);

    /// Where the cursor is parked while another screen is active.
    fn cursor_center(&self) -> (i32, i32);

    /// Width in pixels of the band along each linked edge that triggers a switch.
    fn jump_zone_size(&self) -> i32;

    /// Returns `true` if the local desktop wants the cursor kept here
    /// (e.g. a mouse button or a lock key is held).
    fn is_locked_to_screen(&self) -> bool;

    /// Modifier keys currently held, as [`edgeshare_core::ModifierMask`] bits.
    fn toggle_mask(&self) -> u16;

    /// Focus returns to the local screen at `(x, y)`.
    fn enter(&mut self, x: i32, y: i32, seq: u32, for_screensaver: bool);

    /// Focus is about to leave the local screen.  Returns `false` to veto.
    fn leave(&mut self) -> bool;

    /// Tells the backend on which sides a neighbour exists
    /// ([`edgeshare_core::Direction::mask`] bits).
    fn reconfigure(&mut self, active_sides: u32);

    fn warp_cursor(&mut self, x: i32, y: i32);

    /// Reads the local clipboard for `slot`.
    fn clipboard(&self, slot: ClipboardSlot) -> Vec<u8>;

    /// Replaces the local clipboard for `slot`.
    fn set_clipboard(&mut self, slot: ClipboardSlot, data: &[u8]);

    /// Another screen took ownership of `slot`.
    fn grab_clipboard(&mut self, slot: ClipboardSlot);

    fn screensaver(&mut self, activate: bool);
}

/// Input and desktop events reported by the primary screen backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryInput {
    KeyDown { key: u16, mask: u16, button: u16 },
    KeyUp { key: u16, mask: u16, button: u16 },
    KeyRepeat {
        key: u16,
        mask: u16,
        count: u16,
        button: u16,
    },
    MouseDown { button: u8 },
    MouseUp { button: u8 },
    /// Absolute motion while the primary is active.
    MotionOnPrimary { x: i32, y: i32 },
    /// Relative motion while a secondary is active.
    MotionOnSecondary { dx: i32, dy: i32 },
    Wheel { dx: i32, dy: i32 },
    /// The local user copied something; `seq` orders this grab.
    ClipboardGrabbed { slot: ClipboardSlot, seq: u32 },
    /// The local clipboard contents changed.
    ClipboardChanged { slot: ClipboardSlot, seq: u32 },
    ScreenSaver { activated: bool },
    /// The local desktop resized.
    ShapeChanged,
}
