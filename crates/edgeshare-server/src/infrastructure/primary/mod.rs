//! Primary-screen backends.
//!
//! The primary screen is the machine whose keyboard and mouse are shared.  A
//! real backend hooks the OS input stack; this module provides the backends
//! that need no OS support:
//!
//! - [`HeadlessPrimary`] – an in-memory desktop of a configured size, used
//!   when the server runs without a local display.  Focus changes only come
//!   from console commands.
//! - [`mock::RecordingPrimaryScreen`] – records every call so tests can
//!   assert on them.

use edgeshare_core::{ClipboardSlot, ScreenShape};
use tracing::{debug, info};

use crate::application::primary::PrimaryScreen;

pub mod mock;

/// An in-memory primary screen with no real input devices.
#[derive(Debug, Clone)]
pub struct HeadlessPrimary {
    shape: ScreenShape,
    jump_zone: i32,
    cursor: (i32, i32),
    active: bool,
    active_sides: u32,
    clipboards: [Vec<u8>; 2],
    screensaver: bool,
}

impl HeadlessPrimary {
    /// Creates a headless desktop with the cursor at its center.
    pub fn new(shape: ScreenShape, jump_zone: i32) -> Self {
        Self {
            shape,
            jump_zone: jump_zone.max(0),
            cursor: shape.center(),
            active: true,
            active_sides: 0,
            clipboards: [Vec::new(), Vec::new()],
            screensaver: false,
        }
    }

    /// Returns `true` while this screen has focus.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sides last reported as leading to another screen.
    pub fn active_sides(&self) -> u32 {
        self.active_sides
    }

    pub fn is_screensaver_active(&self) -> bool {
        self.screensaver
    }
}

impl PrimaryScreen for HeadlessPrimary {
    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn cursor_pos(&self) -> (i32, i32) {
        self.cursor
    }

    fn cursor_center(&self) -> (i32, i32) {
        self.shape.center()
    }

    fn jump_zone_size(&self) -> i32 {
        self.jump_zone
    }

    fn is_locked_to_screen(&self) -> bool {
        false
    }

    fn toggle_mask(&self) -> u16 {
        0
    }

    fn enter(&mut self, x: i32, y: i32, seq: u32, for_screensaver: bool) {
        info!(x, y, seq, "entering primary");
        self.active = true;
        if !for_screensaver {
            self.cursor = (x, y);
        }
    }

    fn leave(&mut self) -> bool {
        info!("leaving primary");
        self.active = false;
        true
    }

    fn reconfigure(&mut self, active_sides: u32) {
        debug!(active_sides, "primary sides");
        self.active_sides = active_sides;
    }

    fn warp_cursor(&mut self, x: i32, y: i32) {
        self.cursor = (x, y);
    }

    fn clipboard(&self, slot: ClipboardSlot) -> Vec<u8> {
        self.clipboards[slot.index()].clone()
    }

    fn set_clipboard(&mut self, slot: ClipboardSlot, data: &[u8]) {
        debug!(?slot, len = data.len(), "primary clipboard replaced");
        self.clipboards[slot.index()] = data.to_vec();
    }

    fn grab_clipboard(&mut self, slot: ClipboardSlot) {
        debug!(?slot, "primary clipboard taken by another screen");
        self.clipboards[slot.index()].clear();
    }

    fn screensaver(&mut self, activate: bool) {
        self.screensaver = activate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desk() -> HeadlessPrimary {
        HeadlessPrimary::new(ScreenShape::new(0, 0, 1920, 1080), 1)
    }

    #[test]
    fn test_headless_primary_starts_active_at_center() {
        let primary = desk();

        assert!(primary.is_active());
        assert_eq!(primary.cursor_pos(), (960, 540));
        assert_eq!(primary.cursor_center(), (960, 540));
    }

    #[test]
    fn test_enter_for_screensaver_keeps_cursor() {
        // Arrange
        let mut primary = desk();
        primary.leave();

        // Act
        primary.enter(10, 10, 1, true);

        // Assert
        assert!(primary.is_active());
        assert_eq!(primary.cursor_pos(), (960, 540));
    }

    #[test]
    fn test_grab_clears_local_clipboard() {
        let mut primary = desk();
        primary.set_clipboard(ClipboardSlot::Clipboard, b"text");

        primary.grab_clipboard(ClipboardSlot::Clipboard);

        assert!(primary.clipboard(ClipboardSlot::Clipboard).is_empty());
    }

    #[test]
    fn test_negative_jump_zone_is_clamped() {
        let primary = HeadlessPrimary::new(ScreenShape::new(0, 0, 800, 600), -3);
        assert_eq!(primary.jump_zone_size(), 0);
    }
}
