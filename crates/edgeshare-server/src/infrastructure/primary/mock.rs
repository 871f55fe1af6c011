//! Recording primary screen for tests.
//!
//! Clones share state, so a test can hand one clone to the server and keep
//! another to inspect calls and to change what the "desktop" reports.

use std::sync::{Arc, Mutex, MutexGuard};

use edgeshare_core::{ClipboardSlot, ScreenShape};

use crate::application::primary::PrimaryScreen;

/// A mutating call received by [`RecordingPrimaryScreen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryCall {
    Enter {
        x: i32,
        y: i32,
        seq: u32,
        for_screensaver: bool,
    },
    Leave,
    Reconfigure(u32),
    Warp { x: i32, y: i32 },
    SetClipboard { slot: ClipboardSlot, data: Vec<u8> },
    GrabClipboard(ClipboardSlot),
    ScreenSaver(bool),
}

#[derive(Debug)]
struct State {
    shape: ScreenShape,
    cursor: (i32, i32),
    jump_zone: i32,
    locked: bool,
    toggle_mask: u16,
    refuse_leave: bool,
    clipboards: [Vec<u8>; 2],
    calls: Vec<PrimaryCall>,
}

/// A [`PrimaryScreen`] that records every mutating call.
#[derive(Debug, Clone)]
pub struct RecordingPrimaryScreen {
    state: Arc<Mutex<State>>,
}

impl RecordingPrimaryScreen {
    /// Creates a primary of `shape` with a 1-pixel jump zone and the cursor
    /// at its center.
    pub fn new(shape: ScreenShape) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                shape,
                cursor: shape.center(),
                jump_zone: 1,
                locked: false,
                toggle_mask: 0,
                refuse_leave: false,
                clipboards: [Vec::new(), Vec::new()],
                calls: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<PrimaryCall> {
        self.lock().calls.clone()
    }

    /// Returns and forgets the recorded calls.
    pub fn take_calls(&self) -> Vec<PrimaryCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn set_shape(&self, shape: ScreenShape) {
        self.lock().shape = shape;
    }

    pub fn set_cursor(&self, x: i32, y: i32) {
        self.lock().cursor = (x, y);
    }

    pub fn set_jump_zone(&self, size: i32) {
        self.lock().jump_zone = size;
    }

    /// Simulates a local lock such as Scroll Lock.
    pub fn set_locked(&self, locked: bool) {
        self.lock().locked = locked;
    }

    pub fn set_toggle_mask(&self, mask: u16) {
        self.lock().toggle_mask = mask;
    }

    /// Makes the next `leave` calls fail.
    pub fn set_refuse_leave(&self, refuse: bool) {
        self.lock().refuse_leave = refuse;
    }

    /// Replaces the local clipboard without recording a call.
    pub fn set_clipboard_contents(&self, slot: ClipboardSlot, data: &[u8]) {
        self.lock().clipboards[slot.index()] = data.to_vec();
    }
}

impl PrimaryScreen for RecordingPrimaryScreen {
    fn shape(&self) -> ScreenShape {
        self.lock().shape
    }

    fn cursor_pos(&self) -> (i32, i32) {
        self.lock().cursor
    }

    fn cursor_center(&self) -> (i32, i32) {
        self.lock().shape.center()
    }

    fn jump_zone_size(&self) -> i32 {
        self.lock().jump_zone
    }

    fn is_locked_to_screen(&self) -> bool {
        self.lock().locked
    }

    fn toggle_mask(&self) -> u16 {
        self.lock().toggle_mask
    }

    fn enter(&mut self, x: i32, y: i32, seq: u32, for_screensaver: bool) {
        let mut state = self.lock();
        if !for_screensaver {
            state.cursor = (x, y);
        }
        state.calls.push(PrimaryCall::Enter {
            x,
            y,
            seq,
            for_screensaver,
        });
    }

    fn leave(&mut self) -> bool {
        let mut state = self.lock();
        state.calls.push(PrimaryCall::Leave);
        !state.refuse_leave
    }

    fn reconfigure(&mut self, active_sides: u32) {
        self.lock().calls.push(PrimaryCall::Reconfigure(active_sides));
    }

    fn warp_cursor(&mut self, x: i32, y: i32) {
        let mut state = self.lock();
        state.cursor = (x, y);
        state.calls.push(PrimaryCall::Warp { x, y });
    }

    fn clipboard(&self, slot: ClipboardSlot) -> Vec<u8> {
        self.lock().clipboards[slot.index()].clone()
    }

    fn set_clipboard(&mut self, slot: ClipboardSlot, data: &[u8]) {
        let mut state = self.lock();
        state.clipboards[slot.index()] = data.to_vec();
        state.calls.push(PrimaryCall::SetClipboard {
            slot,
            data: data.to_vec(),
        });
    }

    fn grab_clipboard(&mut self, slot: ClipboardSlot) {
        self.lock().calls.push(PrimaryCall::GrabClipboard(slot));
    }

    fn screensaver(&mut self, activate: bool) {
        self.lock().calls.push(PrimaryCall::ScreenSaver(activate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_recorded_calls() {
        // Arrange
        let observer = RecordingPrimaryScreen::new(ScreenShape::new(0, 0, 100, 100));
        let mut screen = observer.clone();

        // Act
        screen.reconfigure(2);
        screen.enter(1, 2, 7, false);

        // Assert
        assert_eq!(
            observer.take_calls(),
            vec![
                PrimaryCall::Reconfigure(2),
                PrimaryCall::Enter {
                    x: 1,
                    y: 2,
                    seq: 7,
                    for_screensaver: false
                }
            ]
        );
        assert!(observer.calls().is_empty());
        assert_eq!(observer.cursor_pos(), (1, 2));
    }

    #[test]
    fn test_refused_leave_is_still_recorded() {
        let observer = RecordingPrimaryScreen::new(ScreenShape::new(0, 0, 100, 100));
        let mut screen = observer.clone();
        observer.set_refuse_leave(true);

        assert!(!screen.leave());
        assert_eq!(observer.calls(), vec![PrimaryCall::Leave]);
    }
}
