//! ClipboardArbiter: ownership and sequence bookkeeping for clipboard slots.
//!
//! # How clipboard sharing works (for beginners)
//!
//! There is one logical clipboard per slot, shared by every screen.  When the
//! user copies on some screen, that screen *grabs* the slot: it becomes the
//! owner and every other screen is told its copy is stale.  The owner then
//! sends the actual contents as an *update*.
//!
//! Each grab carries a sequence number (the enter sequence the screen saw
//! last).  A grab or update older than the slot's current sequence comes from
//! a screen that had already lost focus, so it is dropped.  The primary is
//! trusted: its grabs are always accepted.
//!
//! The arbiter only decides; the server fans the decisions out to sessions.

use edgeshare_core::{ClipboardSlot, ScreenName};

use edgeshare_core::domain::options::DEFAULT_CLIPBOARD_SIZE_KB;

/// Result of [`ClipboardArbiter::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Stored; the caller fans the payload out.
    Accepted,
    /// Sharing is disabled.
    Disabled,
    /// Sequence number older than the slot's.
    Stale,
    /// The sender does not own the slot.
    NotOwner,
    /// Payload exceeds the size limit.
    TooLarge,
    /// Payload equals the cached copy.
    Unchanged,
}

#[derive(Debug, Clone)]
struct SlotState {
    owner: ScreenName,
    seq: u32,
    data: Vec<u8>,
}

/// Owner, sequence number and cached payload of each clipboard slot.
#[derive(Debug, Clone)]
pub struct ClipboardArbiter {
    slots: [SlotState; 2],
    enabled: bool,
    max_size: usize,
}

impl ClipboardArbiter {
    /// Creates an arbiter where `primary` owns both (empty) slots.
    pub fn new(primary: ScreenName) -> Self {
        let slot = SlotState {
            owner: primary,
            seq: 0,
            data: Vec::new(),
        };
        Self {
            slots: [slot.clone(), slot],
            enabled: true,
            max_size: kib(DEFAULT_CLIPBOARD_SIZE_KB),
        }
    }

    /// Applies the `clipboardSharing` and `clipboardSharingSize` settings.
    /// A size of zero or less disables sharing.
    pub fn configure(&mut self, enabled: bool, max_size_kb: i32) {
        self.enabled = enabled;
        self.max_size = kib(max_size_kb);
    }

    pub fn is_sharing(&self) -> bool {
        self.enabled && self.max_size > 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns `true` if a payload of `len` bytes may be shared.
    pub fn fits(&self, len: usize) -> bool {
        len <= self.max_size
    }

    pub fn owner(&self, slot: ClipboardSlot) -> &ScreenName {
        &self.slots[slot.index()].owner
    }

    pub fn seq(&self, slot: ClipboardSlot) -> u32 {
        self.slots[slot.index()].seq
    }

    pub fn data(&self, slot: ClipboardSlot) -> &[u8] {
        &self.slots[slot.index()].data
    }

    /// Records a grab.  Returns `false` if it is stale or sharing is off.
    ///
    /// On success the claimant owns the slot and the cached payload is cleared.
    pub fn grab(
        &mut self,
        slot: ClipboardSlot,
        claimant: &ScreenName,
        from_primary: bool,
        seq: u32,
    ) -> bool {
        if !self.is_sharing() {
            return false;
        }
        let state = &mut self.slots[slot.index()];
        if !from_primary && seq < state.seq {
            return false;
        }
        state.owner = claimant.clone();
        state.seq = seq;
        state.data.clear();
        true
    }

    /// Records new contents for `slot` from `sender`.
    pub fn update(
        &mut self,
        slot: ClipboardSlot,
        sender: &ScreenName,
        seq: u32,
        data: Vec<u8>,
    ) -> UpdateOutcome {
        if !self.is_sharing() {
            return UpdateOutcome::Disabled;
        }
        let max_size = self.max_size;
        let state = &mut self.slots[slot.index()];
        if seq < state.seq {
            return UpdateOutcome::Stale;
        }
        if &state.owner != sender {
            return UpdateOutcome::NotOwner;
        }
        if data.len() > max_size {
            return UpdateOutcome::TooLarge;
        }
        if state.data == data {
            return UpdateOutcome::Unchanged;
        }
        state.seq = seq;
        state.data = data;
        UpdateOutcome::Accepted
    }
}

fn kib(size_kb: i32) -> usize {
    usize::try_from(size_kb).map_or(0, |kb| kb.saturating_mul(1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT: ClipboardSlot = ClipboardSlot::Clipboard;

    fn arbiter() -> ClipboardArbiter {
        ClipboardArbiter::new(ScreenName::from("desk"))
    }

    // ── Grab ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_primary_owns_both_slots_initially() {
        let arb = arbiter();
        assert_eq!(arb.owner(ClipboardSlot::Clipboard).as_str(), "desk");
        assert_eq!(arb.owner(ClipboardSlot::Selection).as_str(), "desk");
        assert_eq!(arb.seq(SLOT), 0);
    }

    #[test]
    fn test_grab_with_newer_seq_transfers_ownership_and_clears() {
        // Arrange
        let mut arb = arbiter();
        let desk = ScreenName::from("desk");
        arb.update(SLOT, &desk, 0, b"old".to_vec());

        // Act
        let accepted = arb.grab(SLOT, &ScreenName::from("laptop"), false, 3);

        // Assert
        assert!(accepted);
        assert_eq!(arb.owner(SLOT).as_str(), "laptop");
        assert_eq!(arb.seq(SLOT), 3);
        assert!(arb.data(SLOT).is_empty());
    }

    #[test]
    fn test_stale_grab_from_secondary_is_rejected() {
        let mut arb = arbiter();
        arb.grab(SLOT, &ScreenName::from("laptop"), false, 5);

        let accepted = arb.grab(SLOT, &ScreenName::from("tablet"), false, 4);

        assert!(!accepted);
        assert_eq!(arb.owner(SLOT).as_str(), "laptop");
    }

    #[test]
    fn test_primary_grab_is_always_accepted() {
        let mut arb = arbiter();
        arb.grab(SLOT, &ScreenName::from("laptop"), false, 9);

        let accepted = arb.grab(SLOT, &ScreenName::from("desk"), true, 2);

        assert!(accepted);
        assert_eq!(arb.seq(SLOT), 2, "the primary may lower the sequence");
    }

    #[test]
    fn test_grab_ignored_when_sharing_disabled() {
        let mut arb = arbiter();
        arb.configure(false, 3072);

        assert!(!arb.grab(SLOT, &ScreenName::from("laptop"), false, 1));
        assert_eq!(arb.owner(SLOT).as_str(), "desk");
    }

    // ── Update ───────────────────────────────────────────────────────────────

    #[test]
    fn test_update_from_owner_is_accepted_then_idempotent() {
        // Arrange
        let mut arb = arbiter();
        let laptop = ScreenName::from("laptop");
        arb.grab(SLOT, &laptop, false, 3);

        // Act
        let first = arb.update(SLOT, &laptop, 3, b"hello".to_vec());
        let second = arb.update(SLOT, &laptop, 3, b"hello".to_vec());

        // Assert
        assert_eq!(first, UpdateOutcome::Accepted);
        assert_eq!(second, UpdateOutcome::Unchanged);
        assert_eq!(arb.data(SLOT), b"hello");
    }

    #[test]
    fn test_update_with_older_seq_is_stale() {
        let mut arb = arbiter();
        let laptop = ScreenName::from("laptop");
        arb.grab(SLOT, &laptop, false, 3);

        assert_eq!(arb.update(SLOT, &laptop, 2, b"x".to_vec()), UpdateOutcome::Stale);
    }

    #[test]
    fn test_update_from_non_owner_is_rejected() {
        let mut arb = arbiter();
        arb.grab(SLOT, &ScreenName::from("laptop"), false, 3);

        let outcome = arb.update(SLOT, &ScreenName::from("tablet"), 3, b"x".to_vec());

        assert_eq!(outcome, UpdateOutcome::NotOwner);
    }

    #[test]
    fn test_update_over_limit_is_rejected() {
        let mut arb = arbiter();
        arb.configure(true, 1);
        let desk = ScreenName::from("desk");

        let outcome = arb.update(SLOT, &desk, 0, vec![0; 1025]);

        assert_eq!(outcome, UpdateOutcome::TooLarge);
        assert!(arb.data(SLOT).is_empty());
    }

    #[test]
    fn test_zero_size_limit_disables_sharing() {
        let mut arb = arbiter();
        arb.configure(true, 0);

        assert!(!arb.is_sharing());
        assert_eq!(
            arb.update(SLOT, &ScreenName::from("desk"), 0, b"x".to_vec()),
            UpdateOutcome::Disabled
        );
    }

    #[test]
    fn test_slots_are_independent() {
        let mut arb = arbiter();
        arb.grab(ClipboardSlot::Selection, &ScreenName::from("laptop"), false, 1);

        assert_eq!(arb.owner(ClipboardSlot::Clipboard).as_str(), "desk");
        assert_eq!(arb.owner(ClipboardSlot::Selection).as_str(), "laptop");
    }
}
