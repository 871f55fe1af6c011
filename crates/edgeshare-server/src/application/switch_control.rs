//! SwitchController: decides whether an edge crossing switches screens.
//!
//! Reaching an edge that has a neighbour does not necessarily switch.  The
//! user can ask for a *double tap* (touch the edge, move away, touch it again
//! within a window) or a *switch delay* (rest on the edge for a while).
//! Corners can be locked, the cursor can be locked to the current screen, and
//! a switch can require held modifier keys.
//!
//! # States
//!
//! ```text
//!            edge hit (two-tap on)            edge hit again in window
//!   Idle ───────────────────────► ArmedTwoTap ─────────────────────────► switch
//!     │                                                               ▲
//!     │ edge hit (delay on)                         wait timer fires  │
//!     └───────────────────────► ArmedWait ────────────────────────────┘
//! ```
//!
//! Moving away from the edge (`no_switch`) cancels the wait and, if the
//! cursor moved away cleanly, arms the second tap.

use std::time::Duration;

use edgeshare_core::{Direction, ModifierMask, OptionId, OptionSet, ScreenShape};
use tokio::time::Instant;
use tracing::debug;

use crate::application::screen_session::SessionId;
use crate::application::timers::{TimerFired, TimerHandle, TimerKind, Timers};

/// Minimum distance from the edges the cursor must travel to arm a second tap.
const TWO_TAP_ZONE: i32 = 4;

// ── Settings ──────────────────────────────────────────────────────────────────

/// Switching options taken from the global option set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchSettings {
    pub wait_delay: Duration,
    pub two_tap_delay: Duration,
    pub needs_shift: bool,
    pub needs_control: bool,
    pub needs_alt: bool,
}

impl SwitchSettings {
    /// Reads the settings from `options`.  Negative delays count as zero.
    pub fn from_options(options: &OptionSet) -> Self {
        let millis = |id: OptionId| {
            let ms = options.get(id).unwrap_or(0).max(0);
            Duration::from_millis(u64::from(ms.unsigned_abs()))
        };
        Self {
            wait_delay: millis(OptionId::SWITCH_DELAY),
            two_tap_delay: millis(OptionId::SWITCH_TWO_TAP),
            needs_shift: options.flag(OptionId::SWITCH_NEEDS_SHIFT),
            needs_control: options.flag(OptionId::SWITCH_NEEDS_CONTROL),
            needs_alt: options.flag(OptionId::SWITCH_NEEDS_ALT),
        }
    }

    fn modifiers_held(&self, mask: u16) -> bool {
        let mods = ModifierMask(mask);
        (!self.needs_shift || mods.contains(ModifierMask::SHIFT))
            && (!self.needs_control || mods.contains(ModifierMask::CONTROL))
            && (!self.needs_alt || mods.contains(ModifierMask::ALT))
    }
}

// ── Cursor tracking ───────────────────────────────────────────────────────────

/// The authoritative cursor position and the last two motion deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorTrack {
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
    pub dx2: i32,
    pub dy2: i32,
}

impl CursorTrack {
    pub fn push_delta(&mut self, dx: i32, dy: i32) {
        self.dx2 = self.dx;
        self.dy2 = self.dy;
        self.dx = dx;
        self.dy = dy;
    }

    pub fn reset_deltas(&mut self) {
        self.dx = 0;
        self.dy = 0;
        self.dx2 = 0;
        self.dy2 = 0;
    }
}

/// Facts about the moment of the crossing, gathered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchGate {
    /// The position on the active screen lies in a locked corner.
    pub in_locked_corner: bool,
    /// The cursor is locked to the active screen.
    pub locked_to_screen: bool,
    /// Modifier keys held on the primary.
    pub toggle_mask: u16,
}

/// Observable debounce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Idle,
    ArmedTwoTap,
    ArmedWait,
}

/// A switch delay that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitExpired {
    pub target: SessionId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug)]
struct PendingWait {
    x: i32,
    y: i32,
    timer: TimerHandle,
}

// ── SwitchController ──────────────────────────────────────────────────────────

/// Debounce state for edge switching.
#[derive(Debug)]
pub struct SwitchController {
    settings: SwitchSettings,
    target: Option<SessionId>,
    dir: Option<Direction>,
    two_tap_engaged: bool,
    two_tap_armed: bool,
    two_tap_since: Instant,
    wait: Option<PendingWait>,
}

impl Default for SwitchController {
    fn default() -> Self {
        Self::new(SwitchSettings::default())
    }
}

impl SwitchController {
    pub fn new(settings: SwitchSettings) -> Self {
        Self {
            settings,
            target: None,
            dir: None,
            two_tap_engaged: false,
            two_tap_armed: false,
            two_tap_since: Instant::now(),
            wait: None,
        }
    }

    /// Installs new settings, cancelling any pending wait or double tap.
    pub fn configure(&mut self, settings: SwitchSettings) {
        self.settings = settings;
        self.stop_wait();
        self.stop_two_tap();
    }

    pub fn settings(&self) -> SwitchSettings {
        self.settings
    }

    /// Screen a pending switch is aimed at.
    pub fn target(&self) -> Option<SessionId> {
        self.target
    }

    pub fn direction(&self) -> Option<Direction> {
        self.dir
    }

    pub fn state(&self) -> SwitchState {
        if self.wait.is_some() {
            SwitchState::ArmedWait
        } else if self.two_tap_engaged {
            SwitchState::ArmedTwoTap
        } else {
            SwitchState::Idle
        }
    }

    /// Decides whether crossing `dir` towards `candidate` switches now.
    ///
    /// `(x, y)` is the landing position on the candidate, remembered for a
    /// delayed switch.  The checks run in a fixed order: candidate, double
    /// tap, delay, locked corner, lock to screen, required modifiers.
    pub fn is_switch_okay(
        &mut self,
        candidate: Option<SessionId>,
        dir: Direction,
        x: i32,
        y: i32,
        gate: SwitchGate,
        timers: &mut Timers,
    ) -> bool {
        let Some(candidate) = candidate else {
            debug!(%dir, "no neighbor");
            self.stop_switch();
            return false;
        };

        let mut prevent = false;
        let mut allow = false;

        let is_new_direction = self.dir != Some(dir);
        if is_new_direction || self.target.is_none() {
            self.dir = Some(dir);
            self.target = Some(candidate);
        }

        if !self.settings.two_tap_delay.is_zero() {
            if is_new_direction || !self.two_tap_engaged || !self.second_tap_in_window() {
                prevent = true;
                self.start_two_tap();
            } else {
                allow = true;
            }
        }

        if !allow && !self.settings.wait_delay.is_zero() {
            if is_new_direction || self.wait.is_none() {
                self.start_wait(x, y, timers);
            }
            prevent = true;
        }

        if gate.in_locked_corner {
            debug!("locked in corner");
            prevent = true;
            self.stop_switch();
        }

        if !prevent && gate.locked_to_screen {
            debug!("locked to screen");
            prevent = true;
            self.stop_switch();
        }

        if !prevent && !self.settings.modifiers_held(gate.toggle_mask) {
            debug!("need modifiers to switch");
            prevent = true;
            self.stop_switch();
        }

        !prevent
    }

    /// The cursor is away from any switching edge.
    ///
    /// `active` is the active screen's shape and `jump_zone` the primary's.
    pub fn no_switch(&mut self, cursor: &CursorTrack, active: ScreenShape, jump_zone: i32) {
        self.arm_two_tap(cursor, active, jump_zone);
        self.stop_wait();
    }

    /// Forgets any pending switch.
    pub fn stop_switch(&mut self) {
        if self.target.is_some() {
            self.target = None;
            self.dir = None;
            self.stop_two_tap();
            self.stop_wait();
        }
    }

    /// Consumes the pending wait if `fired` belongs to it.
    pub fn take_wait(&mut self, fired: &TimerFired) -> Option<WaitExpired> {
        let matches = self.wait.as_ref().is_some_and(|w| w.timer.matches(fired));
        if !matches {
            return None;
        }
        let wait = self.wait.take()?;
        Some(WaitExpired {
            target: self.target?,
            x: wait.x,
            y: wait.y,
        })
    }

    fn second_tap_in_window(&self) -> bool {
        self.two_tap_armed && self.two_tap_since.elapsed() <= self.settings.two_tap_delay
    }

    fn start_two_tap(&mut self) {
        self.two_tap_engaged = true;
        self.two_tap_armed = false;
        self.two_tap_since = Instant::now();
    }

    fn stop_two_tap(&mut self) {
        self.two_tap_engaged = false;
        self.two_tap_armed = false;
    }

    fn arm_two_tap(&mut self, cursor: &CursorTrack, active: ScreenShape, jump_zone: i32) {
        if !self.two_tap_engaged {
            return;
        }
        if self.two_tap_since.elapsed() > self.settings.two_tap_delay {
            self.stop_two_tap();
            return;
        }
        if self.two_tap_armed {
            return;
        }
        let zone = jump_zone.max(TWO_TAP_ZONE);
        let (x, y) = (cursor.x, cursor.y);
        let inside = x >= active.x + zone
            && x < active.right() - zone
            && y >= active.y + zone
            && y < active.bottom() - zone;
        if !inside {
            return;
        }
        // Both deltas must point away from the edge to filter out stray
        // events reported in the wrong direction.
        self.two_tap_armed = match self.dir {
            Some(Direction::Left) => cursor.dx > 0 && cursor.dx2 > 0,
            Some(Direction::Right) => cursor.dx < 0 && cursor.dx2 < 0,
            Some(Direction::Top) => cursor.dy > 0 && cursor.dy2 > 0,
            Some(Direction::Bottom) => cursor.dy < 0 && cursor.dy2 < 0,
            None => false,
        };
    }

    fn start_wait(&mut self, x: i32, y: i32, timers: &mut Timers) {
        self.stop_wait();
        let timer = timers.start(TimerKind::SwitchWait, self.settings.wait_delay);
        debug!(x, y, delay = ?self.settings.wait_delay, "waiting to switch");
        self.wait = Some(PendingWait { x, y, timer });
    }

    fn stop_wait(&mut self) {
        if let Some(wait) = self.wait.take() {
            wait.timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::server::ServerEvent;

    const ACTIVE: ScreenShape = ScreenShape {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    fn timers() -> (Timers, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Timers::new(tx), rx)
    }

    fn controller(settings: SwitchSettings) -> SwitchController {
        SwitchController::new(settings)
    }

    fn open_gate() -> SwitchGate {
        SwitchGate::default()
    }

    /// Cursor back inside the screen, having moved left twice.
    fn moved_away_from_right_edge() -> CursorTrack {
        CursorTrack {
            x: 1800,
            y: 540,
            dx: -20,
            dy: 0,
            dx2: -15,
            dy2: 0,
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_clamp_negative_delays() {
        let options: OptionSet = [
            (OptionId::SWITCH_DELAY, -50),
            (OptionId::SWITCH_TWO_TAP, 250),
            (OptionId::SWITCH_NEEDS_ALT, 1),
        ]
        .into_iter()
        .collect();

        let settings = SwitchSettings::from_options(&options);

        assert_eq!(settings.wait_delay, Duration::ZERO);
        assert_eq!(settings.two_tap_delay, Duration::from_millis(250));
        assert!(settings.needs_alt);
        assert!(!settings.needs_shift);
    }

    // ── Basic decisions ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_no_candidate_rejects_and_clears() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings::default());

        let ok = ctl.is_switch_okay(None, Direction::Right, 0, 0, open_gate(), &mut timers);

        assert!(!ok);
        assert_eq!(ctl.target(), None);
        assert_eq!(ctl.state(), SwitchState::Idle);
    }

    #[tokio::test]
    async fn test_switch_allowed_immediately_without_delays() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings::default());
        let target = SessionId::new();

        let ok = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);

        assert!(ok);
        assert_eq!(ctl.target(), Some(target));
        assert_eq!(ctl.direction(), Some(Direction::Right));
    }

    // ── Double tap ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_double_tap_within_window_switches() {
        // Arrange
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings {
            two_tap_delay: Duration::from_millis(250),
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        // Act: first tap
        let first = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);
        assert!(!first);
        assert_eq!(ctl.state(), SwitchState::ArmedTwoTap);

        // Move away cleanly, then tap again 100 ms later
        ctl.no_switch(&moved_away_from_right_edge(), ACTIVE, 1);
        tokio::time::advance(Duration::from_millis(100)).await;
        let second = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);

        // Assert
        assert!(second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_tap_after_window_rearms() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings {
            two_tap_delay: Duration::from_millis(250),
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);
        ctl.no_switch(&moved_away_from_right_edge(), ACTIVE, 1);
        tokio::time::advance(Duration::from_millis(400)).await;
        let late = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);

        assert!(!late);
        assert_eq!(ctl.state(), SwitchState::ArmedTwoTap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_tap_without_moving_away_does_not_switch() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings {
            two_tap_delay: Duration::from_millis(250),
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);
        // Deltas still point at the edge, so the tap never arms.
        let toward_edge = CursorTrack {
            dx: 5,
            dx2: 5,
            ..moved_away_from_right_edge()
        };
        ctl.no_switch(&toward_edge, ACTIVE, 1);
        let again = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);

        assert!(!again);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_switch_disengages_expired_two_tap() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings {
            two_tap_delay: Duration::from_millis(250),
            ..SwitchSettings::default()
        });

        ctl.is_switch_okay(Some(SessionId::new()), Direction::Left, 0, 0, open_gate(), &mut timers);
        tokio::time::advance(Duration::from_millis(300)).await;
        ctl.no_switch(&CursorTrack::default(), ACTIVE, 1);

        assert_eq!(ctl.state(), SwitchState::Idle);
    }

    // ── Switch delay ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_wait_delay_prevents_then_timer_reports_position() {
        // Arrange
        let (mut timers, mut rx) = timers();
        let mut ctl = controller(SwitchSettings {
            wait_delay: Duration::from_millis(200),
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        // Act
        let ok = ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);
        let fired = match rx.recv().await {
            Some(ServerEvent::Timer(fired)) => fired,
            other => panic!("expected timer, got {other:?}"),
        };

        // Assert
        assert!(!ok);
        assert_eq!(
            ctl.take_wait(&fired),
            Some(WaitExpired {
                target,
                x: 0,
                y: 400
            })
        );
        assert_eq!(ctl.state(), SwitchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_not_restarted_while_resting_on_same_edge() {
        let (mut timers, mut rx) = timers();
        let mut ctl = controller(SwitchSettings {
            wait_delay: Duration::from_millis(200),
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        ctl.is_switch_okay(Some(target), Direction::Right, 0, 400, open_gate(), &mut timers);
        tokio::time::advance(Duration::from_millis(150)).await;
        ctl.is_switch_okay(Some(target), Direction::Right, 0, 410, open_gate(), &mut timers);
        let started = Instant::now();
        let fired = match rx.recv().await {
            Some(ServerEvent::Timer(fired)) => fired,
            other => panic!("expected timer, got {other:?}"),
        };

        // The original timer fired 50 ms later with the first position.
        assert!(started.elapsed() <= Duration::from_millis(60));
        assert_eq!(ctl.take_wait(&fired).map(|w| w.y), Some(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_away_cancels_wait() {
        let (mut timers, mut rx) = timers();
        let mut ctl = controller(SwitchSettings {
            wait_delay: Duration::from_millis(200),
            ..SwitchSettings::default()
        });

        ctl.is_switch_okay(Some(SessionId::new()), Direction::Right, 0, 400, open_gate(), &mut timers);
        ctl.no_switch(&moved_away_from_right_edge(), ACTIVE, 1);

        let waited = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(waited.is_err());
        assert_ne!(ctl.state(), SwitchState::ArmedWait);
    }

    // ── Gates ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_locked_corner_prevents_and_clears() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings::default());
        let gate = SwitchGate {
            in_locked_corner: true,
            ..SwitchGate::default()
        };

        let ok = ctl.is_switch_okay(Some(SessionId::new()), Direction::Right, 0, 0, gate, &mut timers);

        assert!(!ok);
        assert_eq!(ctl.target(), None);
    }

    #[tokio::test]
    async fn test_lock_to_screen_prevents() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings::default());
        let gate = SwitchGate {
            locked_to_screen: true,
            ..SwitchGate::default()
        };

        assert!(!ctl.is_switch_okay(Some(SessionId::new()), Direction::Top, 0, 0, gate, &mut timers));
        assert_eq!(ctl.direction(), None);
    }

    #[tokio::test]
    async fn test_required_modifier_must_be_held() {
        let (mut timers, _rx) = timers();
        let mut ctl = controller(SwitchSettings {
            needs_shift: true,
            ..SwitchSettings::default()
        });
        let target = SessionId::new();

        let without = ctl.is_switch_okay(Some(target), Direction::Left, 0, 0, open_gate(), &mut timers);
        let with_shift = SwitchGate {
            toggle_mask: ModifierMask::SHIFT,
            ..SwitchGate::default()
        };
        let with = ctl.is_switch_okay(Some(target), Direction::Left, 0, 0, with_shift, &mut timers);

        assert!(!without);
        assert!(with);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_corner_cancels_running_wait() {
        let (mut timers, mut rx) = timers();
        let mut ctl = controller(SwitchSettings {
            wait_delay: Duration::from_millis(200),
            ..SwitchSettings::default()
        });
        let corner = SwitchGate {
            in_locked_corner: true,
            ..SwitchGate::default()
        };

        ctl.is_switch_okay(Some(SessionId::new()), Direction::Right, 0, 0, corner, &mut timers);

        assert_eq!(ctl.state(), SwitchState::Idle);
        assert!(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.is_err());
    }
}
