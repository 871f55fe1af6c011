//! Server: the orchestrator and the only owner of mutable shared state.
//!
//! # Event loop (for beginners)
//!
//! Everything that can change state arrives as a [`ServerEvent`] on one
//! bounded queue:
//!
//! ```text
//!  handshake tasks ──SessionReady──────┐
//!  reader tasks ─────SessionMessage────┤
//!                    SessionClosed     │
//!  primary backend ──Input─────────────┼──► mpsc(1024) ──► Server::handle_event
//!  hotkeys / console ─Command──────────┤
//!  timers ───────────Timer─────────────┘
//! ```
//!
//! A single task owns the [`Server`] and handles one event at a time, so no
//! locks are needed.  The server never waits on a peer: outbound messages go
//! to per-session unbounded channels drained by writer tasks.
//!
//! # Focus
//!
//! Exactly one screen is *active*: it receives keyboard and mouse input.
//! While the primary is active the backend reports absolute motion
//! ([`PrimaryInput::MotionOnPrimary`]); while a secondary is active it reports
//! raw deltas ([`PrimaryInput::MotionOnSecondary`]) that the server
//! accumulates into the secondary's cursor.

use std::future::Future;
use std::time::Duration;

use edgeshare_core::domain::options::DEFAULT_CLIPBOARD_SIZE_KB;
use edgeshare_core::{
    ClipboardSlot, CornerMask, Direction, Message, OptionId, ScreenName, ScreenShape, Topology,
    TopologyError,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::application::clipboard::{ClipboardArbiter, UpdateOutcome};
use crate::application::navigation::Navigator;
use crate::application::primary::{PrimaryInput, PrimaryScreen};
use crate::application::screen_session::{ScreenSession, SessionId};
use crate::application::session_registry::SessionRegistry;
use crate::application::switch_control::{
    CursorTrack, SwitchController, SwitchGate, SwitchSettings, SwitchState,
};
use crate::application::timers::{TimerFired, TimerKind, Timers};

/// Capacity of the server event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Creates the server event queue.
pub fn event_channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

// ── Events, commands and notices ──────────────────────────────────────────────

/// Everything the server reacts to.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection finished its handshake.
    SessionReady(ScreenSession),
    SessionMessage { id: SessionId, message: Message },
    /// The peer's stream ended.
    SessionClosed { id: SessionId },
    /// The peer sent bytes that could not be decoded.
    SessionFailed { id: SessionId, error: String },
    Input(PrimaryInput),
    Command(Command),
    Timer(TimerFired),
    Reconfigure(Box<Topology>),
    Shutdown,
}

/// Three-way switch used by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
    Toggle,
}

impl Toggle {
    pub fn apply(self, current: bool) -> bool {
        match self {
            Toggle::On => true,
            Toggle::Off => false,
            Toggle::Toggle => !current,
        }
    }
}

/// Screens that receive broadcast key events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BroadcastTargets {
    #[default]
    All,
    Screens(Vec<ScreenName>),
}

impl BroadcastTargets {
    /// Parses `*` or a `:`/`,` separated list of names.
    pub fn parse(list: &str) -> Self {
        let list = list.trim();
        if list.is_empty() || list == "*" {
            return BroadcastTargets::All;
        }
        BroadcastTargets::Screens(
            list.split([':', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ScreenName::from)
                .collect(),
        )
    }

    pub fn contains(&self, name: &ScreenName) -> bool {
        match self {
            BroadcastTargets::All => true,
            BroadcastTargets::Screens(names) => names.contains(name),
        }
    }
}

/// User commands, normally bound to hotkeys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SwitchToScreen(ScreenName),
    SwitchInDirection(Direction),
    /// Cycle through connected screens in name order.
    ToggleScreen,
    LockCursorToScreen(Toggle),
    KeyboardBroadcast {
        state: Toggle,
        targets: BroadcastTargets,
    },
}

/// Notifications for collaborators such as a status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotice {
    ScreenConnected(ScreenName),
    ScreenDisconnected(ScreenName),
    ScreenSwitched { from: ScreenName, to: ScreenName },
    /// Only the primary is left.
    AllDisconnected,
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Lifecycle timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// How long a closing session may take to hang up.
    pub close_timeout: Duration,
    /// How long shutdown waits for every session to hang up.
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// Where to return when the screen saver ends.
#[derive(Debug, Clone, Copy)]
struct SaverRestore {
    screen: SessionId,
    x: i32,
    y: i32,
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct Server {
    settings: ServerSettings,
    topology: Topology,
    registry: SessionRegistry,
    primary: Box<dyn PrimaryScreen>,
    primary_jump: (i32, i32),
    primary_dirty: [bool; 2],
    switch: SwitchController,
    clipboard: ClipboardArbiter,
    timers: Timers,
    notices: Option<mpsc::UnboundedSender<ServerNotice>>,

    active: SessionId,
    cursor: CursorTrack,
    seq: u32,
    locked_to_screen: bool,
    disable_lock_to_screen: bool,
    relative_moves: bool,
    screensaver_sync: bool,
    broadcasting: bool,
    broadcast_targets: BroadcastTargets,
    saver: Option<SaverRestore>,
}

impl Server {
    /// Creates a server for the primary screen `primary_name`.
    ///
    /// `events` is the sending half of the queue the server will be run on;
    /// timers post into it.  Fails if the topology does not contain the
    /// primary.
    pub fn new(
        settings: ServerSettings,
        topology: Topology,
        primary_name: ScreenName,
        primary: Box<dyn PrimaryScreen>,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<Self, TopologyError> {
        let primary_name = topology
            .canonical_name(&primary_name)
            .cloned()
            .ok_or(TopologyError::UnknownScreen(primary_name))?;
        let (x, y) = primary.cursor_pos();

        let mut server = Self {
            settings,
            topology,
            registry: SessionRegistry::new(primary_name.clone()),
            primary,
            primary_jump: (x, y),
            primary_dirty: [true; 2],
            switch: SwitchController::default(),
            clipboard: ClipboardArbiter::new(primary_name),
            timers: Timers::new(events),
            notices: None,
            active: SessionId::PRIMARY,
            cursor: CursorTrack {
                x,
                y,
                ..CursorTrack::default()
            },
            seq: 0,
            locked_to_screen: false,
            disable_lock_to_screen: false,
            relative_moves: false,
            screensaver_sync: true,
            broadcasting: false,
            broadcast_targets: BroadcastTargets::All,
            saver: None,
        };
        server.process_options();
        let sides = server.active_primary_sides();
        server.primary.reconfigure(sides);
        Ok(server)
    }

    /// Starts delivering [`ServerNotice`]s.  A second call replaces the first
    /// receiver.
    pub fn notices(&mut self) -> mpsc::UnboundedReceiver<ServerNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notices = Some(tx);
        rx
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn primary_name(&self) -> &ScreenName {
        self.registry.primary_name()
    }

    pub fn active(&self) -> SessionId {
        self.active
    }

    pub fn active_name(&self) -> &ScreenName {
        self.registry
            .name_of(self.active)
            .unwrap_or(self.registry.primary_name())
    }

    /// Authoritative cursor position on the active screen.
    pub fn cursor(&self) -> (i32, i32) {
        (self.cursor.x, self.cursor.y)
    }

    /// Current enter sequence number.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn clipboard(&self) -> &ClipboardArbiter {
        &self.clipboard
    }

    pub fn switch_state(&self) -> SwitchState {
        self.switch.state()
    }

    pub fn is_keyboard_broadcasting(&self) -> bool {
        self.broadcasting
    }

    /// Returns `true` if the cursor may not leave the active screen.
    pub fn is_locked_to_screen(&self) -> bool {
        if self.disable_lock_to_screen {
            return false;
        }
        if self.locked_to_screen {
            trace!("locked by server");
            return true;
        }
        self.primary.is_locked_to_screen()
    }

    // ── Event loop ───────────────────────────────────────────────────────────

    /// Runs until `shutdown` resolves or a [`ServerEvent::Shutdown`] arrives,
    /// then disconnects every session.
    pub async fn run<F>(mut self, mut events: mpsc::Receiver<ServerEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(screen = %self.primary_name(), "server started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ServerEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event),
                },
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }
        self.shutdown_all(&mut events).await;
        info!("server stopped");
    }

    /// Handles one event.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionReady(session) => self.adopt(session),
            ServerEvent::SessionMessage { id, message } => self.on_session_message(id, message),
            ServerEvent::SessionClosed { id } => self.on_session_closed(id),
            ServerEvent::SessionFailed { id, error } => self.on_session_failed(id, &error),
            ServerEvent::Input(input) => self.on_primary_input(input),
            ServerEvent::Command(command) => self.on_command(command),
            ServerEvent::Timer(fired) => self.on_timer(fired),
            ServerEvent::Reconfigure(topology) => {
                if let Err(err) = self.reconfigure(*topology) {
                    warn!(%err, "new topology refused");
                }
            }
            ServerEvent::Shutdown => debug!("shutdown is handled by the run loop"),
        }
    }

    /// Closes every session and waits for them to hang up, at most
    /// `shutdown_timeout`.  Only disconnect and deadline events are handled
    /// while waiting.
    pub async fn shutdown_all(&mut self, events: &mut mpsc::Receiver<ServerEvent>) {
        for id in self.registry.client_ids() {
            self.close_client(id, Message::Close);
        }
        if self.registry.is_empty() {
            self.notify(ServerNotice::AllDisconnected);
            return;
        }

        let deadline = Instant::now() + self.settings.shutdown_timeout;
        while !self.registry.is_empty() {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(
                    event @ (ServerEvent::SessionClosed { .. } | ServerEvent::SessionFailed { .. }),
                )) => self.handle_event(event),
                Ok(Some(ServerEvent::Timer(fired))) => {
                    if matches!(fired.kind, TimerKind::CloseDeadline(_)) {
                        self.on_timer(fired);
                    }
                }
                Ok(Some(ServerEvent::SessionReady(session))) => {
                    debug!(screen = %session.name(), "refusing screen during shutdown");
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = self.registry.closing_count(),
                        "timed out waiting for clients to disconnect"
                    );
                    break;
                }
            }
        }
        let dropped = self.registry.clear();
        if dropped > 0 {
            debug!(dropped, "dropped remaining sessions");
        }
    }

    // ── Configuration ────────────────────────────────────────────────────────

    /// Swaps in a new topology.
    ///
    /// Sessions whose name is no longer a screen are closed first.  A
    /// topology without the primary is refused and nothing changes.
    pub fn reconfigure(&mut self, topology: Topology) -> Result<(), TopologyError> {
        let primary = self.registry.primary_name().clone();
        if !topology.is_canonical_name(&primary) {
            return Err(TopologyError::UnknownScreen(primary));
        }

        for (name, id) in self.registry.live_screens() {
            if !id.is_primary() && !topology.is_canonical_name(&name) {
                self.close_client(id, Message::Close);
            }
        }

        self.topology = topology;
        self.process_options();
        let sides = self.active_primary_sides();
        self.primary.reconfigure(sides);
        for id in self.registry.client_ids() {
            self.send_options(id);
        }
        info!(screens = self.topology.len(), "topology applied");
        Ok(())
    }

    fn process_options(&mut self) {
        let options = self.topology.global_options().clone();

        self.switch.configure(SwitchSettings::from_options(&options));

        let relative_moves = options.flag(OptionId::RELATIVE_MOVES);
        if self.relative_moves && !relative_moves {
            self.stop_relative_moves();
        }
        self.relative_moves = relative_moves;
        self.disable_lock_to_screen = options.flag(OptionId::DISABLE_LOCK_TO_SCREEN);
        self.screensaver_sync = options.get(OptionId::SCREENSAVER_SYNC).map_or(true, |v| v != 0);

        let sharing = options.get(OptionId::CLIPBOARD_SHARING).map_or(true, |v| v != 0);
        let size_kb = options
            .get(OptionId::CLIPBOARD_SHARING_SIZE)
            .unwrap_or(DEFAULT_CLIPBOARD_SIZE_KB);
        self.clipboard.configure(sharing, size_kb);

        debug!(
            settings = ?self.switch.settings(),
            relative_moves,
            sharing = self.clipboard.is_sharing(),
            "options applied"
        );
    }

    /// Sends the per-screen options followed by the global options.
    fn send_options(&mut self, id: SessionId) {
        let Some(name) = self.registry.name_of(id).cloned() else {
            return;
        };
        let mut pairs = Vec::new();
        if let Some(own) = self.topology.options(&name) {
            pairs.extend(own.to_wire());
        }
        pairs.extend(self.topology.global_options().to_wire());
        if let Some(session) = self.registry.get_mut(id) {
            session.send_options(pairs);
        }
    }

    /// Bitmask of primary sides that lead somewhere; empty while locked.
    fn active_primary_sides(&self) -> u32 {
        if self.locked_to_screen {
            return 0;
        }
        let primary = self.registry.primary_name();
        Direction::ALL
            .iter()
            .filter(|dir| self.topology.has_neighbor(primary, **dir))
            .fold(0, |sides, dir| sides | dir.mask())
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    fn adopt(&mut self, session: ScreenSession) {
        match self.registry.adopt(session, &self.topology) {
            Ok(id) => {
                let name = self.name_of(id);
                info!(screen = %name, "client connected");
                let sides = self.active_primary_sides();
                self.primary.reconfigure(sides);
                self.send_options(id);
                if self.saver.is_some() {
                    if let Some(session) = self.registry.get(id) {
                        session.screensaver(true);
                    }
                }
                self.notify(ServerNotice::ScreenConnected(name));
            }
            Err((err, session)) => {
                warn!(%err, "rejecting screen");
                self.park(session, err.reply());
            }
        }
    }

    /// Asks a live session to disconnect and parks it until it does.
    pub fn close_client(&mut self, id: SessionId, reply: Message) {
        let Some(session) = self.registry.remove(id) else {
            return;
        };
        let name = session.name().clone();
        info!(screen = %name, reply = reply.name(), "disconnecting client");
        self.park(session, reply);
        self.force_leave(id);
        self.notify(ServerNotice::ScreenDisconnected(name));
    }

    fn park(&mut self, session: ScreenSession, reply: Message) {
        session.close(reply);
        let deadline = self
            .timers
            .start(TimerKind::CloseDeadline(session.id()), self.settings.close_timeout);
        self.registry.begin_close(session, deadline);
    }

    /// Moves focus back to the primary if `id` had it, either now or when
    /// the screen saver started.
    fn force_leave(&mut self, id: SessionId) {
        let holds_focus = self.active == id;
        let saved_focus = self.saver.is_some_and(|s| s.screen == id);
        if holds_focus || saved_focus {
            let (x, y) = self.primary.cursor_center();
            self.cursor.x = x;
            self.cursor.y = y;
            info!(to = %self.primary_name(), x, y, "jump to primary");
        }
        if holds_focus {
            self.active = SessionId::PRIMARY;
            // The peer is gone, so there is nobody to send a leave to.
            self.primary.enter(self.cursor.x, self.cursor.y, self.seq, false);
        }
        if self.switch.target() == Some(id) {
            self.switch.stop_switch();
        }
        // Nothing to return to when the screen saver ends.
        if saved_focus {
            self.saver = None;
        }
        let sides = self.active_primary_sides();
        self.primary.reconfigure(sides);
    }

    fn on_session_closed(&mut self, id: SessionId) {
        if let Some(session) = self.registry.remove(id) {
            let name = session.name().clone();
            info!(screen = %name, "client disconnected");
            drop(session);
            self.force_leave(id);
            self.notify(ServerNotice::ScreenDisconnected(name));
            self.check_all_disconnected();
        } else if self.registry.finish_close(id).is_some() {
            debug!(%id, "closing client hung up");
            self.check_all_disconnected();
        }
    }

    fn on_session_failed(&mut self, id: SessionId, error: &str) {
        if self.registry.is_closing(id) {
            self.registry.finish_close(id);
            self.check_all_disconnected();
            return;
        }
        if let Some(name) = self.registry.name_of(id).cloned() {
            warn!(screen = %name, %error, "protocol error");
        }
        self.drop_session(id, Message::Bad);
    }

    /// Removes a misbehaving live session at once after sending `reply`.
    fn drop_session(&mut self, id: SessionId, reply: Message) {
        let Some(session) = self.registry.remove(id) else {
            return;
        };
        let name = session.name().clone();
        session.reject(reply);
        // The writer drains the reply before it notices the channel closed.
        drop(session);
        self.force_leave(id);
        self.notify(ServerNotice::ScreenDisconnected(name));
        self.check_all_disconnected();
    }

    fn check_all_disconnected(&mut self) {
        if self.registry.is_empty() {
            self.notify(ServerNotice::AllDisconnected);
        }
    }

    fn on_session_message(&mut self, id: SessionId, message: Message) {
        if id.is_primary() || !self.registry.is_live(id) {
            trace!(%id, message = message.name(), "ignoring message from inactive session");
            return;
        }
        match message {
            Message::Info(screen_info) => {
                let applied = self.registry.get_mut(id).map(|s| s.apply_info(&screen_info));
                match applied {
                    Some(Ok(())) => self.on_shape_changed(id),
                    Some(Err(err)) => {
                        warn!(screen = %self.name_of(id), %err, "bad screen info");
                        self.drop_session(id, Message::Bad);
                    }
                    None => {}
                }
            }
            Message::ClipboardGrab { slot, seq } => self.on_clipboard_grabbed(id, slot, seq),
            Message::ClipboardData {
                slot,
                seq,
                mark,
                data,
            } => {
                let complete = self
                    .registry
                    .get_mut(id)
                    .and_then(|s| s.receive_clipboard(slot, seq, mark, data));
                if let Some((seq, data)) = complete {
                    self.on_clipboard_changed(id, slot, seq, data);
                }
            }
            Message::KeepAlive | Message::Noop => {}
            other if other.is_error() => {
                info!(screen = %self.name_of(id), error = other.name(), "client reported an error");
            }
            other => {
                warn!(screen = %self.name_of(id), message = other.name(), "invalid message from client");
                self.drop_session(id, Message::Bad);
            }
        }
    }

    // ── Screen helpers ───────────────────────────────────────────────────────

    fn name_of(&self, id: SessionId) -> ScreenName {
        self.registry
            .name_of(id)
            .cloned()
            .unwrap_or_else(|| ScreenName::from(id.to_string()))
    }

    fn shape_of(&self, id: SessionId) -> Option<ScreenShape> {
        if id.is_primary() {
            Some(self.primary.shape())
        } else {
            self.registry.get(id).map(ScreenSession::shape)
        }
    }

    fn cursor_pos_of(&self, id: SessionId) -> Option<(i32, i32)> {
        if id.is_primary() {
            Some(self.primary.cursor_pos())
        } else {
            self.registry.get(id).map(ScreenSession::cursor)
        }
    }

    fn jump_cursor_of(&self, id: SessionId) -> Option<(i32, i32)> {
        if id.is_primary() {
            Some(self.primary_jump)
        } else {
            self.registry.get(id).map(ScreenSession::jump_cursor)
        }
    }

    fn set_jump_cursor(&mut self, id: SessionId, x: i32, y: i32) {
        if id.is_primary() {
            self.primary_jump = (x, y);
        } else if let Some(session) = self.registry.get_mut(id) {
            session.set_jump_cursor(x, y);
        }
    }

    /// Jump zone of `id`: the primary's zone, zero for secondaries.
    fn jump_zone_of(&self, id: SessionId) -> i32 {
        if id.is_primary() {
            self.primary.jump_zone_size()
        } else {
            0
        }
    }

    fn enter_screen(&mut self, id: SessionId, x: i32, y: i32, for_screensaver: bool) {
        let mask = self.primary.toggle_mask();
        if id.is_primary() {
            self.primary.enter(x, y, self.seq, for_screensaver);
        } else if let Some(session) = self.registry.get_mut(id) {
            session.enter(x, y, self.seq, mask, for_screensaver);
        }
    }

    fn leave_screen(&mut self, id: SessionId) -> bool {
        if id.is_primary() {
            self.primary.leave()
        } else {
            self.registry.get_mut(id).map_or(true, ScreenSession::leave)
        }
    }

    fn move_on_screen(&mut self, id: SessionId, x: i32, y: i32) {
        if id.is_primary() {
            self.primary.warp_cursor(x, y);
        } else if let Some(session) = self.registry.get(id) {
            session.mouse_move(x, y);
        }
    }

    fn set_clipboard_dirty(&mut self, id: SessionId, slot: ClipboardSlot, dirty: bool) {
        if id.is_primary() {
            self.primary_dirty[slot.index()] = dirty;
        } else if let Some(session) = self.registry.get_mut(id) {
            session.set_clipboard_dirty(slot, dirty);
        }
    }

    /// Pushes the shared payload of `slot` to `id` if it has not seen it.
    fn push_clipboard(&mut self, id: SessionId, slot: ClipboardSlot) {
        let data = self.clipboard.data(slot);
        if id.is_primary() {
            if self.primary_dirty[slot.index()] {
                self.primary_dirty[slot.index()] = false;
                self.primary.set_clipboard(slot, data);
            }
        } else if let Some(session) = self.registry.get_mut(id) {
            session.set_clipboard(slot, data);
        }
    }

    /// Resolves the landing screen and position past `dir` of `src`.
    fn map_to_neighbor(
        &self,
        src: SessionId,
        dir: Direction,
        x: i32,
        y: i32,
    ) -> Option<(SessionId, i32, i32)> {
        let src_name = self.registry.name_of(src)?;
        let registry = &self.registry;
        let primary = &*self.primary;
        let nav = Navigator::new(
            &self.topology,
            registry.primary_name(),
            primary.jump_zone_size(),
            |name| match registry.id_of(name)? {
                id if id.is_primary() => Some(primary.shape()),
                id => registry.get(id).map(ScreenSession::shape),
            },
        );
        let (dst, x, y) = nav.map_to_neighbor(src_name, dir, x, y)?;
        Some((registry.id_of(&dst)?, x, y))
    }

    /// Direct neighbour of `src` on `dir`, without the canonical space walk.
    fn neighbor(&self, src: SessionId, dir: Direction, x: i32, y: i32) -> Option<SessionId> {
        let src_name = self.registry.name_of(src)?;
        let registry = &self.registry;
        let primary = &*self.primary;
        let nav = Navigator::new(
            &self.topology,
            registry.primary_name(),
            primary.jump_zone_size(),
            |name| match registry.id_of(name)? {
                id if id.is_primary() => Some(primary.shape()),
                id => registry.get(id).map(ScreenSession::shape),
            },
        );
        let (dst, _, _) = nav.neighbor(src_name, dir, x, y)?;
        registry.id_of(&dst)
    }

    // ── Switching ────────────────────────────────────────────────────────────

    /// Returns `true` if `(x, y)` on the active screen is in a locked corner.
    fn in_locked_corner(&self, x: i32, y: i32) -> bool {
        let global = self.topology.global_options();
        let options = self
            .registry
            .name_of(self.active)
            .and_then(|name| self.topology.options(name))
            .filter(|own| own.contains(OptionId::SWITCH_CORNERS))
            .unwrap_or(global);
        let Some(corners) = options.get(OptionId::SWITCH_CORNERS) else {
            return false;
        };
        let size = options.get(OptionId::SWITCH_CORNER_SIZE).unwrap_or(0);
        let Some(shape) = self.shape_of(self.active) else {
            return false;
        };
        shape
            .corner_at(x, y, size)
            .intersects(CornerMask(corners as u32))
    }

    fn is_switch_okay(
        &mut self,
        candidate: Option<SessionId>,
        dir: Direction,
        x: i32,
        y: i32,
        x_active: i32,
        y_active: i32,
    ) -> bool {
        debug!(screen = %self.active_name(), %dir, "try to leave");
        let gate = SwitchGate {
            in_locked_corner: self.in_locked_corner(x_active, y_active),
            locked_to_screen: self.is_locked_to_screen(),
            toggle_mask: self.primary.toggle_mask(),
        };
        self.switch
            .is_switch_okay(candidate, dir, x, y, gate, &mut self.timers)
    }

    fn no_switch(&mut self) {
        let Some(shape) = self.shape_of(self.active) else {
            return;
        };
        let zone = self.primary.jump_zone_size();
        self.switch.no_switch(&self.cursor, shape, zone);
    }

    /// Moves focus to `dst` with the cursor at `(x, y)`.
    pub fn switch_screen(&mut self, dst: SessionId, x: i32, y: i32, for_screensaver: bool) {
        let Some(shape) = self.shape_of(dst) else {
            debug!(%dst, "switch target is gone");
            self.switch.stop_switch();
            return;
        };
        if !shape.contains(x, y) {
            warn!(screen = %self.name_of(dst), x, y, "switch position is outside the screen");
        }

        self.switch.stop_switch();
        self.cursor.x = x;
        self.cursor.y = y;
        self.cursor.reset_deltas();

        if dst == self.active {
            self.move_on_screen(dst, x, y);
            return;
        }

        let from = self.name_of(self.active);
        let to = self.name_of(dst);
        info!(%from, %to, x, y, "switch screen");

        if !self.leave_screen(self.active) {
            warn!(screen = %from, "can't leave screen");
            return;
        }

        // Capture the primary's clipboards before another screen takes focus.
        if self.active.is_primary() && self.clipboard.is_sharing() {
            for slot in ClipboardSlot::ALL {
                if self.clipboard.owner(slot) == self.registry.primary_name() {
                    let seq = self.clipboard.seq(slot);
                    let data = self.primary.clipboard(slot);
                    self.on_clipboard_changed(SessionId::PRIMARY, slot, seq, data);
                }
            }
        }

        self.active = dst;
        self.seq = self.seq.wrapping_add(1);
        self.enter_screen(dst, x, y, for_screensaver);

        if self.clipboard.is_sharing() {
            for slot in ClipboardSlot::ALL {
                if !self.clipboard.fits(self.clipboard.data(slot).len()) {
                    debug!(?slot, "clipboard exceeds the size limit, not sent");
                    continue;
                }
                self.push_clipboard(dst, slot);
            }
        }

        self.notify(ServerNotice::ScreenSwitched { from, to });
    }

    /// Switches to `dst` at the position remembered for it.
    fn jump_to_screen(&mut self, dst: SessionId) {
        let (x, y) = self.cursor();
        self.set_jump_cursor(self.active, x, y);
        let Some((jx, jy)) = self.jump_cursor_of(dst) else {
            return;
        };
        self.switch_screen(dst, jx, jy, false);
    }

    /// Absolute motion on the primary.  Returns `true` if focus moved.
    pub fn on_mouse_move_primary(&mut self, x: i32, y: i32) -> bool {
        if !self.active.is_primary() {
            return false;
        }
        self.cursor.push_delta(x - self.cursor.x, y - self.cursor.y);
        self.cursor.x = x;
        self.cursor.y = y;

        let shape = self.primary.shape();
        let zone = self.jump_zone_of(SessionId::PRIMARY);

        let xc = if x < shape.x + zone {
            shape.x
        } else if x >= shape.right() - zone {
            shape.right() - 1
        } else {
            x
        };
        let yc = if y < shape.y + zone {
            shape.y
        } else if y >= shape.bottom() - zone {
            shape.bottom() - 1
        } else {
            y
        };

        // One way out per event; left and right take precedence in corners.
        let (dir, cx, cy) = if x < shape.x + zone {
            (Direction::Left, x - zone, y)
        } else if x >= shape.right() - zone {
            (Direction::Right, x + zone, y)
        } else if y < shape.y + zone {
            (Direction::Top, x, y - zone)
        } else if y >= shape.bottom() - zone {
            (Direction::Bottom, x, y + zone)
        } else {
            self.no_switch();
            return false;
        };

        let (candidate, nx, ny) = match self.map_to_neighbor(SessionId::PRIMARY, dir, cx, cy) {
            Some((dst, nx, ny)) => (Some(dst), nx, ny),
            None => (None, cx, cy),
        };
        if self.is_switch_okay(candidate, dir, nx, ny, xc, yc) {
            if let Some(dst) = candidate {
                self.switch_screen(dst, nx, ny, false);
                return true;
            }
        }
        false
    }

    /// Relative motion while a secondary is active.
    pub fn on_mouse_move_secondary(&mut self, dx: i32, dy: i32) {
        if self.active.is_primary() {
            return;
        }
        let active = self.active;
        if self.relative_moves && self.locked_to_screen {
            if let Some(session) = self.registry.get(active) {
                session.mouse_relative_move(dx, dy);
            }
            return;
        }
        let Some(shape) = self.shape_of(active) else {
            return;
        };

        let (x_old, y_old) = self.cursor();
        self.cursor.push_delta(dx, dy);
        self.cursor.x += dx;
        self.cursor.y += dy;
        let (x, y) = self.cursor();

        let xc = x.clamp(shape.x, shape.right() - 1);
        let yc = y.clamp(shape.y, shape.bottom() - 1);

        let dir = if x < shape.x {
            Some(Direction::Left)
        } else if x > shape.right() - 1 {
            Some(Direction::Right)
        } else if y < shape.y {
            Some(Direction::Top)
        } else if y > shape.bottom() - 1 {
            Some(Direction::Bottom)
        } else {
            None
        };

        let jump = match dir {
            None => {
                // Off the edge being waited on: cancel the wait, arm the tap.
                if self.switch.target().is_some() {
                    let zone = self.primary.jump_zone_size();
                    let clear_wait = match self.switch.direction() {
                        Some(Direction::Left) => x >= shape.x + zone,
                        Some(Direction::Right) => x <= shape.right() - 1 - zone,
                        Some(Direction::Top) => y >= shape.y + zone,
                        Some(Direction::Bottom) => y <= shape.bottom() - 1 - zone,
                        None => false,
                    };
                    if clear_wait {
                        self.no_switch();
                    }
                }
                None
            }
            Some(dir) => {
                let landing = self.map_to_neighbor(active, dir, x, y);
                let (candidate, nx, ny) = match landing {
                    Some((dst, nx, ny)) => (Some(dst), nx, ny),
                    None => (None, x, y),
                };
                if self.is_switch_okay(candidate, dir, nx, ny, xc, yc) {
                    candidate.map(|dst| (dst, nx, ny))
                } else {
                    None
                }
            }
        };

        match jump {
            Some((dst, nx, ny)) => self.switch_screen(dst, nx, ny, false),
            None => {
                let x = (x_old + dx).clamp(shape.x, shape.right() - 1);
                let y = (y_old + dy).clamp(shape.y, shape.bottom() - 1);
                self.cursor.x = x;
                self.cursor.y = y;
                if (x, y) != (x_old, y_old) {
                    trace!(screen = %self.active_name(), x, y, "move");
                    self.move_on_screen(active, x, y);
                }
            }
        }
    }

    /// Re-centres the cursor on a secondary after relative moves end.
    fn stop_relative_moves(&mut self) {
        if !self.relative_moves || self.active.is_primary() {
            return;
        }
        let Some(shape) = self.shape_of(self.active) else {
            return;
        };
        let (x, y) = shape.center();
        self.cursor.x = x;
        self.cursor.y = y;
        self.cursor.reset_deltas();
        debug!(screen = %self.active_name(), x, y, "synchronize move");
        self.move_on_screen(self.active, x, y);
    }

    fn on_shape_changed(&mut self, id: SessionId) {
        let Some((x, y)) = self.cursor_pos_of(id) else {
            return;
        };
        self.set_jump_cursor(id, x, y);
        if id == self.active {
            self.cursor.x = x;
            self.cursor.y = y;
        }
        if id.is_primary() {
            if self.active.is_primary() {
                let (x, y) = self.cursor();
                self.on_mouse_move_primary(x, y);
            } else {
                self.on_mouse_move_secondary(0, 0);
            }
        }
    }

    fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::SwitchWait => {
                let Some(expired) = self.switch.take_wait(&fired) else {
                    trace!("stale switch timer");
                    return;
                };
                if self.is_locked_to_screen() {
                    debug!("locked to screen");
                    self.switch.stop_switch();
                    return;
                }
                self.switch_screen(expired.target, expired.x, expired.y, false);
            }
            TimerKind::CloseDeadline(id) => {
                if let Some(session) = self.registry.expire_close(id, &fired) {
                    warn!(screen = %session.name(), "forced disconnection of client");
                    drop(session);
                    self.check_all_disconnected();
                }
            }
        }
    }

    // ── Primary input ────────────────────────────────────────────────────────

    fn on_primary_input(&mut self, input: PrimaryInput) {
        match input {
            PrimaryInput::KeyDown { key, mask, button } => {
                self.relay_key(|s| s.key_down(key, mask, button));
            }
            PrimaryInput::KeyUp { key, mask, button } => {
                self.relay_key(|s| s.key_up(key, mask, button));
            }
            PrimaryInput::KeyRepeat {
                key,
                mask,
                count,
                button,
            } => {
                if let Some(session) = self.registry.get(self.active) {
                    session.key_repeat(key, mask, count, button);
                }
            }
            PrimaryInput::MouseDown { button } => {
                if let Some(session) = self.registry.get(self.active) {
                    session.mouse_down(button);
                }
            }
            PrimaryInput::MouseUp { button } => {
                if let Some(session) = self.registry.get(self.active) {
                    session.mouse_up(button);
                }
            }
            PrimaryInput::MotionOnPrimary { x, y } => {
                self.on_mouse_move_primary(x, y);
            }
            PrimaryInput::MotionOnSecondary { dx, dy } => self.on_mouse_move_secondary(dx, dy),
            PrimaryInput::Wheel { dx, dy } => {
                if let Some(session) = self.registry.get(self.active) {
                    session.mouse_wheel(dx, dy);
                }
            }
            PrimaryInput::ClipboardGrabbed { slot, seq } => {
                self.on_clipboard_grabbed(SessionId::PRIMARY, slot, seq);
            }
            PrimaryInput::ClipboardChanged { slot, seq } => {
                let data = self.primary.clipboard(slot);
                self.on_clipboard_changed(SessionId::PRIMARY, slot, seq, data);
            }
            PrimaryInput::ScreenSaver { activated } => self.on_screensaver(activated),
            PrimaryInput::ShapeChanged => self.on_shape_changed(SessionId::PRIMARY),
        }
    }

    /// Sends a key event to the active screen, or to every broadcast target.
    fn relay_key<F>(&self, send: F)
    where
        F: Fn(&ScreenSession),
    {
        if !self.broadcasting {
            if let Some(session) = self.registry.get(self.active) {
                send(session);
            }
            return;
        }
        for session in self.registry.sessions() {
            if self.broadcast_targets.contains(session.name()) {
                send(session);
            }
        }
    }

    fn on_screensaver(&mut self, activated: bool) {
        if !self.screensaver_sync {
            debug!(activated, "screen saver sync is off");
            return;
        }
        debug!(activated, "screen saver");
        if activated {
            let (x, y) = self.cursor();
            self.saver = Some(SaverRestore {
                screen: self.active,
                x,
                y,
            });
            if !self.active.is_primary() {
                self.switch_screen(SessionId::PRIMARY, 0, 0, true);
            }
        } else {
            if let Some(restore) = self.saver {
                if !restore.screen.is_primary() {
                    if let Some(shape) = self.shape_of(restore.screen) {
                        // The screen may have changed size meanwhile.
                        let zone = self.jump_zone_of(restore.screen);
                        let x = clamp_outside_zone(restore.x, shape.x, shape.width, zone);
                        let y = clamp_outside_zone(restore.y, shape.y, shape.height, zone);
                        self.switch_screen(restore.screen, x, y, false);
                    }
                }
            }
            self.saver = None;
        }

        self.primary.screensaver(activated);
        for session in self.registry.sessions() {
            session.screensaver(activated);
        }
    }

    // ── Clipboard ────────────────────────────────────────────────────────────

    fn on_clipboard_grabbed(&mut self, grabber: SessionId, slot: ClipboardSlot, seq: u32) {
        if !self.clipboard.is_sharing() {
            return;
        }
        let grabber_name = self.name_of(grabber);
        let previous = self.clipboard.owner(slot).clone();
        if !self
            .clipboard
            .grab(slot, &grabber_name, grabber.is_primary(), seq)
        {
            info!(screen = %grabber_name, ?slot, seq, "ignored stale clipboard grab");
            return;
        }
        info!(screen = %grabber_name, ?slot, from = %previous, "clipboard grabbed");

        for id in self.registry.client_ids() {
            if id == grabber {
                self.set_clipboard_dirty(id, slot, false);
            } else if let Some(session) = self.registry.get_mut(id) {
                session.grab_clipboard(slot, seq);
            }
        }
        if grabber.is_primary() {
            self.primary_dirty[slot.index()] = false;
        } else {
            self.primary.grab_clipboard(slot);
            self.primary_dirty[slot.index()] = true;
        }

        // The primary's new contents must reach the secondary that has focus.
        if grabber.is_primary() && !self.active.is_primary() {
            for slot in ClipboardSlot::ALL {
                let seq = self.clipboard.seq(slot);
                let data = self.primary.clipboard(slot);
                self.on_clipboard_changed(SessionId::PRIMARY, slot, seq, data);
            }
        }
    }

    fn on_clipboard_changed(&mut self, sender: SessionId, slot: ClipboardSlot, seq: u32, data: Vec<u8>) {
        let sender_name = self.name_of(sender);
        let len = data.len();
        match self.clipboard.update(slot, &sender_name, seq, data) {
            UpdateOutcome::Accepted => {
                info!(screen = %sender_name, ?slot, seq, len, "clipboard updated");
                self.primary_dirty[slot.index()] = !sender.is_primary();
                for session in self.registry.sessions_mut() {
                    let dirty = session.id() != sender;
                    session.set_clipboard_dirty(slot, dirty);
                }
                self.push_clipboard(self.active, slot);
            }
            UpdateOutcome::Stale => {
                info!(screen = %sender_name, ?slot, seq, "ignored missequenced clipboard update");
            }
            UpdateOutcome::NotOwner => {
                debug!(screen = %sender_name, ?slot, "ignored clipboard update from non-owner");
            }
            UpdateOutcome::TooLarge => info!(
                screen = %sender_name,
                ?slot,
                len,
                limit = self.clipboard.max_size(),
                "clipboard over the size limit, not shared"
            ),
            UpdateOutcome::Unchanged => {
                debug!(screen = %sender_name, ?slot, "ignored unchanged clipboard update");
            }
            UpdateOutcome::Disabled => {}
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::SwitchToScreen(name) => {
                let canonical = self
                    .topology
                    .canonical_name(&name)
                    .cloned()
                    .unwrap_or(name);
                match self.registry.id_of(&canonical) {
                    Some(id) => self.jump_to_screen(id),
                    None => debug!(screen = %canonical, "screen not connected"),
                }
            }
            Command::SwitchInDirection(dir) => {
                let (x, y) = self.cursor();
                match self.neighbor(self.active, dir, x, y) {
                    Some(id) => self.jump_to_screen(id),
                    None => debug!(%dir, "no neighbor"),
                }
            }
            Command::ToggleScreen => {
                let screens = self.registry.live_screens();
                let Some(pos) = screens.iter().position(|(_, id)| *id == self.active) else {
                    return;
                };
                let (_, next) = &screens[(pos + 1) % screens.len()];
                if *next != self.active {
                    self.jump_to_screen(*next);
                }
            }
            Command::LockCursorToScreen(toggle) => {
                let locked = toggle.apply(self.locked_to_screen);
                if locked != self.locked_to_screen {
                    self.locked_to_screen = locked;
                    info!(locked, "cursor lock to screen changed");
                    let sides = self.active_primary_sides();
                    self.primary.reconfigure(sides);
                    if !locked {
                        self.stop_relative_moves();
                    }
                }
            }
            Command::KeyboardBroadcast { state, targets } => {
                let broadcasting = state.apply(self.broadcasting);
                if broadcasting != self.broadcasting || targets != self.broadcast_targets {
                    self.broadcasting = broadcasting;
                    self.broadcast_targets = targets;
                    debug!(broadcasting, targets = ?self.broadcast_targets, "keyboard broadcast");
                }
            }
        }
    }

    fn notify(&self, notice: ServerNotice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }
}

/// Clamps `v` into `[origin, origin + extent)` while staying `zone` pixels
/// away from both ends.
fn clamp_outside_zone(v: i32, origin: i32, extent: i32, zone: i32) -> i32 {
    if v < origin + zone {
        origin + zone
    } else if v >= origin + extent - zone {
        origin + extent - zone - 1
    } else {
        v
    }
}
