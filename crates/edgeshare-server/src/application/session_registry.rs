//! SessionRegistry: which screens are connected, and which are hanging up.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//!   handshake ok ──► adopt ──► live ──► close ──► closing ──► removed
//!                      │                   ▲          │
//!                      │ unknown / busy    │          │ peer hangs up, or
//!                      └───────────────────┘          │ deadline fires
//!                                                     ▼
//! ```
//!
//! - *Live* sessions are indexed by their canonical screen name; at most one
//!   session per name.  The primary screen is always considered live under
//!   [`SessionId::PRIMARY`] but has no [`ScreenSession`].
//! - *Closing* sessions have been asked to disconnect.  They are kept, with a
//!   deadline timer, until their stream closes.  Nothing they send is
//!   processed any more.

use std::collections::{BTreeMap, HashMap};

use edgeshare_core::{Message, ScreenName, Topology};
use thiserror::Error;

use crate::application::screen_session::{ScreenSession, SessionId};
use crate::application::timers::{TimerFired, TimerHandle};

/// Why a finished handshake was not adopted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdoptError {
    #[error("unknown screen name: {0}")]
    UnknownName(ScreenName),
    #[error("screen already connected: {0}")]
    Busy(ScreenName),
}

impl AdoptError {
    /// The error message sent to the peer before closing.
    pub fn reply(&self) -> Message {
        match self {
            AdoptError::UnknownName(_) => Message::Unknown,
            AdoptError::Busy(_) => Message::Busy,
        }
    }
}

#[derive(Debug)]
struct PendingClose {
    session: ScreenSession,
    deadline: TimerHandle,
}

/// Live and closing sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    primary: ScreenName,
    by_name: BTreeMap<ScreenName, SessionId>,
    live: HashMap<SessionId, ScreenSession>,
    closing: HashMap<SessionId, PendingClose>,
}

impl SessionRegistry {
    pub fn new(primary: ScreenName) -> Self {
        Self {
            primary,
            by_name: BTreeMap::new(),
            live: HashMap::new(),
            closing: HashMap::new(),
        }
    }

    pub fn primary_name(&self) -> &ScreenName {
        &self.primary
    }

    /// Makes `session` live under its canonical name.
    ///
    /// On failure the session is handed back so the caller can reject it.
    pub fn adopt(
        &mut self,
        mut session: ScreenSession,
        topology: &Topology,
    ) -> Result<SessionId, (AdoptError, ScreenSession)> {
        let Some(canonical) = topology.canonical_name(session.name()).cloned() else {
            let err = AdoptError::UnknownName(session.name().clone());
            return Err((err, session));
        };
        if canonical == self.primary || self.by_name.contains_key(&canonical) {
            return Err((AdoptError::Busy(canonical), session));
        }
        let id = session.id();
        session.set_name(canonical.clone());
        self.by_name.insert(canonical, id);
        self.live.insert(id, session);
        Ok(id)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    pub fn get(&self, id: SessionId) -> Option<&ScreenSession> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut ScreenSession> {
        self.live.get_mut(&id)
    }

    /// Live session id for a canonical name, including the primary.
    pub fn id_of(&self, name: &ScreenName) -> Option<SessionId> {
        if name == &self.primary {
            return Some(SessionId::PRIMARY);
        }
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: SessionId) -> Option<&ScreenName> {
        if id.is_primary() {
            return Some(&self.primary);
        }
        self.live.get(&id).map(ScreenSession::name)
    }

    /// Returns `true` for the primary and for every live session.
    pub fn is_live(&self, id: SessionId) -> bool {
        id.is_primary() || self.live.contains_key(&id)
    }

    pub fn is_closing(&self, id: SessionId) -> bool {
        self.closing.contains_key(&id)
    }

    /// All live screens, primary included, sorted by name.
    pub fn live_screens(&self) -> Vec<(ScreenName, SessionId)> {
        let mut screens: Vec<(ScreenName, SessionId)> = self
            .by_name
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        screens.push((self.primary.clone(), SessionId::PRIMARY));
        screens.sort_by(|a, b| a.0.cmp(&b.0));
        screens
    }

    /// Ids of live secondary sessions, in name order.
    pub fn client_ids(&self) -> Vec<SessionId> {
        self.by_name.values().copied().collect()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ScreenSession> {
        self.live.values()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut ScreenSession> {
        self.live.values_mut()
    }

    /// Number of live secondary sessions.
    pub fn client_count(&self) -> usize {
        self.live.len()
    }

    pub fn closing_count(&self) -> usize {
        self.closing.len()
    }

    /// Returns `true` when only the primary is left.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.closing.is_empty()
    }

    // ── Removal ──────────────────────────────────────────────────────────────

    /// Takes a live session out of the registry.
    pub fn remove(&mut self, id: SessionId) -> Option<ScreenSession> {
        let session = self.live.remove(&id)?;
        self.by_name.remove(session.name());
        Some(session)
    }

    /// Parks a session that was asked to disconnect until its stream closes
    /// or `deadline` fires.
    pub fn begin_close(&mut self, session: ScreenSession, deadline: TimerHandle) {
        self.closing
            .insert(session.id(), PendingClose { session, deadline });
    }

    /// Removes a closing session, cancelling its deadline.
    pub fn finish_close(&mut self, id: SessionId) -> Option<ScreenSession> {
        let pending = self.closing.remove(&id)?;
        pending.deadline.cancel();
        Some(pending.session)
    }

    /// Removes a closing session whose deadline produced `fired`.
    ///
    /// A stale timer event returns `None` and changes nothing.
    pub fn expire_close(&mut self, id: SessionId, fired: &TimerFired) -> Option<ScreenSession> {
        let matches = self
            .closing
            .get(&id)
            .is_some_and(|p| p.deadline.matches(fired));
        if !matches {
            return None;
        }
        self.finish_close(id)
    }

    /// Drops every session, live and closing.  Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.live.len() + self.closing.len();
        self.by_name.clear();
        self.live.clear();
        self.closing.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgeshare_core::{ProtocolVariant, ScreenShape};
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::server::ServerEvent;
    use crate::application::timers::{TimerKind, Timers};

    fn topology() -> Topology {
        let mut t = Topology::new();
        t.add_screen("desk").unwrap();
        t.add_screen("laptop").unwrap();
        t.add_alias("laptop", "macbook").unwrap();
        t
    }

    fn session(name: &str) -> ScreenSession {
        let (tx, _rx) = mpsc::unbounded_channel();
        ScreenSession::new(
            ScreenName::from(name),
            ProtocolVariant::CURRENT,
            ScreenShape::new(0, 0, 1280, 800),
            (0, 0),
            tx,
        )
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(ScreenName::from("desk"))
    }

    // ── Adopt ────────────────────────────────────────────────────────────────

    #[test]
    fn test_adopt_by_alias_uses_canonical_name() {
        // Arrange
        let mut reg = registry();

        // Act
        let id = reg.adopt(session("MacBook"), &topology()).unwrap();

        // Assert
        assert_eq!(reg.name_of(id).map(ScreenName::as_str), Some("laptop"));
        assert_eq!(reg.id_of(&ScreenName::from("LAPTOP")), Some(id));
        assert_eq!(reg.client_count(), 1);
    }

    #[test]
    fn test_adopt_unknown_name_is_rejected() {
        let mut reg = registry();

        let (err, session) = reg.adopt(session("tablet"), &topology()).unwrap_err();

        assert_eq!(err, AdoptError::UnknownName(ScreenName::from("tablet")));
        assert_eq!(err.reply(), Message::Unknown);
        assert_eq!(session.name().as_str(), "tablet");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_adopt_duplicate_live_name_is_busy() {
        let mut reg = registry();
        reg.adopt(session("laptop"), &topology()).unwrap();

        let (err, _) = reg.adopt(session("macbook"), &topology()).unwrap_err();

        assert_eq!(err, AdoptError::Busy(ScreenName::from("laptop")));
        assert_eq!(err.reply(), Message::Busy);
    }

    #[test]
    fn test_adopt_primary_name_is_busy() {
        let mut reg = registry();

        let (err, _) = reg.adopt(session("desk"), &topology()).unwrap_err();

        assert!(matches!(err, AdoptError::Busy(_)));
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    #[test]
    fn test_primary_is_always_live() {
        let reg = registry();

        assert!(reg.is_live(SessionId::PRIMARY));
        assert_eq!(reg.id_of(&ScreenName::from("desk")), Some(SessionId::PRIMARY));
        assert_eq!(reg.live_screens().len(), 1);
    }

    #[test]
    fn test_live_screens_are_sorted_by_name() {
        let mut t = topology();
        t.add_screen("alpha").unwrap();
        let mut reg = registry();
        reg.adopt(session("laptop"), &t).unwrap();
        reg.adopt(session("alpha"), &t).unwrap();

        let names: Vec<String> = reg
            .live_screens()
            .into_iter()
            .map(|(n, _)| n.as_str().to_string())
            .collect();

        assert_eq!(names, vec!["alpha", "desk", "laptop"]);
    }

    // ── Close lifecycle ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_close_then_stream_end_removes_session() {
        // Arrange
        let (tx, _rx) = mpsc::channel::<ServerEvent>(8);
        let mut timers = Timers::new(tx);
        let mut reg = registry();
        let id = reg.adopt(session("laptop"), &topology()).unwrap();

        // Act
        let live = reg.remove(id).unwrap();
        reg.begin_close(live, timers.start(TimerKind::CloseDeadline(id), Duration::from_secs(5)));

        // Assert
        assert!(!reg.is_live(id));
        assert!(reg.is_closing(id));
        assert!(!reg.is_empty());
        assert!(reg.finish_close(id).is_some());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_removes_only_with_matching_token() {
        let (tx, mut rx) = mpsc::channel::<ServerEvent>(8);
        let mut timers = Timers::new(tx);
        let mut reg = registry();
        let id = reg.adopt(session("laptop"), &topology()).unwrap();
        let stale = timers.start(TimerKind::SwitchWait, Duration::from_millis(1));
        let live = reg.remove(id).unwrap();
        reg.begin_close(live, timers.start(TimerKind::CloseDeadline(id), Duration::from_secs(5)));

        // The unrelated timer fires first and must not reclaim the session.
        let first = match rx.recv().await {
            Some(ServerEvent::Timer(fired)) => fired,
            other => panic!("expected timer, got {other:?}"),
        };
        assert!(stale.matches(&first));
        assert!(reg.expire_close(id, &first).is_none());

        let deadline = match rx.recv().await {
            Some(ServerEvent::Timer(fired)) => fired,
            other => panic!("expected timer, got {other:?}"),
        };
        assert!(reg.expire_close(id, &deadline).is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut reg = registry();
        reg.adopt(session("laptop"), &topology()).unwrap();

        assert_eq!(reg.clear(), 1);
        assert!(reg.is_empty());
        assert!(reg.is_live(SessionId::PRIMARY));
    }
}
