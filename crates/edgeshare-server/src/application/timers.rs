//! Cancellable one-shot timers that post back into the server event queue.
//!
//! The server never sleeps itself.  When it needs "do X in five seconds" it
//! asks [`Timers`] for a handle: a spawned task sleeps and then enqueues a
//! [`ServerEvent::Timer`] carrying the handle's [`TimerToken`].  The server
//! compares the token against the handle it is still holding, so a timer that
//! was cancelled (or replaced) but fired anyway is silently ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::application::screen_session::SessionId;
use crate::application::server::ServerEvent;

/// Unique generation number of one started timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// What a timer was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The cursor has rested on an edge for the configured switch delay.
    SwitchWait,
    /// A closing session did not hang up in time.
    CloseDeadline(SessionId),
}

/// Payload of [`ServerEvent::Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub token: TimerToken,
    pub kind: TimerKind,
}

/// A running timer.  Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: TimerToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn token(&self) -> TimerToken {
        self.token
    }

    /// Returns `true` if `fired` was produced by this handle.
    pub fn matches(&self, fired: &TimerFired) -> bool {
        self.token == fired.token
    }

    /// Stops the timer.  An event already queued by it becomes stale.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Factory for [`TimerHandle`]s bound to one server event queue.
#[derive(Debug)]
pub struct Timers {
    events: mpsc::Sender<ServerEvent>,
    generation: u64,
}

impl Timers {
    pub fn new(events: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            events,
            generation: 0,
        }
    }

    /// Starts a timer that fires once after `after`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, kind: TimerKind, after: Duration) -> TimerHandle {
        self.generation += 1;
        let token = TimerToken(self.generation);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // A closed queue means the server has already stopped.
            let _ = events
                .send(ServerEvent::Timer(TimerFired { token, kind }))
                .await;
        });
        trace!(?kind, ?token, ?after, "timer started");
        TimerHandle { token, task }
    }
}
