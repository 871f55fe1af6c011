//! Application layer for the edgeshare server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `edgeshare_core`) and the infrastructure (sockets, files,
//! the local desktop).
//!
//! Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a user goal (e.g., "move the
//!   keyboard and mouse focus to the laptop when the cursor crosses the right
//!   edge of the desk screen").
//! - **Depends on abstractions** such as the [`primary::PrimaryScreen`] trait
//!   rather than on a concrete desktop backend.
//! - **Performs no direct I/O**.  Outbound protocol messages are pushed onto
//!   per-session channels; timers post events back into the server queue.
//!
//! # Sub-modules
//!
//! - **`primary`** – The trait the server uses to talk to the local screen and
//!   the input events that screen produces.
//!
//! - **`screen_session`** – One connected secondary screen: its shape, cursor,
//!   clipboard dirty flags, and the outbound message channel.
//!
//! - **`handshake`** – The hello / hello-back / screen-info state machine that
//!   turns a fresh connection into a session.  It is sans-IO: it consumes
//!   payloads and returns the messages to send.
//!
//! - **`navigation`** – Converts a cursor position on an edge into a position
//!   on the neighbouring screen, walking past offline or narrow screens.
//!
//! - **`switch_control`** – Decides whether an edge crossing actually switches
//!   screens (double tap, switch delay, locked corners, required modifiers).
//!
//! - **`clipboard`** – Tracks who owns each clipboard slot and rejects stale
//!   grabs and updates.
//!
//! - **`session_registry`** – Live sessions by canonical name, plus sessions
//!   that are closing and waiting for their peer to hang up.
//!
//! - **`timers`** – Cancellable one-shot timers that post back into the server
//!   event queue.
//!
//! - **`server`** – The orchestrator.  It owns all of the above and is the only
//!   code that mutates shared state.

pub mod clipboard;
pub mod handshake;
pub mod navigation;
pub mod primary;
pub mod screen_session;
pub mod server;
pub mod session_registry;
pub mod switch_control;
pub mod timers;
