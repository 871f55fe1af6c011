//! Console command source.
//!
//! Reads one command per line (normally from stdin) and turns it into a
//! [`ServerEvent`].  This stands in for the hotkeys a desktop backend would
//! bind, and is handy when the server runs with a [`HeadlessPrimary`].
//!
//! ```text
//! switch <screen>            jump to a screen by name or alias
//! left | right | up | down   jump to the neighbour in that direction
//! toggle                     cycle through connected screens
//! lock [on|off|toggle]       lock the cursor to the current screen
//! broadcast on|off|toggle [screen:screen|*]
//! quit                       stop the server
//! ```
//!
//! [`HeadlessPrimary`]: crate::infrastructure::primary::HeadlessPrimary

use async_trait::async_trait;
use edgeshare_core::{Direction, ScreenName};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::server::{BroadcastTargets, Command, ServerEvent, Toggle};

/// A console line that is not a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("expected on, off or toggle, got `{0}`")]
    InvalidToggle(String),
}

/// Anything that produces server events on its own schedule.
#[async_trait]
pub trait EventSource: Send {
    /// The next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<ServerEvent>;
}

/// Forwards every event of `source` into the server queue.
pub async fn pump<S: EventSource>(mut source: S, events: mpsc::Sender<ServerEvent>) {
    while let Some(event) = source.next_event().await {
        if events.send(event).await.is_err() {
            debug!("server stopped, console pump exiting");
            return;
        }
    }
    debug!("console closed");
}

/// Line-oriented command reader.
pub struct ConsoleSource<R> {
    lines: Lines<BufReader<R>>,
}

impl ConsoleSource<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> ConsoleSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for ConsoleSource<R> {
    async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!(%err, "console read failed");
                    return None;
                }
            };
            match parse_line(&line) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => {}
                Err(err) => warn!(%err, "ignored console input"),
            }
        }
    }
}

/// Parses one console line.  Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ServerEvent>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    if verb.starts_with('#') {
        return Ok(None);
    }

    let command = match verb.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "shutdown" => return Ok(Some(ServerEvent::Shutdown)),
        "switch" => {
            let name = words.next().ok_or(ConsoleError::MissingArgument("switch"))?;
            Command::SwitchToScreen(ScreenName::from(name))
        }
        "left" => Command::SwitchInDirection(Direction::Left),
        "right" => Command::SwitchInDirection(Direction::Right),
        "up" | "top" => Command::SwitchInDirection(Direction::Top),
        "down" | "bottom" => Command::SwitchInDirection(Direction::Bottom),
        "toggle" => Command::ToggleScreen,
        "lock" => Command::LockCursorToScreen(parse_toggle(words.next().unwrap_or("toggle"))?),
        "broadcast" => {
            let state = words.next().ok_or(ConsoleError::MissingArgument("broadcast"))?;
            Command::KeyboardBroadcast {
                state: parse_toggle(state)?,
                targets: BroadcastTargets::parse(words.next().unwrap_or("*")),
            }
        }
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(ServerEvent::Command(command)))
}

fn parse_toggle(word: &str) -> Result<Toggle, ConsoleError> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(Toggle::On),
        "off" | "0" | "false" => Ok(Toggle::Off),
        "toggle" => Ok(Toggle::Toggle),
        _ => Err(ConsoleError::InvalidToggle(word.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Command {
        match parse_line(line) {
            Ok(Some(ServerEvent::Command(command))) => command,
            other => panic!("expected a command for {line:?}, got {other:?}"),
        }
    }

    // ── Parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_switch_and_directions() {
        assert_eq!(
            command("switch laptop"),
            Command::SwitchToScreen(ScreenName::from("laptop"))
        );
        assert_eq!(command("  LEFT "), Command::SwitchInDirection(Direction::Left));
        assert_eq!(command("up"), Command::SwitchInDirection(Direction::Top));
        assert_eq!(command("toggle"), Command::ToggleScreen);
    }

    #[test]
    fn test_parse_lock_defaults_to_toggle() {
        assert_eq!(command("lock"), Command::LockCursorToScreen(Toggle::Toggle));
        assert_eq!(command("lock off"), Command::LockCursorToScreen(Toggle::Off));
    }

    #[test]
    fn test_parse_broadcast_with_targets() {
        assert_eq!(
            command("broadcast on laptop:tablet"),
            Command::KeyboardBroadcast {
                state: Toggle::On,
                targets: BroadcastTargets::Screens(vec![
                    ScreenName::from("laptop"),
                    ScreenName::from("tablet")
                ]),
            }
        );
        assert_eq!(
            command("broadcast off"),
            Command::KeyboardBroadcast {
                state: Toggle::Off,
                targets: BroadcastTargets::All,
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            parse_line("jump").unwrap_err(),
            ConsoleError::UnknownCommand("jump".into())
        );
        assert_eq!(
            parse_line("switch").unwrap_err(),
            ConsoleError::MissingArgument("switch")
        );
        assert_eq!(
            parse_line("lock maybe").unwrap_err(),
            ConsoleError::InvalidToggle("maybe".into())
        );
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# note").unwrap().is_none());
        assert!(matches!(parse_line("quit"), Ok(Some(ServerEvent::Shutdown))));
    }

    // ── Source ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_console_source_skips_invalid_lines_until_eof() {
        // Arrange
        let input: &[u8] = b"bogus\n\ntoggle\n";
        let mut source = ConsoleSource::new(input);

        // Act
        let first = source.next_event().await;
        let second = source.next_event().await;

        // Assert
        assert!(matches!(
            first,
            Some(ServerEvent::Command(Command::ToggleScreen))
        ));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_pump_forwards_events_into_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: &[u8] = b"left\nquit\n";

        pump(ConsoleSource::new(input), tx).await;

        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Command(Command::SwitchInDirection(Direction::Left)))
        ));
        assert!(matches!(rx.recv().await, Some(ServerEvent::Shutdown)));
    }
}
