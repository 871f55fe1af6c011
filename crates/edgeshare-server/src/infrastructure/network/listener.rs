//! Accept loop and per-connection tasks.

use std::net::SocketAddr;
use std::time::Duration;

use edgeshare_core::protocol::{KEEP_ALIVES_UNTIL_DEATH, KEEP_ALIVE_INTERVAL};
use edgeshare_core::{decode_message, Message, ProtocolName, ProtocolVariant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::framing::{write_message, FrameReader};
use super::NetworkError;
use crate::application::handshake::{HandshakeError, HandshakeOutcome, HandshakeSession};
use crate::application::screen_session::{ScreenSession, SessionId};
use crate::application::server::ServerEvent;

/// Settings shared by every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    /// Tag sent in the greeting.
    pub protocol: ProtocolName,
    /// How long a peer has to finish the handshake.
    pub handshake_timeout: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            protocol: ProtocolName::Synergy,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Binds the listening socket.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })
}

/// Accepts connections until the server's event queue closes.
///
/// Each connection is handled on its own task, so a slow handshake never
/// delays the next accept.
pub async fn serve(listener: TcpListener, events: mpsc::Sender<ServerEvent>, options: ListenerOptions) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, protocol = %options.protocol, "listening for screens");
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    let events = events.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, events, options).await;
                    });
                }
                Err(err) => {
                    // Usually transient, e.g. out of file descriptors.
                    warn!(%err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = events.closed() => {
                debug!("server gone, accept loop exiting");
                return;
            }
        }
    }
}

/// Runs the handshake on `stream` and hands the session to the server.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::Sender<ServerEvent>,
    options: ListenerOptions,
) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%peer, %err, "could not disable Nagle");
    }
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    let outcome = match negotiate(
        &mut reader,
        &mut write_half,
        options.protocol,
        options.handshake_timeout,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            info!(%peer, %err, "handshake failed");
            let _ = write_half.shutdown().await;
            return;
        }
    };
    info!(%peer, screen = %outcome.name, version = %outcome.variant, "screen connected");

    let variant = outcome.variant;
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let mut session = ScreenSession::new(
        outcome.name,
        variant,
        outcome.shape,
        outcome.cursor,
        outbound_tx,
    );
    let id = session.id();

    tokio::spawn(write_loop(write_half, outbound_rx, variant));

    // The reader waits until the server has the session, so no message can
    // overtake SessionReady.
    let (ready_tx, ready_rx) = oneshot::channel();
    let reader_task = tokio::spawn(read_loop(reader, id, variant, events.clone(), ready_rx));
    session.attach_reader(reader_task.abort_handle());

    if events.send(ServerEvent::SessionReady(session)).await.is_err() {
        return;
    }
    let _ = ready_tx.send(());
}

/// Drives the server side of the handshake within `limit`.
///
/// On failure the matching error reply (`EICV` or `EBAD`) is sent before
/// returning.
pub async fn negotiate<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    protocol: ProtocolName,
    limit: Duration,
) -> Result<HandshakeOutcome, NetworkError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut handshake = HandshakeSession::new(protocol);
    let err = match timeout(limit, exchange(&mut handshake, reader, writer)).await {
        Ok(Ok(())) => return handshake.finish().ok_or(NetworkError::UnexpectedEof),
        Ok(Err(NetworkError::Handshake(err))) => err,
        Ok(Err(NetworkError::Protocol(err))) => HandshakeError::from(err),
        Ok(Err(other)) => return Err(other),
        Err(_) => handshake.timed_out(limit),
    };
    if let Some(reply) = err.reply() {
        if let Err(write_err) = write_message(writer, &reply, handshake.variant()).await {
            trace!(%write_err, "could not send handshake error");
        }
    }
    Err(NetworkError::Handshake(err))
}

async fn exchange<R, W>(
    handshake: &mut HandshakeSession,
    reader: &mut FrameReader<R>,
    writer: &mut W,
) -> Result<(), NetworkError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = handshake.start();
    write_message(writer, &hello, handshake.variant()).await?;
    while !handshake.is_ready() {
        let payload = reader
            .next_frame()
            .await?
            .ok_or(NetworkError::Handshake(HandshakeError::Disconnected))?;
        for reply in handshake.receive(&payload)? {
            write_message(writer, &reply, handshake.variant()).await?;
        }
    }
    Ok(())
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    variant: ProtocolVariant,
) {
    let mut keep_alive = interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = keep_alive.tick(), if variant.has_keep_alive() => Message::KeepAlive,
        };
        if let Err(err) = write_message(&mut writer, &message, variant).await {
            debug!(%err, "write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    id: SessionId,
    variant: ProtocolVariant,
    events: mpsc::Sender<ServerEvent>,
    ready: oneshot::Receiver<()>,
) {
    if ready.await.is_err() {
        return;
    }
    let dead_after = variant
        .has_keep_alive()
        .then(|| KEEP_ALIVE_INTERVAL * KEEP_ALIVES_UNTIL_DEATH);

    let last = loop {
        let next = match dead_after {
            Some(limit) => match timeout(limit, reader.next_frame()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(%id, "peer stopped sending keep-alives");
                    break ServerEvent::SessionClosed { id };
                }
            },
            None => reader.next_frame().await,
        };

        match next {
            Ok(Some(payload)) => match decode_message(&payload, variant) {
                Ok(Message::KeepAlive) => trace!(%id, "keep-alive"),
                Ok(message) => {
                    if events
                        .send(ServerEvent::SessionMessage { id, message })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(err) => {
                    break ServerEvent::SessionFailed {
                        id,
                        error: err.to_string(),
                    }
                }
            },
            Ok(None) => break ServerEvent::SessionClosed { id },
            Err(NetworkError::Protocol(err)) => {
                break ServerEvent::SessionFailed {
                    id,
                    error: err.to_string(),
                }
            }
            Err(err) => {
                debug!(%id, %err, "read failed");
                break ServerEvent::SessionClosed { id };
            }
        }
    };
    let _ = events.send(last).await;
}
