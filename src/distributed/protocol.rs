//! Distributed mode protocol
//!
//! Messages exchanged between controllers, the engine service and worker
//! services. The protocol uses MessagePack (rmp-serde) so every serde feature
//! on the board and event types carries over unchanged.
//!
//! # Message Flow
//!
//! ```text
//! Worker                    Engine                     Controller
//!   |-- REGISTER ------------->|                            |
//!   |<------------ REGISTERED -|                            |
//!   |                          |<------------ START(grid) --|
//!   |<- COMPUTE_NEXT_BAND -----|                            |
//!   |------------ NEXT_BAND -->|                            |
//!   |<- COUNT_ALIVE_CELLS -----|                            |
//!   |------------ ALIVE_CELLS->|---- EVENTS (listener) ---->|
//!   |                          |<--------------------- ACK -|
//!   |                          |--------------- SNAPSHOT -->|
//!   |<- SHUTDOWN --------------|<----------- CLOSE_SYSTEM --|
//! ```
//!
//! Every request gets exactly one reply on the same connection. Failures are
//! answered with `Error`, which carries an [`ErrorKind`] so the caller can
//! rebuild the typed [`EngineError`].
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::board::{Cell, Grid};
use crate::engine::{AliveCount, Snapshot};
use crate::error::{classify, EngineError, ErrorKind};
use crate::events::Event;
use crate::partition::{Band, BandTask};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Engine, workers and controllers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Worker service announces itself (Worker → Engine)
    Register(RegisterMessage),

    /// Begin a run (Controller → Engine); answered when the run ends
    Start(StartMessage),

    /// Resume or reattach (Controller → Engine); answered when the run ends
    Continue(ContinueMessage),

    Pause,
    Unpause,
    Stop,

    /// Drop the visualization link, leave the run going
    Disconnect,

    /// Stop everything and shut down every worker
    CloseSystem,

    CloseIfRunning,
    Status,
    AliveCount,

    /// Compute one band's next state (Engine → Worker)
    ComputeNextBand(BandTask),

    /// List live cells of a band (Engine → Worker)
    CountAliveCells(Band),

    /// Stop serving (Engine → Worker)
    Shutdown,

    /// One turn of visualization events (Engine → Controller listener)
    Events(Vec<Event>),

    Registered { index: usize },
    Snapshot(Snapshot),

    /// Turn at which a pause or resume took effect
    Turn(u64),

    AliveCountReply(AliveCount),
    NextBand(Band),
    AliveCells(Vec<Cell>),
    Ack,
    Error(ErrorMessage),
}

impl Message {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::Register(_) => "REGISTER",
            Message::Start(_) => "START",
            Message::Continue(_) => "CONTINUE",
            Message::Pause => "PAUSE",
            Message::Unpause => "UNPAUSE",
            Message::Stop => "STOP",
            Message::Disconnect => "DISCONNECT",
            Message::CloseSystem => "CLOSE_SYSTEM",
            Message::CloseIfRunning => "CLOSE_IF_RUNNING",
            Message::Status => "STATUS",
            Message::AliveCount => "ALIVE_COUNT",
            Message::ComputeNextBand(_) => "COMPUTE_NEXT_BAND",
            Message::CountAliveCells(_) => "COUNT_ALIVE_CELLS",
            Message::Shutdown => "SHUTDOWN",
            Message::Events(_) => "EVENTS",
            Message::Registered { .. } => "REGISTERED",
            Message::Snapshot(_) => "SNAPSHOT",
            Message::Turn(_) => "TURN",
            Message::AliveCountReply(_) => "ALIVE_COUNT_REPLY",
            Message::NextBand(_) => "NEXT_BAND",
            Message::AliveCells(_) => "ALIVE_CELLS",
            Message::Ack => "ACK",
            Message::Error(_) => "ERROR",
        }
    }

    /// Error reply for `err`, keeping its classification
    pub fn error(err: &anyhow::Error) -> Self {
        Message::Error(ErrorMessage {
            kind: classify(err),
            message: format!("{:#}", err),
        })
    }

    /// Turn an `Error` reply back into a typed error; other replies pass through
    pub fn into_result(self) -> Result<Message> {
        match self {
            Message::Error(err) => Err(err.into_error().into()),
            other => Ok(other),
        }
    }
}

/// Registration message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Worker identifier (hostname plus port)
    pub worker_id: String,

    /// Address the engine should dial to reach the worker
    pub address: String,
}

/// Start message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Initial board
    pub grid: Grid,

    /// Number of turns to run
    pub turns: u64,

    /// Controller event listener, when visualization is on
    pub events_address: Option<String>,
}

/// Continue message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Additional turns when resuming a stopped run
    pub remaining: u64,

    pub events_address: Option<String>,
}

/// Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub kind: ErrorKind,

    /// Error description
    pub message: String,
}

impl ErrorMessage {
    /// Rebuild the closest typed error
    pub fn into_error(self) -> EngineError {
        match self.kind {
            ErrorKind::NoWorkers => EngineError::NoWorkers,
            ErrorKind::InvalidState(state) => EngineError::InvalidState {
                op: operation_of(&self.message),
                state,
            },
            ErrorKind::RegistryLocked => EngineError::RegistryLocked,
            ErrorKind::Closed => EngineError::Closed,
            ErrorKind::InvalidBoard => EngineError::InvalidBoard(self.message),
            ErrorKind::Worker => EngineError::Worker {
                worker: "remote".to_string(),
                message: self.message,
            },
            ErrorKind::ProtocolMismatch | ErrorKind::Other => EngineError::Remote(self.message),
        }
    }
}

/// Operation name out of "cannot <op> while <state>"
fn operation_of(message: &str) -> String {
    message
        .strip_prefix("cannot ")
        .and_then(|rest| rest.split(" while ").next())
        .unwrap_or("request")
        .to_string()
}

/// Reject a peer speaking another protocol version
pub fn check_version(remote: u32) -> Result<()> {
    if remote != PROTOCOL_VERSION {
        return Err(EngineError::ProtocolMismatch {
            local: PROTOCOL_VERSION,
            remote,
        }
        .into());
    }
    Ok(())
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
///
/// # Message Format
///
/// ```text
/// [4 bytes: message length (little-endian u32)][N bytes: MessagePack message]
/// ```
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!(
            "Message too large: {} bytes (max {} bytes)",
            msg_bytes.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by a MessagePack-serialized message.
///
/// # Returns
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!("Buffer too small for message length (need 4 bytes, got {})", buf.len());
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {} bytes)", msg_len, MAX_MESSAGE_SIZE);
    }
    if buf.len() < 4 + msg_len {
        anyhow::bail!("Incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len());
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len]).context("Failed to deserialize message")?;

    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a stream
///
/// Reads the length prefix, then the complete body.
pub async fn read_message<R>(stream: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {} bytes)", msg_len, MAX_MESSAGE_SIZE);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream
///
/// Serializes the message with length prefix and flushes.
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await.context("Failed to write message")?;
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

/// Send a request and wait for its reply, turning `Error` replies into errors
pub async fn request<S>(stream: &mut S, msg: &Message) -> Result<Message>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_message(stream, msg).await?;
    read_message(stream)
        .await
        .with_context(|| format!("No reply to {}", msg.name()))?
        .into_result()
}

/// Reply that was not expected for `request`
pub fn unexpected(request: &str, reply: &Message) -> anyhow::Error {
    anyhow::anyhow!("Unexpected reply to {}: {}", request, reply.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LifecycleState;

    #[test]
    fn test_serialize_deserialize_start() {
        let grid = Grid::from_cells(4, 6, &[Cell::new(5, 3), Cell::new(0, 0)]);
        let msg = Message::Start(StartMessage {
            protocol_version: PROTOCOL_VERSION,
            grid: grid.clone(),
            turns: 100,
            events_address: Some("127.0.0.1:8030".to_string()),
        });

        let bytes = serialize_message(&msg).unwrap();
        let (deserialized, consumed) = deserialize_message(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        match deserialized {
            Message::Start(start) => {
                assert_eq!(start.grid, grid);
                assert_eq!(start.turns, 100);
                assert_eq!(start.events_address.as_deref(), Some("127.0.0.1:8030"));
            }
            other => panic!("Wrong message type: {}", other.name()),
        }
    }

    #[test]
    fn test_message_framing() {
        let bytes = serialize_message(&Message::Stop).unwrap();

        assert!(bytes.len() >= 4);
        let msg_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + msg_len);
    }

    #[test]
    fn test_incomplete_and_oversized_frames() {
        let bytes = serialize_message(&Message::Status).unwrap();
        assert!(deserialize_message(&bytes[..bytes.len() - 1]).is_err());
        assert!(deserialize_message(&bytes[..2]).is_err());

        let mut huge = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        huge.extend_from_slice(&[0; 8]);
        let err = deserialize_message(&huge).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_error_reply_rebuilds_kind() {
        let err: anyhow::Error = EngineError::invalid_state("unpause", LifecycleState::Running).into();
        let reply = Message::error(&err);

        let rebuilt = reply.into_result().unwrap_err();
        assert_eq!(
            rebuilt.downcast_ref::<EngineError>(),
            Some(&EngineError::invalid_state("unpause", LifecycleState::Running))
        );

        let other = Message::error(&anyhow::anyhow!("disk full")).into_result().unwrap_err();
        assert_eq!(
            other.downcast_ref::<EngineError>(),
            Some(&EngineError::Remote("disk full".to_string()))
        );
    }

    #[test]
    fn test_check_version() {
        assert!(check_version(PROTOCOL_VERSION).is_ok());
        let err = check_version(PROTOCOL_VERSION + 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ProtocolMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let band = Band::new(2, 3, vec![true, false, true]);

        write_message(&mut a, &Message::CountAliveCells(band.clone())).await.unwrap();
        match read_message(&mut b).await.unwrap() {
            Message::CountAliveCells(received) => assert_eq!(received, band),
            other => panic!("Wrong message type: {}", other.name()),
        }
    }
}
