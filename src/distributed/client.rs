//! TCP clients for the engine and worker services
//!
//! - [`RemoteWorker`]: the engine's handle on a worker service; implements
//!   [`WorkerContract`] so the turn loop cannot tell it from a local worker.
//! - [`RemoteSink`]: the engine's handle on a controller's event listener.
//! - [`EngineClient`]: used by controllers and worker services to drive the
//!   engine service.

use crate::board::{Cell, Grid};
use crate::distributed::protocol::*;
use crate::engine::{AliveCount, Snapshot};
use crate::events::{Event, EventSink};
use crate::partition::{Band, BandTask};
use crate::worker::WorkerContract;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

async fn dial(address: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;
    stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;
    Ok(stream)
}

/// Worker service reached over TCP
///
/// One connection, one request in flight at a time.
pub struct RemoteWorker {
    id: String,
    address: String,
    stream: Mutex<TcpStream>,
}

impl RemoteWorker {
    pub async fn connect(id: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let stream = dial(&address).await?;
        Ok(Self {
            id: id.into(),
            address,
            stream: Mutex::new(stream),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, msg: Message) -> Result<Message> {
        let mut stream = self.stream.lock().await;
        request(&mut *stream, &msg)
            .await
            .with_context(|| format!("{} to worker {} failed", msg.name(), self.address))
    }
}

#[async_trait]
impl WorkerContract for RemoteWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn compute_next_band(&self, task: BandTask) -> Result<Band> {
        match self.call(Message::ComputeNextBand(task)).await? {
            Message::NextBand(band) => Ok(band),
            other => Err(unexpected("COMPUTE_NEXT_BAND", &other)),
        }
    }

    async fn count_alive_cells(&self, band: Band) -> Result<Vec<Cell>> {
        match self.call(Message::CountAliveCells(band)).await? {
            Message::AliveCells(cells) => Ok(cells),
            other => Err(unexpected("COUNT_ALIVE_CELLS", &other)),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        match self.call(Message::Shutdown).await? {
            Message::Ack => Ok(()),
            other => Err(unexpected("SHUTDOWN", &other)),
        }
    }
}

/// Controller event listener reached over TCP
///
/// Each batch is acknowledged before the next turn's events are sent.
pub struct RemoteSink {
    address: String,
    stream: Mutex<TcpStream>,
}

impl RemoteSink {
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let stream = dial(&address).await?;
        Ok(Self {
            address,
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl EventSink for RemoteSink {
    async fn send(&self, events: Vec<Event>) -> Result<()> {
        let mut stream = self.stream.lock().await;
        match request(&mut *stream, &Message::Events(events))
            .await
            .with_context(|| format!("Event delivery to {} failed", self.address))?
        {
            Message::Ack => Ok(()),
            other => Err(unexpected("EVENTS", &other)),
        }
    }
}

/// Client of the engine service
///
/// Short requests share one connection. `start` and `continue` block until the
/// run ends, so each gets its own connection and control requests keep
/// flowing meanwhile.
pub struct EngineClient {
    address: String,
    stream: Mutex<TcpStream>,
}

impl EngineClient {
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let stream = dial(&address).await?;
        Ok(Self {
            address,
            stream: Mutex::new(stream),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, msg: Message) -> Result<Message> {
        let mut stream = self.stream.lock().await;
        request(&mut *stream, &msg).await
    }

    async fn call_dedicated(&self, msg: Message) -> Result<Message> {
        let mut stream = dial(&self.address).await?;
        request(&mut stream, &msg).await
    }

    /// Register a worker service reachable at `address`
    pub async fn register(&self, worker_id: &str, address: &str) -> Result<usize> {
        let msg = Message::Register(RegisterMessage {
            protocol_version: PROTOCOL_VERSION,
            worker_id: worker_id.to_string(),
            address: address.to_string(),
        });
        match self.call(msg).await? {
            Message::Registered { index } => Ok(index),
            other => Err(unexpected("REGISTER", &other)),
        }
    }

    pub async fn start(
        &self,
        grid: Grid,
        turns: u64,
        events_address: Option<String>,
    ) -> Result<Snapshot> {
        let msg = Message::Start(StartMessage {
            protocol_version: PROTOCOL_VERSION,
            grid,
            turns,
            events_address,
        });
        expect_snapshot("START", self.call_dedicated(msg).await?)
    }

    pub async fn continue_simulation(
        &self,
        remaining: u64,
        events_address: Option<String>,
    ) -> Result<Snapshot> {
        let msg = Message::Continue(ContinueMessage {
            protocol_version: PROTOCOL_VERSION,
            remaining,
            events_address,
        });
        expect_snapshot("CONTINUE", self.call_dedicated(msg).await?)
    }

    pub async fn pause(&self) -> Result<u64> {
        expect_turn("PAUSE", self.call(Message::Pause).await?)
    }

    pub async fn unpause(&self) -> Result<u64> {
        expect_turn("UNPAUSE", self.call(Message::Unpause).await?)
    }

    pub async fn stop(&self) -> Result<Snapshot> {
        expect_snapshot("STOP", self.call(Message::Stop).await?)
    }

    pub async fn disconnect(&self) -> Result<()> {
        expect_ack("DISCONNECT", self.call(Message::Disconnect).await?)
    }

    pub async fn close_system(&self) -> Result<()> {
        expect_ack("CLOSE_SYSTEM", self.call(Message::CloseSystem).await?)
    }

    pub async fn close_if_running(&self) -> Result<()> {
        expect_ack("CLOSE_IF_RUNNING", self.call(Message::CloseIfRunning).await?)
    }

    pub async fn status(&self) -> Result<Snapshot> {
        expect_snapshot("STATUS", self.call(Message::Status).await?)
    }

    pub async fn alive_count(&self) -> Result<AliveCount> {
        match self.call(Message::AliveCount).await? {
            Message::AliveCountReply(count) => Ok(count),
            other => Err(unexpected("ALIVE_COUNT", &other)),
        }
    }
}

fn expect_snapshot(request: &str, reply: Message) -> Result<Snapshot> {
    match reply {
        Message::Snapshot(snapshot) => Ok(snapshot),
        other => Err(unexpected(request, &other)),
    }
}

fn expect_turn(request: &str, reply: Message) -> Result<u64> {
    match reply {
        Message::Turn(turn) => Ok(turn),
        other => Err(unexpected(request, &other)),
    }
}

fn expect_ack(request: &str, reply: Message) -> Result<()> {
    match reply {
        Message::Ack => Ok(()),
        other => Err(unexpected(request, &other)),
    }
}
