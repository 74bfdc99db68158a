//! Engine service for distributed mode
//!
//! Hosts the [`Engine`] behind a TCP listener. The service:
//! - Accepts worker registrations and dials each worker back
//! - Serves controller requests, one task per connection
//! - Dials the controller's event listener when a run is visualized
//! - Closes the whole system on a worker failure
//! - Exits a grace delay after the engine is closed

use crate::distributed::client::{RemoteSink, RemoteWorker};
use crate::distributed::protocol::*;
use crate::engine::{Engine, Snapshot};
use crate::error::EngineError;
use crate::events::EventSink;
use crate::worker::WorkerContract;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Default delay between close and process exit
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct EngineService {
    /// Port to listen on
    listen_port: u16,

    engine: Engine,

    close_grace: Duration,
}

impl EngineService {
    pub fn new(listen_port: u16) -> Self {
        Self {
            listen_port,
            engine: Engine::new(),
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Handle on the hosted engine
    pub fn engine(&self) -> Engine {
        self.engine.clone()
    }

    /// Bind and serve until the engine is closed
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind engine service on {}", addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the engine is closed
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Failed to read listener address")?;
        info!(addr = %local, "engine service listening");
        println!("Engine listening on {}", local);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.context("Failed to accept connection")?;
                    debug!(peer = %peer, "connection accepted");

                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(engine, stream).await {
                            debug!(peer = %peer, "connection ended: {:#}", e);
                        }
                    });
                }
                _ = self.engine.closed() => break,
            }
        }

        info!(grace_ms = self.close_grace.as_millis() as u64, "engine closed, exiting");
        sleep(self.close_grace).await;
        Ok(())
    }
}

/// Serve requests on one connection until the peer hangs up
async fn handle_connection(engine: Engine, mut stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;

    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            // Peer closed the connection
            Err(_) => return Ok(()),
        };

        let name = msg.name();
        debug!(request = name, "request received");
        let reply = match dispatch(&engine, msg).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(request = name, "request failed: {:#}", e);
                Message::error(&e)
            }
        };

        write_message(&mut stream, &reply).await?;
    }
}

async fn dispatch(engine: &Engine, msg: Message) -> Result<Message> {
    match msg {
        Message::Register(reg) => {
            check_version(reg.protocol_version)?;
            let worker = RemoteWorker::connect(reg.worker_id, reg.address).await?;
            info!(worker = %worker.id(), address = %worker.address(), "worker connected");
            let index = engine.register(Arc::new(worker))?;
            Ok(Message::Registered { index })
        }
        Message::Start(start) => {
            check_version(start.protocol_version)?;
            let sink = connect_sink(start.events_address).await?;
            let result = engine.start(start.grid, start.turns, sink).await;
            Ok(Message::Snapshot(fatal_on_worker_failure(engine, result)?))
        }
        Message::Continue(cont) => {
            check_version(cont.protocol_version)?;
            let sink = connect_sink(cont.events_address).await?;
            let result = engine.continue_simulation(cont.remaining, sink).await;
            Ok(Message::Snapshot(fatal_on_worker_failure(engine, result)?))
        }
        Message::Pause => Ok(Message::Turn(engine.pause().await?)),
        Message::Unpause => Ok(Message::Turn(engine.unpause()?)),
        Message::Stop => Ok(Message::Snapshot(engine.stop().await?)),
        Message::Disconnect => {
            engine.disconnect()?;
            Ok(Message::Ack)
        }
        Message::CloseSystem => {
            engine.close().await?;
            Ok(Message::Ack)
        }
        Message::CloseIfRunning => {
            engine.close_if_running().await?;
            Ok(Message::Ack)
        }
        Message::Status => Ok(Message::Snapshot(engine.status())),
        Message::AliveCount => Ok(Message::AliveCountReply(engine.alive_count())),
        other => anyhow::bail!("Unexpected request: {}", other.name()),
    }
}

async fn connect_sink(address: Option<String>) -> Result<Option<Arc<dyn EventSink>>> {
    match address {
        Some(address) => {
            let sink = RemoteSink::connect(address).await?;
            Ok(Some(Arc::new(sink)))
        }
        None => Ok(None),
    }
}

/// A worker failure ends the run and takes the system down with it
fn fatal_on_worker_failure(engine: &Engine, result: Result<Snapshot>) -> Result<Snapshot> {
    if let Err(e) = &result {
        if matches!(e.downcast_ref::<EngineError>(), Some(EngineError::Worker { .. })) {
            error!("worker failure, closing system: {:#}", e);
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.close().await {
                    warn!("close after worker failure: {:#}", e);
                }
            });
        }
    }
    result
}
