//! Worker service for distributed mode
//!
//! Runs on each worker machine. The service:
//! - Listens for the engine's connection
//! - Registers its own address with the engine on startup
//! - Computes bands on a local rayon pool
//! - Stops after `Shutdown` and exits a grace delay later

use crate::distributed::client::EngineClient;
use crate::distributed::protocol::*;
use crate::worker::{LocalWorker, WorkerContract};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info};

/// Default delay between shutdown and process exit
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(4);

pub struct WorkerService {
    /// Port to listen on
    listen_port: u16,

    /// Engine service address (host:port)
    engine_address: String,

    /// Host the engine should dial; hostname when unset
    advertise: Option<String>,

    /// Compute threads per band
    threads: usize,

    close_grace: Duration,
}

impl WorkerService {
    pub fn new(listen_port: u16, engine_address: impl Into<String>, threads: usize) -> Self {
        Self {
            listen_port,
            engine_address: engine_address.into(),
            advertise: None,
            threads,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    pub fn with_advertise(mut self, host: impl Into<String>) -> Self {
        self.advertise = Some(host.into());
        self
    }

    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Bind, register with the engine and serve until shut down
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind worker service on {}", addr))?;
        self.serve(listener).await
    }

    /// Register with the engine and serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let port = listener
            .local_addr()
            .context("Failed to read listener address")?
            .port();
        let node_id = get_node_id();
        let worker_id = format!("{}:{}", node_id, port);
        let address = format!("{}:{}", self.advertise.as_deref().unwrap_or(&node_id), port);

        let worker = Arc::new(LocalWorker::new(worker_id.clone(), self.threads)?);
        let shutdown = Arc::new(Notify::new());

        println!("Worker service listening on port {}", port);
        println!("Worker ID: {} ({} threads)", worker_id, worker.threads());

        // The engine dials back during registration; the listener backlog
        // holds that connection until the accept loop below picks it up.
        let engine = EngineClient::connect(self.engine_address.clone())
            .await
            .context("Failed to reach engine")?;
        let index = engine
            .register(&worker_id, &address)
            .await
            .context("Registration with engine failed")?;
        info!(worker = %worker_id, index, engine = %self.engine_address, "registered with engine");

        tokio::select! {
            result = accept_loop(listener, worker.clone(), shutdown.clone()) => result?,
            _ = shutdown.notified() => {}
        }

        info!(
            worker = %worker_id,
            grace_ms = self.close_grace.as_millis() as u64,
            "shutdown requested, exiting"
        );
        sleep(self.close_grace).await;
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    worker: Arc<LocalWorker>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
        debug!(peer = %peer, "engine connected");

        let worker = worker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(worker, stream, shutdown).await {
                debug!(peer = %peer, "connection ended: {:#}", e);
            }
        });
    }
}

async fn handle_connection(
    worker: Arc<LocalWorker>,
    mut stream: TcpStream,
    shutdown: Arc<Notify>,
) -> Result<()> {
    stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;

    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return Ok(()),
        };

        let result = match msg {
            Message::ComputeNextBand(task) => worker.compute_next_band(task).await.map(Message::NextBand),
            Message::CountAliveCells(band) => worker.count_alive_cells(band).await.map(Message::AliveCells),
            Message::Shutdown => worker.shutdown().await.map(|()| {
                shutdown.notify_one();
                Message::Ack
            }),
            other => Err(anyhow::anyhow!("Unexpected request: {}", other.name())),
        };
        let reply = result.unwrap_or_else(|e| Message::error(&e));

        write_message(&mut stream, &reply).await?;
    }
}

/// Get node identifier
///
/// Hostname of this machine, "unknown" when it cannot be read.
pub fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Grid;
    use crate::distributed::client::RemoteWorker;
    use crate::distributed::engine_service::EngineService;
    use crate::partition::partition;

    #[tokio::test]
    async fn test_serves_bands_and_shuts_down() {
        let engine_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let engine_addr = engine_listener.local_addr().unwrap().to_string();
        let service = EngineService::new(0).with_close_grace(Duration::ZERO);
        let engine = service.engine();
        let server = tokio::spawn(service.serve(engine_listener));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let worker_addr = listener.local_addr().unwrap().to_string();
        let worker_service = tokio::spawn(
            WorkerService::new(0, engine_addr, 1)
                .with_advertise("127.0.0.1")
                .with_close_grace(Duration::ZERO)
                .serve(listener),
        );
        while engine.worker_count() < 1 {
            sleep(Duration::from_millis(5)).await;
        }

        // A second client sees the same service
        let remote = RemoteWorker::connect("direct", worker_addr).await.unwrap();
        let grid = Grid::random(6, 5, 0.5, &mut rand::thread_rng());
        let task = partition(&grid, 1).unwrap().remove(0);

        let band = remote.compute_next_band(task).await.unwrap();
        assert_eq!(band.cells, grid.step().cells().to_vec());

        let cells = remote.count_alive_cells(band).await.unwrap();
        assert_eq!(cells.len(), grid.step().alive_count());

        remote.shutdown().await.unwrap();
        worker_service.await.unwrap().unwrap();

        engine.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[test]
    fn test_node_id_not_empty() {
        assert!(!get_node_id().is_empty());
    }
}
