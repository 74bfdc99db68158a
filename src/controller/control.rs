//! Engine handles used by the session controller
//!
//! The controller drives either an in-process [`Engine`] or a remote engine
//! service through the same [`SimulationControl`] seam. Each handle knows how
//! its visualization events reach the controller: a channel sink in process,
//! the controller's event listener address over TCP.

use crate::board::Grid;
use crate::distributed::EngineClient;
use crate::engine::{AliveCount, Engine, Snapshot};
use crate::events::EventSink;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Engine operations available to a controller
#[async_trait]
pub trait SimulationControl: Send + Sync {
    async fn start(&self, grid: Grid, turns: u64) -> Result<Snapshot>;
    async fn continue_simulation(&self, remaining: u64) -> Result<Snapshot>;
    async fn pause(&self) -> Result<u64>;
    async fn unpause(&self) -> Result<u64>;
    async fn stop(&self) -> Result<Snapshot>;
    async fn disconnect(&self) -> Result<()>;
    async fn close_system(&self) -> Result<()>;
    async fn close_if_running(&self) -> Result<()>;
    async fn status(&self) -> Result<Snapshot>;
    async fn alive_count(&self) -> Result<AliveCount>;
}

/// In-process engine
pub struct LocalControl {
    engine: Engine,
    sink: Option<Arc<dyn EventSink>>,
}

impl LocalControl {
    pub fn new(engine: Engine, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { engine, sink }
    }
}

#[async_trait]
impl SimulationControl for LocalControl {
    async fn start(&self, grid: Grid, turns: u64) -> Result<Snapshot> {
        self.engine.start(grid, turns, self.sink.clone()).await
    }

    async fn continue_simulation(&self, remaining: u64) -> Result<Snapshot> {
        self.engine
            .continue_simulation(remaining, self.sink.clone())
            .await
    }

    async fn pause(&self) -> Result<u64> {
        self.engine.pause().await
    }

    async fn unpause(&self) -> Result<u64> {
        self.engine.unpause()
    }

    async fn stop(&self) -> Result<Snapshot> {
        self.engine.stop().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.engine.disconnect()
    }

    async fn close_system(&self) -> Result<()> {
        self.engine.close().await
    }

    async fn close_if_running(&self) -> Result<()> {
        self.engine.close_if_running().await
    }

    async fn status(&self) -> Result<Snapshot> {
        Ok(self.engine.status())
    }

    async fn alive_count(&self) -> Result<AliveCount> {
        Ok(self.engine.alive_count())
    }
}

/// Engine service over TCP
pub struct RemoteControl {
    client: EngineClient,
    /// Controller event listener the engine should dial, when visualizing
    events_address: Option<String>,
}

impl RemoteControl {
    pub fn new(client: EngineClient, events_address: Option<String>) -> Self {
        Self {
            client,
            events_address,
        }
    }
}

#[async_trait]
impl SimulationControl for RemoteControl {
    async fn start(&self, grid: Grid, turns: u64) -> Result<Snapshot> {
        self.client
            .start(grid, turns, self.events_address.clone())
            .await
    }

    async fn continue_simulation(&self, remaining: u64) -> Result<Snapshot> {
        self.client
            .continue_simulation(remaining, self.events_address.clone())
            .await
    }

    async fn pause(&self) -> Result<u64> {
        self.client.pause().await
    }

    async fn unpause(&self) -> Result<u64> {
        self.client.unpause().await
    }

    async fn stop(&self) -> Result<Snapshot> {
        self.client.stop().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await
    }

    async fn close_system(&self) -> Result<()> {
        self.client.close_system().await
    }

    async fn close_if_running(&self) -> Result<()> {
        self.client.close_if_running().await
    }

    async fn status(&self) -> Result<Snapshot> {
        self.client.status().await
    }

    async fn alive_count(&self) -> Result<AliveCount> {
        self.client.alive_count().await
    }
}
