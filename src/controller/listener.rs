//! Controller-side event listener
//!
//! When a run is visualized the engine dials this listener and sends one
//! `Events` frame per turn; each frame is forwarded into the controller's
//! event channel and acknowledged.

use crate::distributed::protocol::{read_message, write_message, Message};
use crate::events::Event;
use crate::Result;
use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct EventListener {
    listener: TcpListener,
    advertised: String,
}

impl EventListener {
    /// Bind `0.0.0.0:<port>`; the engine is told to dial `<host>:<port>`
    pub async fn bind(port: u16, host: &str) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind event listener on port {}", port))?;
        Self::from_listener(listener, host)
    }

    pub fn from_listener(listener: TcpListener, host: &str) -> Result<Self> {
        let port = listener
            .local_addr()
            .context("Failed to read listener address")?
            .port();
        Ok(Self {
            listener,
            advertised: format!("{}:{}", host, port),
        })
    }

    /// Address handed to the engine
    pub fn address(&self) -> &str {
        &self.advertised
    }

    /// Forward every received event into `events` until the task is dropped
    pub fn spawn(self, events: mpsc::UnboundedSender<Event>) -> JoinHandle<()> {
        info!(address = %self.advertised, "event listener ready");
        tokio::spawn(async move {
            loop {
                let (stream, peer) = match self.listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        debug!("event listener stopped: {}", e);
                        return;
                    }
                };
                debug!(peer = %peer, "engine connected for events");

                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(e) = forward(stream, events).await {
                        debug!(peer = %peer, "event stream ended: {:#}", e);
                    }
                });
            }
        })
    }
}

async fn forward(mut stream: TcpStream, events: mpsc::UnboundedSender<Event>) -> Result<()> {
    loop {
        let reply = match read_message(&mut stream).await? {
            Message::Events(batch) => {
                let delivered = batch.into_iter().try_for_each(|event| events.send(event));
                match delivered {
                    Ok(()) => Message::Ack,
                    Err(_) => Message::error(&anyhow::anyhow!("controller is shutting down")),
                }
            }
            other => Message::error(&anyhow::anyhow!("Unexpected message: {}", other.name())),
        };
        write_message(&mut stream, &reply).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Cell;
    use crate::distributed::RemoteSink;
    use crate::events::EventSink;

    #[tokio::test]
    async fn test_forwards_remote_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = EventListener::from_listener(listener, "127.0.0.1").unwrap();
        let address = listener.address().to_string();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = listener.spawn(tx);

        let sink = RemoteSink::connect(address).await.unwrap();
        sink.send(vec![
            Event::CellFlipped { turn: 1, cell: Cell::new(3, 4) },
            Event::TurnComplete { turn: 1 },
        ])
        .await
        .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::CellFlipped { turn: 1, cell: Cell::new(3, 4) }
        );
        assert_eq!(rx.recv().await.unwrap(), Event::TurnComplete { turn: 1 });

        // Receiver gone: the engine side sees a failed delivery
        drop(rx);
        assert!(sink.send(vec![Event::TurnComplete { turn: 2 }]).await.is_err());
        task.abort();
    }
}
