//! In-process worker
//!
//! Computes bands on a dedicated rayon pool sized to `threads`. Used directly by
//! the engine in local mode and wrapped by the worker service in distributed
//! mode.

use super::{alive_cells_in, compute_band_parallel, WorkerContract};
use crate::board::Cell;
use crate::partition::{Band, BandTask};
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct LocalWorker {
    id: String,
    threads: usize,
    pool: Arc<rayon::ThreadPool>,
    shut_down: AtomicBool,
}

impl LocalWorker {
    /// Create a worker that splits each band across `threads` sub-bands
    pub fn new(id: impl Into<String>, threads: usize) -> Result<Self> {
        let id = id.into();
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name({
                let id = id.clone();
                move |i| format!("{}-compute-{}", id, i)
            })
            .build()
            .with_context(|| format!("Failed to build compute pool for worker {}", id))?;

        Ok(Self {
            id,
            threads,
            pool: Arc::new(pool),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            anyhow::bail!("worker {} is shut down", self.id);
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerContract for LocalWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn compute_next_band(&self, task: BandTask) -> Result<Band> {
        self.ensure_running()?;

        let pool = self.pool.clone();
        let threads = self.threads;
        tokio::task::spawn_blocking(move || pool.install(|| compute_band_parallel(&task, threads)))
            .await
            .context("Compute task panicked")?
    }

    async fn count_alive_cells(&self, band: Band) -> Result<Vec<Cell>> {
        self.ensure_running()?;
        Ok(alive_cells_in(&band))
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!(worker = %self.id, "local worker shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Grid;
    use crate::partition::partition;

    #[tokio::test]
    async fn test_compute_matches_reference() {
        let grid = Grid::from_cells(5, 5, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]);
        let worker = LocalWorker::new("w0", 3).unwrap();
        let task = partition(&grid, 1).unwrap().remove(0);

        let band = worker.compute_next_band(task).await.unwrap();
        assert_eq!(band.cells, grid.step().cells().to_vec());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let worker = LocalWorker::new("w0", 1).unwrap();
        worker.shutdown().await.unwrap();
        worker.shutdown().await.unwrap();
        assert!(worker.is_shut_down());

        let grid = Grid::new(2, 2);
        let task = partition(&grid, 1).unwrap().remove(0);
        assert!(worker.compute_next_band(task).await.is_err());
    }
}
