//! Distributed simulation engine
//!
//! The engine owns the authoritative board and turn counter and drives the
//! turn loop over a registry of workers. Each turn it partitions the current
//! board into one row band per worker, scatters the bands concurrently, waits
//! for every result (the barrier) and merges them in band order before the new
//! board and turn become visible together.
//!
//! # Concurrency
//!
//! - The board and turn live behind a single data gate; `status()` and
//!   `alive_count()` only ever observe fully merged turns.
//! - The turn loop takes a separate turn gate for the whole of each turn.
//!   `pause()` acquires that gate and holds it until `unpause()` or `stop()`,
//!   so a pause takes effect between turns and never splits one.
//! - Stopping is cooperative: a cancel token checked at the top of every
//!   iteration.
//! - Run completion is published on a watch channel keyed by run id. Every
//!   caller waiting on the run sees the same outcome.
//!
//! # Example
//!
//! ```no_run
//! use golnet::board::Grid;
//! use golnet::engine::Engine;
//! use golnet::worker::LocalWorker;
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = Engine::new();
//! engine.register(Arc::new(LocalWorker::new("local-0", 4)?))?;
//!
//! let final_state = engine.start(Grid::new(64, 64), 100, None).await?;
//! assert_eq!(final_state.turn, 100);
//! # Ok(())
//! # }
//! ```

pub mod lifecycle;

pub use lifecycle::{AliveCount, CancelToken, LifecycleState, Snapshot};

use crate::board::{Cell, Grid};
use crate::error::EngineError;
use crate::events::{flipped_cells, Event, EventSink};
use crate::partition::{partition, reassemble, Band};
use crate::stats::{TurnStats, TurnSummary};
use crate::worker::WorkerContract;
use crate::Result;
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Result of one run, published when its turn loop exits
#[derive(Debug, Clone)]
struct RunOutcome {
    run_id: u64,
    result: std::result::Result<Snapshot, EngineError>,
}

/// Board and turn, always updated together
struct BoardState {
    grid: Grid,
    turn: u64,
}

struct Control {
    state: LifecycleState,
    /// Visualization link dropped while the run keeps going
    detached: bool,
    /// Next emission sends the full live set as flips
    resync: bool,
    required_turns: u64,
    workers: Vec<Arc<dyn WorkerContract>>,
    sink: Option<Arc<dyn EventSink>>,
    cancel: CancelToken,
    run_id: u64,
}

impl Control {
    fn reported_state(&self) -> LifecycleState {
        if self.detached && self.state.is_active() {
            LifecycleState::Disconnected
        } else {
            self.state
        }
    }
}

struct Inner {
    board: Mutex<BoardState>,
    control: Mutex<Control>,
    turn_gate: Arc<tokio::sync::Mutex<()>>,
    pause_guard: Mutex<Option<OwnedMutexGuard<()>>>,
    stats: Mutex<TurnStats>,
    outcome: watch::Sender<RunOutcome>,
    closed: watch::Sender<bool>,
}

/// Lock a std mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn engine_error(err: anyhow::Error) -> EngineError {
    match err.downcast::<EngineError>() {
        Ok(e) => e,
        Err(other) => EngineError::Remote(format!("{:#}", other)),
    }
}

/// Handle to a shared engine
///
/// Cheap to clone; all clones drive the same board.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(RunOutcome {
            run_id: 0,
            result: Err(EngineError::invalid_state("finish", LifecycleState::Idle)),
        });
        let (closed, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                board: Mutex::new(BoardState {
                    grid: Grid::new(0, 0),
                    turn: 0,
                }),
                control: Mutex::new(Control {
                    state: LifecycleState::Idle,
                    detached: false,
                    resync: false,
                    required_turns: 0,
                    workers: Vec::new(),
                    sink: None,
                    cancel: CancelToken::new(),
                    run_id: 0,
                }),
                turn_gate: Arc::new(tokio::sync::Mutex::new(())),
                pause_guard: Mutex::new(None),
                stats: Mutex::new(TurnStats::new()),
                outcome,
                closed,
            }),
        }
    }

    /// Add a worker to the registry, returning its index
    ///
    /// Rejected while a run is in progress; the worker set is frozen for the
    /// duration of a run.
    pub fn register(&self, worker: Arc<dyn WorkerContract>) -> Result<usize> {
        let mut ctl = lock(&self.inner.control);
        match ctl.state {
            LifecycleState::Closed => return Err(EngineError::Closed.into()),
            s if s.is_active() => return Err(EngineError::RegistryLocked.into()),
            _ => {}
        }

        let index = ctl.workers.len();
        info!(worker = %worker.id(), index, "worker registered");
        ctl.workers.push(worker);
        Ok(index)
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.inner.control).workers.len()
    }

    pub fn worker_ids(&self) -> Vec<String> {
        lock(&self.inner.control)
            .workers
            .iter()
            .map(|w| w.id().to_string())
            .collect()
    }

    /// Run `turns` generations of `grid` and wait for the run to end
    ///
    /// Allowed from Idle or Stopped. Returns the last fully merged turn, which
    /// is earlier than `turns` if the run was stopped.
    pub async fn start(
        &self,
        grid: Grid,
        turns: u64,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Snapshot> {
        if grid.is_empty() {
            return Err(EngineError::InvalidBoard("board has no cells".to_string()).into());
        }

        let (run_id, workers, cancel) = {
            let mut ctl = lock(&self.inner.control);
            match ctl.state {
                LifecycleState::Idle | LifecycleState::Stopped => {}
                LifecycleState::Closed => return Err(EngineError::Closed.into()),
                _ => return Err(EngineError::invalid_state("start", ctl.reported_state()).into()),
            }
            if ctl.workers.is_empty() {
                return Err(EngineError::NoWorkers.into());
            }

            {
                let mut board = lock(&self.inner.board);
                board.grid = grid;
                board.turn = 0;
            }
            ctl.state = LifecycleState::Running;
            ctl.detached = false;
            ctl.resync = false;
            ctl.required_turns = turns;
            ctl.sink = sink;
            ctl.cancel = CancelToken::new();
            ctl.run_id += 1;
            (ctl.run_id, ctl.workers.clone(), ctl.cancel.clone())
        };

        lock(&self.inner.stats).reset();
        info!(run = run_id, turns, workers = workers.len(), "starting run");

        self.spawn_run(run_id, workers, cancel, true);
        self.await_run(run_id).await
    }

    /// Resume a stopped run or reattach to a headless one
    ///
    /// From Stopped: runs `remaining` more turns from the retained board.
    /// From Running or Paused with the visualization link dropped: attaches
    /// `sink` and waits for the existing run; `remaining` is ignored.
    pub async fn continue_simulation(
        &self,
        remaining: u64,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Snapshot> {
        let run_id = {
            let mut ctl = lock(&self.inner.control);
            let state = ctl.state;
            match state {
                LifecycleState::Stopped => {
                    if ctl.workers.is_empty() {
                        return Err(EngineError::NoWorkers.into());
                    }
                    let turn = lock(&self.inner.board).turn;
                    ctl.state = LifecycleState::Running;
                    ctl.detached = false;
                    ctl.resync = sink.is_some();
                    ctl.required_turns = turn.saturating_add(remaining);
                    ctl.sink = sink;
                    ctl.cancel = CancelToken::new();
                    ctl.run_id += 1;

                    let (run_id, workers, cancel) =
                        (ctl.run_id, ctl.workers.clone(), ctl.cancel.clone());
                    drop(ctl);

                    info!(run = run_id, from_turn = turn, remaining, "continuing run");
                    self.spawn_run(run_id, workers, cancel, false);
                    run_id
                }
                s if s.is_active() && ctl.detached => {
                    ctl.detached = false;
                    ctl.resync = sink.is_some();
                    ctl.sink = sink;
                    info!(run = ctl.run_id, "reattached to running simulation");
                    ctl.run_id
                }
                LifecycleState::Closed => return Err(EngineError::Closed.into()),
                _ => {
                    return Err(
                        EngineError::invalid_state("continue", ctl.reported_state()).into()
                    )
                }
            }
        };

        self.await_run(run_id).await
    }

    /// Hold the turn loop between turns, returning the turn it holds at
    pub async fn pause(&self) -> Result<u64> {
        self.require_running("pause")?;

        let guard = self.inner.turn_gate.clone().lock_owned().await;
        {
            let mut ctl = lock(&self.inner.control);
            if ctl.state != LifecycleState::Running || ctl.cancel.is_cancelled() {
                return Err(EngineError::invalid_state("pause", ctl.reported_state()).into());
            }
            ctl.state = LifecycleState::Paused;
            *lock(&self.inner.pause_guard) = Some(guard);
        }

        let turn = lock(&self.inner.board).turn;
        info!(turn, "paused");
        Ok(turn)
    }

    pub fn unpause(&self) -> Result<u64> {
        {
            let mut ctl = lock(&self.inner.control);
            if ctl.state != LifecycleState::Paused {
                return Err(EngineError::invalid_state("unpause", ctl.reported_state()).into());
            }
            ctl.state = LifecycleState::Running;
        }
        self.release_pause();

        let turn = lock(&self.inner.board).turn;
        info!(turn, "resumed");
        Ok(turn)
    }

    /// End the current run after its in-flight turn, returning the final state
    ///
    /// Stopping a stopped engine returns the retained state.
    pub async fn stop(&self) -> Result<Snapshot> {
        let run_id = {
            let ctl = lock(&self.inner.control);
            match ctl.state {
                s if s.is_active() => {
                    ctl.cancel.cancel();
                    ctl.run_id
                }
                LifecycleState::Stopped => return Ok(self.status()),
                LifecycleState::Closed => return Err(EngineError::Closed.into()),
                s => return Err(EngineError::invalid_state("stop", s).into()),
            }
        };

        self.release_pause();
        info!(run = run_id, "stop requested");
        self.await_run(run_id).await
    }

    /// Stop the current run if there is one
    pub async fn close_if_running(&self) -> Result<()> {
        let active = lock(&self.inner.control).state.is_active();
        if active {
            self.stop().await?;
        }
        Ok(())
    }

    /// Detach the visualization link; an active run carries on headless
    pub fn disconnect(&self) -> Result<()> {
        let mut ctl = lock(&self.inner.control);
        if ctl.state == LifecycleState::Closed {
            return Err(EngineError::Closed.into());
        }
        ctl.sink = None;
        ctl.detached = ctl.state.is_active();
        info!(state = %ctl.reported_state(), "controller disconnected");
        Ok(())
    }

    /// Stop any run, broadcast shutdown to every worker and close the engine
    ///
    /// Worker shutdown failures are logged, not returned. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let workers = {
            let mut ctl = lock(&self.inner.control);
            if ctl.state == LifecycleState::Closed {
                return Ok(());
            }
            ctl.cancel.cancel();
            ctl.state = LifecycleState::Closed;
            ctl.detached = false;
            ctl.sink = None;
            ctl.workers.clone()
        };
        self.release_pause();

        info!(workers = workers.len(), "closing system");
        let results = join_all(workers.iter().map(|w| async move {
            (w.id().to_string(), w.shutdown().await)
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                warn!(worker = %id, "shutdown failed: {:#}", e);
            }
        }

        self.inner.closed.send_replace(true);
        Ok(())
    }

    /// Resolves once `close()` has finished broadcasting shutdown
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.inner.control).reported_state()
    }

    /// Last fully merged turn and its board
    pub fn status(&self) -> Snapshot {
        let board = lock(&self.inner.board);
        Snapshot {
            turn: board.turn,
            grid: board.grid.clone(),
        }
    }

    pub fn alive_count(&self) -> AliveCount {
        let board = lock(&self.inner.board);
        AliveCount {
            turn: board.turn,
            alive: board.grid.alive_count(),
        }
    }

    /// Turn latency digest of the current or most recent run
    pub fn turn_summary(&self) -> TurnSummary {
        lock(&self.inner.stats).summary()
    }

    fn require_running(&self, op: &str) -> Result<()> {
        let ctl = lock(&self.inner.control);
        match ctl.state {
            LifecycleState::Running => Ok(()),
            LifecycleState::Closed => Err(EngineError::Closed.into()),
            _ => Err(EngineError::invalid_state(op, ctl.reported_state()).into()),
        }
    }

    fn release_pause(&self) {
        lock(&self.inner.pause_guard).take();
    }

    fn spawn_run(
        &self,
        run_id: u64,
        workers: Vec<Arc<dyn WorkerContract>>,
        cancel: CancelToken,
        emit_initial: bool,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner.drive(&workers, &cancel, emit_initial).await;
            inner.finish_run(run_id, result);
        });
    }

    async fn await_run(&self, run_id: u64) -> Result<Snapshot> {
        let mut rx = self.inner.outcome.subscribe();
        let result = rx
            .wait_for(|outcome| outcome.run_id >= run_id)
            .await
            .map_err(|_| anyhow::anyhow!("engine dropped before run {} finished", run_id))?
            .result
            .clone();
        result.map_err(Into::into)
    }
}

impl Inner {
    fn attached_sink(&self) -> Option<Arc<dyn EventSink>> {
        lock(&self.control).sink.clone()
    }

    fn take_resync(&self) -> bool {
        std::mem::take(&mut lock(&self.control).resync)
    }

    fn detach_sink(&self) {
        let mut ctl = lock(&self.control);
        ctl.sink = None;
        ctl.detached = ctl.state.is_active();
    }

    /// The turn loop
    async fn drive(
        &self,
        workers: &[Arc<dyn WorkerContract>],
        cancel: &CancelToken,
        emit_initial: bool,
    ) -> std::result::Result<(), EngineError> {
        // Live cells as last sent to the sink
        let mut shown: Option<Vec<Cell>> = None;

        if emit_initial {
            if let Some(sink) = self.attached_sink() {
                let mut initial = lock(&self.board).grid.alive_cells();
                initial.sort_unstable();
                let events = initial
                    .iter()
                    .map(|&cell| Event::CellFlipped { turn: 0, cell })
                    .collect();
                if self.deliver(&sink, events).await {
                    shown = Some(initial);
                }
            }
        }

        loop {
            let _gate = self.turn_gate.clone().lock_owned().await;
            if cancel.is_cancelled() {
                debug!("turn loop cancelled");
                break;
            }

            let required = lock(&self.control).required_turns;
            let (grid, turn) = {
                let board = lock(&self.board);
                if board.turn >= required {
                    break;
                }
                (board.grid.clone(), board.turn)
            };

            let started = Instant::now();
            let keep_bands = self.attached_sink().is_some();
            let bands = match scatter(workers, &grid).await {
                Ok(bands) => bands,
                // Closed mid-turn: the turn is dropped, not failed
                Err(e) if cancel.is_cancelled() => {
                    debug!("turn {} abandoned after cancel: {}", turn + 1, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            let kept = keep_bands.then(|| bands.clone());
            let next = reassemble(grid.height(), grid.width(), bands).map_err(engine_error)?;

            let completed = turn + 1;
            {
                let mut board = lock(&self.board);
                board.grid = next.clone();
                board.turn = completed;
            }
            lock(&self.stats).record(started.elapsed());

            let Some(sink) = self.attached_sink() else {
                shown = None;
                continue;
            };

            let mut after = match kept {
                Some(bands) => match gather_alive(workers, bands).await {
                    Ok(cells) => cells,
                    Err(_) if cancel.is_cancelled() => next.alive_cells(),
                    Err(e) => return Err(e),
                },
                None => next.alive_cells(),
            };
            after.sort_unstable();

            let before = if self.take_resync() {
                Vec::new()
            } else {
                match shown.take() {
                    Some(cells) => cells,
                    None => {
                        let mut cells = grid.alive_cells();
                        cells.sort_unstable();
                        cells
                    }
                }
            };

            let mut events: Vec<Event> = flipped_cells(&before, &after)
                .into_iter()
                .map(|cell| Event::CellFlipped { turn: completed, cell })
                .collect();
            events.push(Event::TurnComplete { turn: completed });

            if self.deliver(&sink, events).await {
                shown = Some(after);
            }
        }

        Ok(())
    }

    /// Send to the sink, detaching it on failure
    async fn deliver(&self, sink: &Arc<dyn EventSink>, events: Vec<Event>) -> bool {
        match sink.send(events).await {
            Ok(()) => true,
            Err(e) => {
                warn!("visualization link lost, continuing headless: {:#}", e);
                self.detach_sink();
                false
            }
        }
    }

    fn finish_run(&self, run_id: u64, result: std::result::Result<(), EngineError>) {
        {
            let mut ctl = lock(&self.control);
            if ctl.run_id == run_id && ctl.state.is_active() {
                ctl.state = LifecycleState::Stopped;
            }
            ctl.detached = false;
        }
        lock(&self.pause_guard).take();

        let snapshot = {
            let board = lock(&self.board);
            Snapshot {
                turn: board.turn,
                grid: board.grid.clone(),
            }
        };
        let summary = lock(&self.stats).summary();

        match &result {
            Ok(()) => info!(run = run_id, turn = snapshot.turn, "run finished: {}", summary),
            Err(e) => error!(run = run_id, turn = snapshot.turn, "run failed: {}", e),
        }

        self.outcome.send_replace(RunOutcome {
            run_id,
            result: result.map(|()| snapshot),
        });
    }
}

/// Partition `grid`, compute every band concurrently and wait for all of them
async fn scatter(
    workers: &[Arc<dyn WorkerContract>],
    grid: &Grid,
) -> std::result::Result<Vec<Band>, EngineError> {
    let tasks = partition(grid, workers.len()).map_err(engine_error)?;

    let results = join_all(workers.iter().zip(tasks).map(|(worker, task)| async move {
        worker
            .compute_next_band(task)
            .await
            .map_err(|e| EngineError::Worker {
                worker: worker.id().to_string(),
                message: format!("{:#}", e),
            })
    }))
    .await;

    results.into_iter().collect()
}

/// Ask worker `i` for the live cells of band `i`
async fn gather_alive(
    workers: &[Arc<dyn WorkerContract>],
    bands: Vec<Band>,
) -> std::result::Result<Vec<Cell>, EngineError> {
    let results = join_all(workers.iter().zip(bands).map(|(worker, band)| async move {
        worker
            .count_alive_cells(band)
            .await
            .map_err(|e| EngineError::Worker {
                worker: worker.id().to_string(),
                message: format!("{:#}", e),
            })
    }))
    .await;

    let mut alive = Vec::new();
    for cells in results {
        alive.extend(cells?);
    }
    Ok(alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::partition::BandTask;
    use crate::worker::LocalWorker;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn local(id: &str) -> Arc<dyn WorkerContract> {
        Arc::new(LocalWorker::new(id, 2).unwrap())
    }

    fn engine_with(workers: usize) -> Engine {
        let engine = Engine::new();
        for i in 0..workers {
            engine.register(local(&format!("w{}", i))).unwrap();
        }
        engine
    }

    fn blinker() -> Grid {
        Grid::from_cells(5, 5, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)])
    }

    fn reference(grid: &Grid, turns: u64) -> Grid {
        let mut g = grid.clone();
        for _ in 0..turns {
            g = g.step();
        }
        g
    }

    fn engine_err(err: &anyhow::Error) -> &EngineError {
        err.downcast_ref::<EngineError>().unwrap()
    }

    /// Fails every compute call after `ok_calls` successes
    struct FailingWorker {
        inner: LocalWorker,
        ok_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkerContract for FailingWorker {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn compute_next_band(&self, task: BandTask) -> Result<Band> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
                anyhow::bail!("connection reset");
            }
            self.inner.compute_next_band(task).await
        }

        async fn count_alive_cells(&self, band: Band) -> Result<Vec<Cell>> {
            self.inner.count_alive_cells(band).await
        }

        async fn shutdown(&self) -> Result<()> {
            self.inner.shutdown().await
        }
    }

    /// Closes the engine from inside its `close_on_call`-th compute or count call
    struct ClosingWorker {
        inner: LocalWorker,
        engine: Mutex<Option<Engine>>,
        during_compute: bool,
        close_on_call: usize,
        calls: AtomicUsize,
    }

    impl ClosingWorker {
        fn new(during_compute: bool, close_on_call: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: LocalWorker::new("closer", 1).unwrap(),
                engine: Mutex::new(None),
                during_compute,
                close_on_call,
                calls: AtomicUsize::new(0),
            })
        }

        async fn maybe_close(&self) {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.close_on_call {
                let engine = lock(&self.engine).clone();
                if let Some(engine) = engine {
                    engine.close().await.unwrap();
                }
            }
        }
    }

    #[async_trait]
    impl WorkerContract for ClosingWorker {
        fn id(&self) -> &str {
            "closer"
        }

        async fn compute_next_band(&self, task: BandTask) -> Result<Band> {
            if self.during_compute {
                self.maybe_close().await;
            }
            self.inner.compute_next_band(task).await
        }

        async fn count_alive_cells(&self, band: Band) -> Result<Vec<Cell>> {
            if !self.during_compute {
                self.maybe_close().await;
            }
            self.inner.count_alive_cells(band).await
        }

        async fn shutdown(&self) -> Result<()> {
            self.inner.shutdown().await
        }
    }

    fn glider() -> Grid {
        Grid::from_cells(
            8,
            8,
            &[Cell::new(1, 0), Cell::new(2, 1), Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2)],
        )
    }

    async fn wait_for_turn(engine: &Engine, turn: u64) {
        while engine.status().turn < turn {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_start_without_workers() {
        let engine = Engine::new();
        let err = engine.start(blinker(), 1, None).await.unwrap_err();
        assert_eq!(engine_err(&err), &EngineError::NoWorkers);
        assert_eq!(engine.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_blinker_one_turn() {
        let engine = engine_with(1);
        let snapshot = engine.start(blinker(), 1, None).await.unwrap();

        assert_eq!(snapshot.turn, 1);
        let alive = snapshot.grid.alive_cells();
        assert_eq!(alive, vec![Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3)]);
        assert_eq!(engine.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_dead_board_stays_dead() {
        let engine = engine_with(3);
        let snapshot = engine.start(Grid::new(8, 8), 10, None).await.unwrap();
        assert_eq!(snapshot.turn, 10);
        assert_eq!(snapshot.grid.alive_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_turns_returns_initial_board() {
        let engine = engine_with(2);
        let snapshot = engine.start(blinker(), 0, None).await.unwrap();
        assert_eq!(snapshot.turn, 0);
        assert_eq!(snapshot.grid, blinker());
    }

    #[tokio::test]
    async fn test_worker_count_does_not_change_result() {
        let mut rng = StdRng::seed_from_u64(11);
        let grid = Grid::random(13, 9, 0.4, &mut rng);
        let expected = reference(&grid, 7);

        for workers in [1, 2, 4, 13, 16] {
            let engine = engine_with(workers);
            let snapshot = engine.start(grid.clone(), 7, None).await.unwrap();
            assert_eq!(snapshot.grid, expected, "workers = {}", workers);
        }
    }

    #[tokio::test]
    async fn test_pause_holds_status() {
        let engine = engine_with(2);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), 1_000_000_000, None).await });

        while engine.status().turn < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let paused_at = engine.pause().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Paused);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.status().turn, paused_at);
        assert_eq!(engine.alive_count().turn, paused_at);

        let err = engine.pause().await.unwrap_err();
        assert!(matches!(engine_err(&err), EngineError::InvalidState { .. }));

        engine.unpause().unwrap();
        while engine.status().turn <= paused_at {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let stopped = engine.stop().await.unwrap();
        let finished = run.await.unwrap().unwrap();
        assert_eq!(stopped, finished);
        assert_eq!(engine.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_while_paused() {
        let engine = engine_with(1);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), u64::MAX, None).await });

        while engine.status().turn < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let paused_at = engine.pause().await.unwrap();
        let stopped = engine.stop().await.unwrap();

        assert_eq!(stopped.turn, paused_at);
        assert_eq!(stopped.grid, reference(&blinker(), paused_at));
        assert_eq!(run.await.unwrap().unwrap().turn, paused_at);

        // Retained state is returned again
        assert_eq!(engine.stop().await.unwrap(), stopped);
    }

    #[tokio::test]
    async fn test_continue_runs_remaining_turns() {
        let engine = engine_with(2);
        let first = engine.start(blinker(), 4, None).await.unwrap();
        assert_eq!(first.turn, 4);

        let second = engine.continue_simulation(3, None).await.unwrap();
        assert_eq!(second.turn, 7);
        assert_eq!(second.grid, reference(&blinker(), 7));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let engine = engine_with(1);

        let err = engine.pause().await.unwrap_err();
        assert_eq!(
            engine_err(&err),
            &EngineError::invalid_state("pause", LifecycleState::Idle)
        );
        assert!(engine.unpause().is_err());
        assert!(engine.stop().await.is_err());
        assert!(engine.continue_simulation(1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_register_locked_during_run() {
        let engine = engine_with(1);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), u64::MAX, None).await });

        while engine.status().turn < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let err = engine.register(local("late")).unwrap_err();
        assert_eq!(engine_err(&err), &EngineError::RegistryLocked);

        engine.stop().await.unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(engine.register(local("late")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_is_never_torn() {
        let engine = engine_with(3);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), 2_000, None).await });

        let horizontal = blinker();
        let vertical = horizontal.step();
        while engine.status().grid.is_empty() {
            tokio::task::yield_now().await;
        }

        let mut last = 0;
        loop {
            let snapshot = engine.status();
            assert!(snapshot.turn >= last);
            last = snapshot.turn;

            let expected = if snapshot.turn % 2 == 0 { &horizontal } else { &vertical };
            assert_eq!(&snapshot.grid, expected, "turn {}", snapshot.turn);

            if snapshot.turn == 2_000 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(run.await.unwrap().unwrap().turn, 2_000);
    }

    #[tokio::test]
    async fn test_events_in_turn_order() {
        let engine = engine_with(2);
        let (sink, mut rx) = ChannelSink::channel();
        engine.start(blinker(), 2, Some(Arc::new(sink))).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        // 3 initial flips, then 4 flips + completion per turn
        assert_eq!(events.len(), 3 + 5 + 5);
        assert!(events[..3]
            .iter()
            .all(|e| matches!(e, Event::CellFlipped { turn: 0, .. })));
        assert_eq!(events[7], Event::TurnComplete { turn: 1 });
        assert_eq!(events[12], Event::TurnComplete { turn: 2 });

        let turns: Vec<u64> = events.iter().map(Event::turn).collect();
        assert!(turns.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_dropped_sink_detaches() {
        let engine = engine_with(1);
        let (sink, rx) = ChannelSink::channel();
        drop(rx);

        let snapshot = engine.start(blinker(), 5, Some(Arc::new(sink))).await.unwrap();
        assert_eq!(snapshot.turn, 5);
    }

    #[tokio::test]
    async fn test_disconnect_and_reattach() {
        let engine = engine_with(2);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), 500, None).await });

        while engine.status().turn < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let paused_at = engine.pause().await.unwrap();
        engine.disconnect().unwrap();
        assert_eq!(engine.state(), LifecycleState::Disconnected);

        let (sink, mut rx) = ChannelSink::channel();
        let attached = engine.clone();
        let resumed = tokio::spawn(async move {
            attached.continue_simulation(0, Some(Arc::new(sink))).await
        });
        while engine.state() != LifecycleState::Paused {
            tokio::task::yield_now().await;
        }
        engine.unpause().unwrap();

        assert_eq!(resumed.await.unwrap().unwrap().turn, 500);
        assert_eq!(run.await.unwrap().unwrap().turn, 500);
        assert_eq!(engine.state(), LifecycleState::Stopped);

        // First emission after reattaching carries the full live set
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, Event::CellFlipped { turn, .. } if turn == paused_at + 1));
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::TurnComplete { turn: paused_at + 1 }
        );
    }

    #[tokio::test]
    async fn test_worker_failure_ends_run() {
        let engine = Engine::new();
        engine.register(local("good")).unwrap();
        engine
            .register(Arc::new(FailingWorker {
                inner: LocalWorker::new("flaky", 1).unwrap(),
                ok_calls: 3,
                calls: AtomicUsize::new(0),
            }))
            .unwrap();

        let err = engine.start(blinker(), 10, None).await.unwrap_err();
        assert!(matches!(engine_err(&err), EngineError::Worker { worker, .. } if worker == "flaky"));
        assert_eq!(engine.state(), LifecycleState::Stopped);

        let status = engine.status();
        assert_eq!(status.turn, 3);
        assert_eq!(status.grid, reference(&blinker(), 3));
    }

    #[tokio::test]
    async fn test_close_shuts_down_workers() {
        let engine = Engine::new();
        let workers: Vec<Arc<LocalWorker>> = (0..3)
            .map(|i| Arc::new(LocalWorker::new(format!("w{}", i), 1).unwrap()))
            .collect();
        for w in &workers {
            engine.register(w.clone()).unwrap();
        }

        engine.start(blinker(), 2, None).await.unwrap();
        engine.close().await.unwrap();
        engine.closed().await;

        assert!(workers.iter().all(|w| w.is_shut_down()));
        assert_eq!(engine.state(), LifecycleState::Closed);

        let err = engine.register(local("late")).unwrap_err();
        assert_eq!(engine_err(&err), &EngineError::Closed);
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_if_running() {
        let engine = engine_with(1);
        engine.close_if_running().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Idle);

        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(blinker(), u64::MAX, None).await });
        while engine.status().turn < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.close_if_running().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Stopped);
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_turn_summary_counts_turns() {
        let engine = engine_with(1);
        engine.start(blinker(), 6, None).await.unwrap();
        assert_eq!(engine.turn_summary().turns, 6);
    }

    #[tokio::test]
    async fn test_stop_then_continue_resumes_from_stopped_turn() {
        let engine = engine_with(2);
        let runner = engine.clone();
        let run = tokio::spawn(async move { runner.start(glider(), u64::MAX, None).await });

        wait_for_turn(&engine, 5).await;
        let stopped = engine.stop().await.unwrap();
        assert_eq!(run.await.unwrap().unwrap(), stopped);
        assert_eq!(engine.state(), LifecycleState::Stopped);
        assert_eq!(stopped.grid, reference(&glider(), stopped.turn));

        let continued = engine.continue_simulation(7, None).await.unwrap();
        assert_eq!(continued.turn, stopped.turn + 7);
        assert_eq!(continued.grid, reference(&glider(), stopped.turn + 7));
    }

    #[tokio::test]
    async fn test_stop_during_continued_run() {
        let engine = engine_with(3);
        assert_eq!(engine.start(glider(), 3, None).await.unwrap().turn, 3);

        let runner = engine.clone();
        let run =
            tokio::spawn(async move { runner.continue_simulation(u64::MAX, None).await });
        wait_for_turn(&engine, 6).await;

        let stopped = engine.stop().await.unwrap();
        assert!(stopped.turn >= 6);
        assert_eq!(run.await.unwrap().unwrap(), stopped);
        assert_eq!(stopped.grid, reference(&glider(), stopped.turn));

        let again = engine.continue_simulation(2, None).await.unwrap();
        assert_eq!(again.turn, stopped.turn + 2);
        assert_eq!(again.grid, reference(&glider(), stopped.turn + 2));
    }

    #[tokio::test]
    async fn test_close_during_event_gather_returns_snapshot() {
        let engine = Engine::new();
        let closer = ClosingWorker::new(false, 3);
        *lock(&closer.engine) = Some(engine.clone());
        engine.register(closer).unwrap();

        let (sink, mut rx) = ChannelSink::channel();
        let snapshot = engine
            .start(glider(), u64::MAX, Some(Arc::new(sink)))
            .await
            .unwrap();

        // Turn 3 was merged before its live cells were gathered
        assert_eq!(snapshot.turn, 3);
        assert_eq!(snapshot.grid, reference(&glider(), 3));
        assert_eq!(engine.state(), LifecycleState::Closed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.last(), Some(&Event::TurnComplete { turn: 3 }));
    }

    #[tokio::test]
    async fn test_close_during_compute_returns_last_merged_turn() {
        let engine = Engine::new();
        let closer = ClosingWorker::new(true, 3);
        *lock(&closer.engine) = Some(engine.clone());
        engine.register(closer).unwrap();

        let snapshot = engine.start(glider(), u64::MAX, None).await.unwrap();
        assert_eq!(snapshot.turn, 2);
        assert_eq!(snapshot.grid, reference(&glider(), 2));
        assert_eq!(engine.state(), LifecycleState::Closed);
    }
}
