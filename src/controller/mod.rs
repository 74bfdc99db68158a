//! Session controller
//!
//! The controller owns the operator's side of a run: it loads the initial
//! board, starts (or continues) the simulation, samples the live-cell count
//! while the run executes, reacts to keypresses and finishes the session with
//! the final board written to disk.
//!
//! | Key | Action |
//! |-----|--------|
//! | `s` | save the current board |
//! | `p` | pause; press again to resume |
//! | `q` | detach, leaving the run going headless |
//! | `k` | stop the run, save it and shut the whole system down |
//!
//! Everything the operator sees goes through one event channel. In local mode
//! the engine's [`ChannelSink`](crate::events::ChannelSink) feeds the same
//! channel; in distributed mode the engine dials the [`EventListener`].

mod control;
pub mod keys;
pub mod listener;
pub mod view;

pub use control::{LocalControl, RemoteControl, SimulationControl};
pub use keys::{stdin_keys, Key};
pub use listener::EventListener;
pub use view::{report_events, BoardView};

use crate::board::Grid;
use crate::config::Config;
use crate::engine::Snapshot;
use crate::events::{Event, SessionState};
use crate::image::ImageStore;
use crate::Result;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a session runs
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub height: usize,
    pub width: usize,
    /// Turns to run; with `continue_run`, turns to add to the stopped run
    pub turns: u64,
    pub continue_run: bool,
    pub sample_interval: Duration,
    /// Generate a random board instead of loading the input image
    pub random_density: Option<f64>,
    pub seed: Option<u64>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            height: config.board.height,
            width: config.board.width,
            turns: config.board.turns,
            continue_run: config.controller.continue_run,
            sample_interval: config.controller.sample_interval(),
            random_density: config.board.random_density,
            seed: config.board.seed,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The run reached its turn count
    Completed(Snapshot),
    /// `k`: the run was stopped and the system closed
    Killed(Snapshot),
    /// `q`: the controller left; the run carries on headless
    Detached { turn: u64 },
}

impl SessionEnd {
    pub fn turn(&self) -> u64 {
        match self {
            SessionEnd::Completed(snapshot) | SessionEnd::Killed(snapshot) => snapshot.turn,
            SessionEnd::Detached { turn } => *turn,
        }
    }
}

pub struct SessionController {
    control: Arc<dyn SimulationControl>,
    store: Arc<dyn ImageStore>,
    events: mpsc::UnboundedSender<Event>,
    settings: SessionSettings,
}

impl SessionController {
    pub fn new(
        control: Arc<dyn SimulationControl>,
        store: Arc<dyn ImageStore>,
        events: mpsc::UnboundedSender<Event>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            control,
            store,
            events,
            settings,
        }
    }

    /// Run the session until the simulation finishes or a key ends it
    pub async fn run(&self, mut keys: mpsc::Receiver<Key>) -> Result<SessionEnd> {
        let control = self.control.clone();
        let turns = self.settings.turns;

        let mut run = if self.settings.continue_run {
            info!(turns, "continuing previous run");
            tokio::spawn(async move { control.continue_simulation(turns).await })
        } else {
            self.control
                .close_if_running()
                .await
                .context("Failed to stop the previous run")?;
            let grid = self.initial_board()?;
            info!(
                height = grid.height(),
                width = grid.width(),
                alive = grid.alive_count(),
                turns,
                "starting run"
            );
            tokio::spawn(async move { control.start(grid, turns).await })
        };

        let period = self.settings.sample_interval;
        let mut sampler = interval_at(Instant::now() + period, period);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut paused = false;
        let mut keys_open = true;

        loop {
            tokio::select! {
                joined = &mut run => {
                    let snapshot = joined.context("Simulation task failed")??;
                    self.finish(&snapshot)?;
                    return Ok(SessionEnd::Completed(snapshot));
                }
                _ = sampler.tick(), if !paused => self.sample().await,
                key = keys.recv(), if keys_open => match key {
                    None => {
                        debug!("key input closed");
                        keys_open = false;
                    }
                    Some(Key::Save) => self.save_current().await,
                    Some(Key::Pause) => {
                        paused = self.toggle_pause(paused).await;
                        if !paused {
                            sampler.reset();
                        }
                    }
                    Some(Key::Quit) => {
                        self.control.disconnect().await?;
                        run.abort();
                        let turn = self.control.status().await?.turn;
                        self.emit(Event::StateChange { turn, state: SessionState::Quitting });
                        info!(turn, "detached from run");
                        return Ok(SessionEnd::Detached { turn });
                    }
                    Some(Key::Kill) => {
                        self.control.stop().await?;
                        let snapshot = (&mut run).await.context("Simulation task failed")??;
                        self.finish(&snapshot)?;
                        self.control.close_system().await?;
                        info!(turn = snapshot.turn, "system closed");
                        return Ok(SessionEnd::Killed(snapshot));
                    }
                },
            }
        }
    }

    fn initial_board(&self) -> Result<Grid> {
        let s = &self.settings;
        match s.random_density {
            Some(density) => {
                let mut rng = match s.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                Ok(Grid::random(s.height, s.width, density, &mut rng))
            }
            None => self.store.load(s.height, s.width),
        }
    }

    async fn sample(&self) {
        match self.control.alive_count().await {
            Ok(sample) => self.emit(Event::AliveCellsCount {
                turn: sample.turn,
                count: sample.alive,
            }),
            Err(e) => warn!("alive-cell sample failed: {:#}", e),
        }
    }

    async fn save_current(&self) {
        let saved = async {
            let snapshot = self.control.status().await?;
            let filename = self.store.save(&snapshot.grid, snapshot.turn)?;
            Ok::<_, anyhow::Error>((snapshot.turn, filename))
        };
        match saved.await {
            Ok((turn, filename)) => self.emit(Event::ImageOutputComplete { turn, filename }),
            Err(e) => warn!("save failed: {:#}", e),
        }
    }

    /// Returns whether the session is paused afterwards
    async fn toggle_pause(&self, paused: bool) -> bool {
        if paused {
            match self.control.unpause().await {
                Ok(turn) => {
                    println!("Continuing");
                    self.emit(Event::StateChange { turn, state: SessionState::Executing });
                }
                Err(e) => warn!("resume failed: {:#}", e),
            }
            false
        } else {
            match self.control.pause().await {
                Ok(turn) => {
                    println!("Paused on turn {}", turn);
                    self.emit(Event::StateChange { turn, state: SessionState::Paused });
                    true
                }
                Err(e) => {
                    warn!("pause failed: {:#}", e);
                    false
                }
            }
        }
    }

    fn finish(&self, snapshot: &Snapshot) -> Result<()> {
        let turn = snapshot.turn;
        self.emit(Event::FinalTurnComplete {
            turn,
            alive: snapshot.grid.alive_cells(),
        });

        let filename = self
            .store
            .save(&snapshot.grid, turn)
            .context("Failed to save final board")?;
        self.emit(Event::ImageOutputComplete { turn, filename });
        self.emit(Event::StateChange { turn, state: SessionState::Quitting });
        Ok(())
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("event receiver gone");
        }
    }
}
