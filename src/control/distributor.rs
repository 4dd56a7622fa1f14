//! Turn loop
//!
//! The distributor loads the initial grid, runs turns through a `TurnCoordinator`
//! until the turn budget is spent or the user quits, and reports progress as
//! `Event`s. Control signals are drained between turns, never during one, so a
//! turn that has been dispatched always commits before a quit takes effect.
//!
//! # Run Sequence
//!
//! ```text
//! load "<W>x<H>" -> CellsFlipped(0, alive) -> StateChange(0, Executing)
//!   repeat: drain signals -> compute turn -> CellsFlipped -> TurnComplete
//! FinalTurnComplete -> save "<W>x<H>x<turn>" -> ImageOutputComplete
//!   -> [shutdown cascade] -> StateChange(Quitting) -> events channel closed
//! ```

use super::poller::{AliveCounter, Snapshot, StatusPoller};
use super::{ControlSignal, ControlState, StateMachine, Transition};
use crate::coordinator::TurnCoordinator;
use crate::distributed::protocol::Params;
use crate::events::Event;
use crate::grid::Grid;
use crate::io::{input_name, output_name, ImageStore};
use crate::Result;
use anyhow::{bail, Context};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub turns_completed: usize,
    pub alive_cells: usize,
    /// Name of the final snapshot
    pub final_image: String,
    /// Whether remote services were told to shut down
    pub shutdown: bool,
}

pub struct Distributor<C, S, A> {
    coordinator: C,
    store: S,
    counter: Option<A>,
    params: Params,
    status_interval: Duration,
    events: mpsc::Sender<Event>,
    signals: mpsc::Receiver<ControlSignal>,
}

impl<C, S, A> Distributor<C, S, A>
where
    C: TurnCoordinator,
    S: ImageStore,
    A: AliveCounter,
{
    pub fn new(
        coordinator: C,
        store: S,
        counter: A,
        params: Params,
        status_interval: Duration,
        events: mpsc::Sender<Event>,
        signals: mpsc::Receiver<ControlSignal>,
    ) -> Self {
        Self {
            coordinator,
            store,
            counter: Some(counter),
            params,
            status_interval,
            events,
            signals,
        }
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Write a snapshot of `grid` and report it
    async fn save(&self, grid: &Grid, turn: usize) -> Result<String> {
        let name = output_name(grid.width(), grid.height(), turn);
        self.store
            .write(&name, grid)
            .with_context(|| format!("Failed to save {}", name))?;
        info!("Saved {}", name);
        self.emit(Event::ImageOutputComplete {
            completed_turns: turn,
            filename: name.clone(),
        })
        .await;
        Ok(name)
    }

    fn load(&self) -> Result<Grid> {
        let (width, height) = (self.params.image_width, self.params.image_height);
        let grid = self
            .store
            .read(&input_name(width, height))
            .context("Failed to load initial grid")?;
        if (grid.width(), grid.height()) != (width, height) {
            bail!(
                "Initial image is {}x{}, expected {}x{}",
                grid.width(),
                grid.height(),
                width,
                height
            );
        }
        Ok(grid)
    }

    /// Run to completion. The event channel closes when this returns.
    pub async fn run(mut self) -> Result<RunSummary> {
        let initial = self.load()?;
        let alive = initial.alive_cells();
        if !alive.is_empty() {
            self.emit(Event::CellsFlipped {
                completed_turns: 0,
                cells: alive,
            })
            .await;
        }
        self.emit(Event::StateChange {
            completed_turns: 0,
            new_state: ControlState::Executing,
        })
        .await;

        let mut grid = Arc::new(initial);
        let mut turn = 0;
        let (snapshots, snapshot_rx) = watch::channel(Snapshot {
            turn,
            grid: grid.clone(),
        });

        let counter = self
            .counter
            .take()
            .context("Distributor has already run")?;
        let poller = StatusPoller::spawn(
            counter,
            snapshot_rx,
            self.events.clone(),
            self.status_interval,
        );

        let mut machine = StateMachine::new();
        let looped = self
            .turn_loop(&mut machine, &mut grid, &mut turn, &snapshots)
            .await;
        poller.stop().await;

        if let Err(e) = looped {
            warn!("Run stopped at turn {}: {:#}", turn, e);
            if let Err(finish_err) = self.coordinator.finish().await {
                warn!("Failed to release workers: {:#}", finish_err);
            }
            self.emit(Event::StateChange {
                completed_turns: turn,
                new_state: ControlState::Quitting,
            })
            .await;
            return Err(e);
        }

        let alive = grid.alive_cells();
        let alive_cells = alive.len();
        self.emit(Event::FinalTurnComplete {
            completed_turns: turn,
            alive,
        })
        .await;
        let final_image = self.save(&grid, turn).await?;

        let shutdown = machine.shutdown_requested();
        if shutdown {
            info!("Shutting down broker and workers");
            self.coordinator.shutdown().await?;
        }
        self.coordinator.finish().await?;

        self.emit(Event::StateChange {
            completed_turns: turn,
            new_state: ControlState::Quitting,
        })
        .await;

        Ok(RunSummary {
            turns_completed: turn,
            alive_cells,
            final_image,
            shutdown,
        })
    }

    async fn turn_loop(
        &mut self,
        machine: &mut StateMachine,
        grid: &mut Arc<Grid>,
        turn: &mut usize,
        snapshots: &watch::Sender<Snapshot>,
    ) -> Result<()> {
        while *turn < self.params.turns {
            self.drain_signals(machine, grid, *turn).await?;
            if machine.is_quitting() {
                break;
            }

            let outcome = self
                .coordinator
                .compute_turn(grid)
                .await
                .with_context(|| format!("Turn {} failed", *turn + 1))?;
            if !outcome.is_complete() {
                warn!(
                    "Turn {} is incomplete: partitions {:?} kept their prior rows",
                    *turn + 1,
                    outcome.missing_partitions
                );
            }

            *turn += 1;
            if !outcome.flipped.is_empty() {
                self.emit(Event::CellsFlipped {
                    completed_turns: *turn,
                    cells: outcome.flipped,
                })
                .await;
            }
            *grid = Arc::new(outcome.grid);
            snapshots.send_replace(Snapshot {
                turn: *turn,
                grid: grid.clone(),
            });
            self.emit(Event::TurnComplete {
                completed_turns: *turn,
            })
            .await;
        }
        Ok(())
    }

    /// Apply pending signals; while paused, block until a signal arrives
    async fn drain_signals(
        &mut self,
        machine: &mut StateMachine,
        grid: &Grid,
        turn: usize,
    ) -> Result<()> {
        loop {
            let signal = if machine.is_paused() {
                match self.signals.recv().await {
                    Some(signal) => signal,
                    None => {
                        warn!("Control input closed while paused; quitting");
                        machine.apply(ControlSignal::Quit);
                        return Ok(());
                    }
                }
            } else {
                match self.signals.try_recv() {
                    Ok(signal) => signal,
                    Err(_) => return Ok(()),
                }
            };

            match machine.apply(signal) {
                Transition::Snapshot => {
                    self.save(grid, turn).await?;
                }
                Transition::Entered(ControlState::Quitting) => {
                    info!("Quit requested at turn {}", turn);
                    return Ok(());
                }
                Transition::Entered(state) => {
                    info!("Turn {}: {}", turn, state);
                    self.emit(Event::StateChange {
                        completed_turns: turn,
                        new_state: state,
                    })
                    .await;
                }
                Transition::Ignored => {}
            }
        }
    }
}
