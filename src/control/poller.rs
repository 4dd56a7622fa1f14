//! Status poller
//!
//! Runs on its own wall-clock ticker, independent of turn cadence. Each tick reads
//! the latest committed snapshot from a `watch` channel, counts its live cells
//! through an `AliveCounter` and emits `Event::AliveCellsCount`. The turn loop
//! publishes a snapshot only after a turn has been fully combined, so the poller
//! never sees a grid under construction.

use crate::events::Event;
use crate::grid::Grid;
use crate::Result;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Last committed grid and the turn that produced it
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub turn: usize,
    pub grid: Arc<Grid>,
}

pub trait AliveCounter: Send + 'static {
    fn count_alive(&mut self, grid: &Grid) -> impl Future<Output = Result<usize>> + Send;
}

/// Counts by scanning the grid in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCounter;

impl AliveCounter for LocalCounter {
    async fn count_alive(&mut self, grid: &Grid) -> Result<usize> {
        Ok(grid.alive_count())
    }
}

pub struct StatusPoller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Start ticking. The first tick fires one `interval` after spawning.
    pub fn spawn<A: AliveCounter>(
        mut counter: A,
        mut snapshots: watch::Receiver<Snapshot>,
        events: mpsc::Sender<Event>,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = snapshots.borrow_and_update().clone();
                let counted = tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    counted = counter.count_alive(&snapshot.grid) => counted,
                };
                let cells_count = match counted {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Alive cell count failed at turn {}: {:#}", snapshot.turn, e);
                        continue;
                    }
                };

                let event = Event::AliveCellsCount {
                    completed_turns: snapshot.turn,
                    cells_count,
                };
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    sent = events.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Status poller stopped");
        });

        Self { stop, handle }
    }

    /// Stop the ticker, abandoning a count still in flight
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!("Status poller task failed: {}", e);
        }
    }
}
