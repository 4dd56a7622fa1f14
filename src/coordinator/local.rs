//! In-process coordinator
//!
//! One tokio task per partition, each with its own bounded input and output
//! channel. A turn sends every worker its halo segment, then receives the outputs
//! strictly in partition order. The partition layout is fixed at spawn time.
//! Workers hand each segment to the blocking pool, so the async runtime stays free
//! for the rest of the run while a turn computes.
//!
//! A turn that fails partway leaves the workers in an unknown state; the
//! coordinator then drops them all and rejects further turns.
//!
//! Closing a worker's input channel is its termination signal; `finish()` closes
//! them all and joins the tasks.

use super::{TurnCoordinator, TurnOutcome};
use crate::engine::{combine, halo_segment, partition_rows, step_segment};
use crate::engine::{FailurePolicy, KernelOutput, RowRange, Segment};
use crate::grid::{CellCoord, Grid};
use crate::Result;
use anyhow::{bail, Context};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct LocalWorker {
    index: usize,
    range: RowRange,
    input: mpsc::Sender<Segment>,
    output: mpsc::Receiver<KernelOutput>,
    handle: JoinHandle<()>,
}

pub struct LocalCoordinator {
    width: usize,
    height: usize,
    workers: Vec<LocalWorker>,
}

async fn worker_loop(
    index: usize,
    mut input: mpsc::Receiver<Segment>,
    output: mpsc::Sender<KernelOutput>,
) {
    while let Some(segment) = input.recv().await {
        // keep the kernel off the async workers so the status poller still ticks
        let result = match tokio::task::spawn_blocking(move || step_segment(&segment)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Local worker {} kernel failed: {}", index, e);
                break;
            }
        };
        if output.send(result).await.is_err() {
            break;
        }
    }
    debug!("Local worker {} exiting", index);
}

impl LocalCoordinator {
    /// Spawn the worker tasks. Must be called from within a tokio runtime.
    ///
    /// `threads` is clamped to `1..=height`; `queue_depth` bounds every channel.
    pub fn spawn(width: usize, height: usize, threads: usize, queue_depth: usize) -> Self {
        let ranges = partition_rows(height, threads);
        let depth = queue_depth.max(1);

        let workers = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| {
                let (input_tx, input_rx) = mpsc::channel(depth);
                let (output_tx, output_rx) = mpsc::channel(depth);
                let handle = tokio::spawn(worker_loop(index, input_rx, output_tx));
                LocalWorker {
                    index,
                    range,
                    input: input_tx,
                    output: output_rx,
                    handle,
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Spawned {} local workers for a {}x{} grid",
            workers.len(),
            width,
            height
        );

        Self {
            width,
            height,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn ranges(&self) -> Vec<RowRange> {
        self.workers.iter().map(|w| w.range).collect()
    }

    async fn join_workers(&mut self) -> Result<()> {
        for worker in self.workers.drain(..) {
            drop(worker.input);
            worker
                .handle
                .await
                .with_context(|| format!("Local worker {} panicked", worker.index))?;
        }
        Ok(())
    }
}

impl TurnCoordinator for LocalCoordinator {
    async fn compute_turn(&mut self, grid: &Grid) -> Result<TurnOutcome> {
        if (grid.width(), grid.height()) != (self.width, self.height) {
            bail!(
                "Grid is {}x{} but workers were spawned for {}x{}",
                grid.width(),
                grid.height(),
                self.width,
                self.height
            );
        }
        if self.workers.is_empty() {
            bail!("Local workers have already been stopped");
        }

        let outcome = self.run_turn(grid).await;
        if outcome.is_err() {
            warn!("Turn failed; stopping all {} local workers", self.workers.len());
            // queued outputs from the failed turn must never reach a later one
            self.workers.clear();
        }
        outcome
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.join_workers().await
    }

    async fn finish(&mut self) -> Result<()> {
        self.join_workers().await
    }
}

impl LocalCoordinator {
    /// Fan the segments out and the outputs back in
    async fn run_turn(&mut self, grid: &Grid) -> Result<TurnOutcome> {
        for worker in &self.workers {
            worker
                .input
                .send(halo_segment(grid, worker.range))
                .await
                .with_context(|| format!("Local worker {} is gone", worker.index))?;
        }

        let mut parts = Vec::with_capacity(self.workers.len());
        let mut flipped = Vec::new();
        for worker in &mut self.workers {
            let Some(output) = worker.output.recv().await else {
                bail!("Local worker {} exited mid-turn", worker.index);
            };
            let offset = worker.range.start;
            flipped.extend(
                output
                    .flipped
                    .iter()
                    .map(|c| CellCoord::new(c.x, c.y + offset)),
            );
            parts.push(Some(output.cells));
        }

        let ranges = self.ranges();
        let combined = combine(grid, &ranges, parts, FailurePolicy::FailTurn)?;
        Ok(TurnOutcome {
            grid: combined.grid,
            flipped,
            missing_partitions: combined.missing,
        })
    }
}
