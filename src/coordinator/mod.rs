//! Turn coordinators
//!
//! A coordinator owns the work of one turn: it partitions the current grid, hands
//! the partitions to its workers, waits for every result and combines them. The
//! turn loop in `control::distributor` is written against the `TurnCoordinator`
//! trait, so the same loop drives the in-process variant (`local`) and the
//! network variant (`distributed::client::BrokerClient`).

pub mod local;

pub use local::LocalCoordinator;

use crate::grid::{CellCoord, Grid};
use crate::Result;
use std::future::Future;

/// Result of one committed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub grid: Grid,
    /// Cells that changed, in grid coordinates
    pub flipped: Vec<CellCoord>,
    /// Partitions whose rows were carried over unchanged
    pub missing_partitions: Vec<usize>,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing_partitions.is_empty()
    }
}

pub trait TurnCoordinator: Send {
    /// Compute the grid that follows `grid`
    fn compute_turn(&mut self, grid: &Grid) -> impl Future<Output = Result<TurnOutcome>> + Send;

    /// Stop every worker this coordinator reaches, remote services included
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release local resources at the end of a run
    fn finish(&mut self) -> impl Future<Output = Result<()>> + Send;
}
