//! Partition reassembly
//!
//! Partition results are concatenated in ascending partition order, whatever order
//! they completed in. A slot is missing when its worker failed (`None`) or returned
//! a cell count that does not match its row range. What happens then is decided by
//! the `FailurePolicy`; the output grid always has the prior grid's dimensions.

use super::partition::RowRange;
use crate::grid::{Cell, Grid, GridError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// What to do with a turn that lost one or more partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the turn with an error
    #[default]
    FailTurn,
    /// Keep the prior rows for missing partitions and flag the turn incomplete
    BestEffort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailTurn => write!(f, "fail_turn"),
            FailurePolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_turn" | "fail" => Ok(FailurePolicy::FailTurn),
            "best_effort" | "best" => Ok(FailurePolicy::BestEffort),
            other => Err(format!(
                "unknown failure policy '{}' (expected fail_turn or best_effort)",
                other
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CombineError {
    #[error("partitions {0:?} returned no usable result")]
    MissingPartitions(Vec<usize>),

    #[error("expected {expected} partition results, got {actual}")]
    PartitionCount { expected: usize, actual: usize },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Next grid plus the partitions that had to be filled from the prior grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combined {
    pub grid: Grid,
    pub missing: Vec<usize>,
}

impl Combined {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Reassemble partition results into the next grid
pub fn combine(
    prior: &Grid,
    ranges: &[RowRange],
    parts: Vec<Option<Vec<Cell>>>,
    policy: FailurePolicy,
) -> Result<Combined, CombineError> {
    if ranges.len() != parts.len() {
        return Err(CombineError::PartitionCount {
            expected: ranges.len(),
            actual: parts.len(),
        });
    }

    let width = prior.width();
    let missing: Vec<usize> = parts
        .iter()
        .zip(ranges)
        .enumerate()
        .filter(|(_, (part, range))| match part {
            Some(cells) => cells.len() != range.len() * width,
            None => true,
        })
        .map(|(i, _)| i)
        .collect();

    if !missing.is_empty() && policy == FailurePolicy::FailTurn {
        return Err(CombineError::MissingPartitions(missing));
    }

    let mut cells = Vec::with_capacity(prior.cells().len());
    for (i, (part, range)) in parts.into_iter().zip(ranges).enumerate() {
        match part {
            Some(rows) if !missing.contains(&i) => cells.extend(rows),
            _ => cells.extend_from_slice(prior.rows(range.start, range.end)),
        }
    }

    let grid = Grid::from_cells(width, prior.height(), cells)?;
    Ok(Combined { grid, missing })
}
