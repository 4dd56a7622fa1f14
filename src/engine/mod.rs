//! Turn engine
//!
//! The engine is the pure part of a turn: splitting the grid into row partitions,
//! applying the Game of Life rule to one partition, and stitching partition results
//! back into the next grid. Nothing here does I/O or spawns tasks; the coordinators
//! in `coordinator` and `distributed` decide where each partition runs.
//!
//! # Modules
//!
//! - `partition`: row-range splitting and halo segments
//! - `kernel`: transition rule and partition stepping
//! - `combine`: ordered reassembly with a failure policy

pub mod combine;
pub mod kernel;
pub mod partition;

pub use combine::{combine, Combined, CombineError, FailurePolicy};
pub use kernel::{next_state, step_grid, step_rows, step_segment, KernelOutput};
pub use partition::{clamp_workers, halo_segment, partition_rows, RowRange, Segment};
