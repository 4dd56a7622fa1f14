//! distlife - partitioned Game of Life
//!
//! distlife evolves a toroidal Game of Life board for a fixed number of turns,
//! splitting every turn into horizontal row partitions that are computed either
//! by in-process workers or by remote worker services behind a broker.
//!
//! # Architecture
//!
//! - **Engine**: partitioning, the per-cell kernel, and combining partitions
//! - **Coordinators**: local channel-fed workers, or a TCP broker over remote workers
//! - **Control**: the turn loop, pause/save/quit key handling, alive-count polling
//! - **Events**: an ordered stream of progress events for a front-end
//! - **Images**: PGM snapshots in and out

pub mod config;
pub mod control;
pub mod coordinator;
pub mod distributed;
pub mod engine;
pub mod events;
pub mod grid;
pub mod io;

// Re-export commonly used types
pub use config::Config;
pub use events::Event;
pub use grid::{Cell, CellCoord, Grid};

/// Result type used throughout distlife
pub type Result<T> = anyhow::Result<T>;
