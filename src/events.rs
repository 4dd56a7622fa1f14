//! Run events
//!
//! Everything the turn loop reports to the outside world goes through a
//! `tokio::sync::mpsc` channel of `Event`. The binary renders them through `log`
//! or, with `--events-json`, as one JSON object per line.

use crate::control::ControlState;
use crate::grid::CellCoord;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Cells that changed value during `completed_turns`
    CellsFlipped {
        completed_turns: usize,
        cells: Vec<CellCoord>,
    },
    TurnComplete {
        completed_turns: usize,
    },
    StateChange {
        completed_turns: usize,
        new_state: ControlState,
    },
    ImageOutputComplete {
        completed_turns: usize,
        filename: String,
    },
    FinalTurnComplete {
        completed_turns: usize,
        alive: Vec<CellCoord>,
    },
    AliveCellsCount {
        completed_turns: usize,
        cells_count: usize,
    },
}

impl Event {
    pub fn completed_turns(&self) -> usize {
        match self {
            Event::CellsFlipped { completed_turns, .. }
            | Event::TurnComplete { completed_turns }
            | Event::StateChange { completed_turns, .. }
            | Event::ImageOutputComplete { completed_turns, .. }
            | Event::FinalTurnComplete { completed_turns, .. }
            | Event::AliveCellsCount { completed_turns, .. } => *completed_turns,
        }
    }

    /// Events worth showing at `info` level; the rest are per-turn noise
    pub fn is_milestone(&self) -> bool {
        !matches!(self, Event::CellsFlipped { .. } | Event::TurnComplete { .. })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellsFlipped {
                completed_turns,
                cells,
            } => write!(f, "turn {}: {} cells flipped", completed_turns, cells.len()),
            Event::TurnComplete { completed_turns } => {
                write!(f, "turn {} complete", completed_turns)
            }
            Event::StateChange {
                completed_turns,
                new_state,
            } => write!(f, "turn {}: {}", completed_turns, new_state),
            Event::ImageOutputComplete {
                completed_turns,
                filename,
            } => write!(f, "turn {}: wrote {}", completed_turns, filename),
            Event::FinalTurnComplete {
                completed_turns,
                alive,
            } => write!(
                f,
                "final turn {} complete, {} cells alive",
                completed_turns,
                alive.len()
            ),
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "turn {}: {} cells alive", completed_turns, cells_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let event = Event::AliveCellsCount {
            completed_turns: 4,
            cells_count: 17,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "alive_cells_count");
        assert_eq!(value["completed_turns"], 4);
        assert_eq!(value["cells_count"], 17);
    }

    #[test]
    fn test_state_change_display() {
        let event = Event::StateChange {
            completed_turns: 2,
            new_state: ControlState::Paused,
        };
        assert_eq!(event.to_string(), "turn 2: Paused");
        assert_eq!(event.completed_turns(), 2);
        assert!(event.is_milestone());
        assert!(!Event::TurnComplete { completed_turns: 1 }.is_milestone());
    }
}
