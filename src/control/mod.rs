//! Run control
//!
//! The control layer gates the turn loop. Key presses arrive as `ControlSignal`s;
//! the `StateMachine` turns each one into a `Transition` that tells the turn loop
//! what to do next. Quitting is terminal: once entered, every later signal is
//! ignored.
//!
//! # Modules
//!
//! - `distributor`: the turn loop itself
//! - `poller`: periodic alive-cell reporting on committed snapshots

pub mod distributor;
pub mod poller;

pub use distributor::{Distributor, RunSummary};
pub use poller::{AliveCounter, LocalCounter, StatusPoller};

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ControlState {
    #[default]
    Executing,
    Paused,
    Quitting,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlState::Executing => "Executing",
            ControlState::Paused => "Paused",
            ControlState::Quitting => "Quitting",
        };
        f.write_str(name)
    }
}

/// User control input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    Save,
    TogglePause,
    Quit,
    /// Quit and shut down the broker and every worker
    Shutdown,
}

impl ControlSignal {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            's' => Some(ControlSignal::Save),
            'p' => Some(ControlSignal::TogglePause),
            'q' => Some(ControlSignal::Quit),
            'k' => Some(ControlSignal::Shutdown),
            _ => None,
        }
    }
}

/// Effect of one signal on the turn loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed to the contained value
    Entered(ControlState),
    /// Write a snapshot of the current grid; state unchanged
    Snapshot,
    /// Signal had no effect
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: ControlState,
    cascade: bool,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ControlState::Paused
    }

    pub fn is_quitting(&self) -> bool {
        self.state == ControlState::Quitting
    }

    /// Whether the run must end by shutting down remote services
    pub fn shutdown_requested(&self) -> bool {
        self.cascade
    }

    pub fn apply(&mut self, signal: ControlSignal) -> Transition {
        if self.is_quitting() {
            return Transition::Ignored;
        }
        match signal {
            ControlSignal::Save => Transition::Snapshot,
            ControlSignal::TogglePause => {
                self.state = match self.state {
                    ControlState::Paused => ControlState::Executing,
                    _ => ControlState::Paused,
                };
                Transition::Entered(self.state)
            }
            ControlSignal::Quit => {
                self.state = ControlState::Quitting;
                Transition::Entered(self.state)
            }
            ControlSignal::Shutdown => {
                self.state = ControlState::Quitting;
                self.cascade = true;
                Transition::Entered(self.state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_toggles() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state(), ControlState::Executing);
        assert_eq!(
            sm.apply(ControlSignal::TogglePause),
            Transition::Entered(ControlState::Paused)
        );
        assert!(sm.is_paused());
        assert_eq!(
            sm.apply(ControlSignal::TogglePause),
            Transition::Entered(ControlState::Executing)
        );
    }

    #[test]
    fn test_save_keeps_state() {
        let mut sm = StateMachine::new();
        sm.apply(ControlSignal::TogglePause);
        assert_eq!(sm.apply(ControlSignal::Save), Transition::Snapshot);
        assert!(sm.is_paused());
    }

    #[test]
    fn test_quitting_is_terminal() {
        let mut sm = StateMachine::new();
        sm.apply(ControlSignal::Quit);
        assert!(sm.is_quitting());
        assert!(!sm.shutdown_requested());
        assert_eq!(sm.apply(ControlSignal::TogglePause), Transition::Ignored);
        assert_eq!(sm.apply(ControlSignal::Shutdown), Transition::Ignored);
        assert!(!sm.shutdown_requested());
    }

    #[test]
    fn test_shutdown_requests_cascade() {
        let mut sm = StateMachine::new();
        sm.apply(ControlSignal::TogglePause);
        assert_eq!(
            sm.apply(ControlSignal::Shutdown),
            Transition::Entered(ControlState::Quitting)
        );
        assert!(sm.shutdown_requested());
    }

    #[test]
    fn test_keys() {
        assert_eq!(ControlSignal::from_key('s'), Some(ControlSignal::Save));
        assert_eq!(ControlSignal::from_key('p'), Some(ControlSignal::TogglePause));
        assert_eq!(ControlSignal::from_key('q'), Some(ControlSignal::Quit));
        assert_eq!(ControlSignal::from_key('k'), Some(ControlSignal::Shutdown));
        assert_eq!(ControlSignal::from_key('x'), None);
    }
}
