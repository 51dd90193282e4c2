//! Command tokens and visualiser events.
//!
//! Keyboard handling lives outside this crate; whatever embeds the
//! controller reduces its input to [`Command`] tokens and consumes
//! [`Event`]s however it likes (the CLI prints them).

use std::fmt;

use crate::board::Cell;

/// An interactive request to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write a PGM snapshot of the current world.
    Snapshot,
    /// Toggle pause.
    Pause,
    /// Quit the controller, leaving broker and workers running.
    QuitLocal,
    /// Snapshot, then shut down broker and workers, then quit.
    QuitAll,
}

/// Controller execution state as reported to the visualiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Executing,
    Paused,
    Quitting,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Executing => write!(f, "Executing"),
            RunState::Paused => write!(f, "Paused"),
            RunState::Quitting => write!(f, "Quitting"),
        }
    }
}

/// Events emitted towards the visualiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Periodic live-cell census.
    AliveCellsCount {
        completed_turns: u32,
        cells_count: usize,
    },
    /// A snapshot file was written.
    ImageOutputComplete {
        completed_turns: u32,
        filename: String,
    },
    /// The controller changed execution state.
    StateChange {
        completed_turns: u32,
        new_state: RunState,
    },
    /// The run reached its target turn.
    FinalTurnComplete {
        completed_turns: u32,
        alive_cells: Vec<Cell>,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "turn {completed_turns}: {cells_count} cells alive"),
            Event::ImageOutputComplete {
                completed_turns,
                filename,
            } => write!(f, "turn {completed_turns}: wrote {filename}"),
            Event::StateChange {
                completed_turns,
                new_state,
            } => write!(f, "turn {completed_turns}: {new_state}"),
            Event::FinalTurnComplete {
                completed_turns,
                alive_cells,
            } => write!(
                f,
                "turn {completed_turns}: final board has {} cells alive",
                alive_cells.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = Event::AliveCellsCount {
            completed_turns: 12,
            cells_count: 34,
        };
        assert_eq!(event.to_string(), "turn 12: 34 cells alive");

        let event = Event::StateChange {
            completed_turns: 3,
            new_state: RunState::Paused,
        };
        assert_eq!(event.to_string(), "turn 3: Paused");
    }
}
