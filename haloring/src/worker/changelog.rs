//! Two-buffer change log.
//!
//! `committed` is the set of cells whose state at the end of generation
//! `T - 1` differs from the initial board; `pending` is the ordered list of
//! cells flipped by the transition into generation `T`. Folding `pending`
//! into `committed` as a symmetric difference yields the committed set for
//! `T`, which is exactly what the broker does for workers sitting at the
//! minimum turn during snapshot reconciliation.
//!
//! All coordinates are global.

use std::collections::HashSet;

use crate::board::Cell;

#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    committed: HashSet<Cell>,
    pending: Vec<Cell>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops both buffers; the log then describes an untouched board.
    pub fn reset(&mut self) {
        self.committed.clear();
        self.pending.clear();
    }

    /// Folds the previous generation's flips into `committed` and installs
    /// the fresh generation's flips as the new `pending`.
    pub fn advance(&mut self, flips: Vec<Cell>) {
        for cell in self.pending.drain(..) {
            if !self.committed.insert(cell) {
                self.committed.remove(&cell);
            }
        }
        self.pending = flips;
    }

    pub fn committed(&self) -> &HashSet<Cell> {
        &self.committed
    }

    pub fn pending(&self) -> &[Cell] {
        &self.pending
    }

    /// Copies both buffers for the wire.
    pub fn snapshot(&self) -> (Vec<Cell>, Vec<Cell>) {
        (
            self.committed.iter().copied().collect(),
            self.pending.clone(),
        )
    }
}
