//! Snapshot reconciliation.
//!
//! Workers run autonomously, so at the instant the broker samples the ring
//! some workers sit at generation `T` and some at `T + 1`; the halo
//! protocol bounds the spread at one. Each worker reports
//! `(committed, pending, turn)`:
//!
//! - a worker at the minimum turn `T` has a committed set describing
//!   `T - 1`, so its pending buffer is folded in to lift it to `T`;
//! - a worker at `T + 1` has a committed set that already describes `T`
//!   and is taken as-is;
//! - anything further ahead violates the protocol.
//!
//! The union of the reconciled sets is the flipped-set of the whole board
//! relative to the initial world at generation `T`.

use std::collections::HashSet;

use crate::board::{Board, Cell};
use crate::protocol::WorldChangeResponse;

use super::BrokerError;

/// Merges per-worker change logs into the global flipped-set at the
/// minimum reported turn.
pub fn merge_changes(
    responses: &[WorldChangeResponse],
) -> Result<(HashSet<Cell>, u32), BrokerError> {
    let turn = responses
        .iter()
        .map(|r| r.current_turn)
        .min()
        .ok_or(BrokerError::NoActiveRun)?;

    let mut flipped = HashSet::new();
    for response in responses {
        let mut committed: HashSet<Cell> = response.committed.iter().copied().collect();
        if response.current_turn == turn {
            for cell in &response.pending {
                if !committed.insert(*cell) {
                    committed.remove(cell);
                }
            }
        } else if response.current_turn - turn > 1 {
            return Err(BrokerError::NotSync);
        }
        flipped.extend(committed);
    }
    Ok((flipped, turn))
}

/// Reconstructs the world at the reconciled turn from the read-only
/// initial board.
pub fn rebuild_world(
    initial: &Board,
    responses: &[WorldChangeResponse],
) -> Result<(Board, u32), BrokerError> {
    let (flipped, turn) = merge_changes(responses)?;
    let mut world = initial.clone();
    world.apply_flips(&flipped);
    Ok((world, turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ALIVE;

    fn response(committed: &[(usize, usize)], pending: &[(usize, usize)], turn: u32) -> WorldChangeResponse {
        WorldChangeResponse {
            committed: committed.iter().map(|&(x, y)| Cell::new(x, y)).collect(),
            pending: pending.iter().map(|&(x, y)| Cell::new(x, y)).collect(),
            current_turn: turn,
        }
    }

    #[test]
    fn test_empty_ring_is_no_active_run() {
        assert!(matches!(
            merge_changes(&[]),
            Err(BrokerError::NoActiveRun)
        ));
    }

    #[test]
    fn test_laggard_folds_pending() {
        // One worker at the minimum turn: its pending buffer lifts the
        // committed set to that turn.
        let responses = [response(&[(0, 0)], &[(1, 1)], 880)];
        let (flipped, turn) = merge_changes(&responses).unwrap();
        assert_eq!(turn, 880);
        assert!(flipped.contains(&Cell::new(0, 0)));
        assert!(flipped.contains(&Cell::new(1, 1)));
    }

    #[test]
    fn test_fold_is_symmetric_difference() {
        // Pending re-flips a committed cell: two flips cancel out.
        let responses = [response(&[(2, 2)], &[(2, 2)], 10)];
        let (flipped, _) = merge_changes(&responses).unwrap();
        assert!(flipped.is_empty());
    }

    #[test]
    fn test_one_ahead_keeps_committed_untouched() {
        // The 880/881 mix from the ring: three laggards fold, the early
        // riser's committed set already describes turn 880.
        let responses = [
            response(&[(0, 0)], &[(0, 1)], 880),
            response(&[(1, 0)], &[(9, 9)], 881),
            response(&[(2, 0)], &[(2, 1)], 880),
            response(&[(3, 0)], &[(3, 1)], 880),
        ];
        let (flipped, turn) = merge_changes(&responses).unwrap();
        assert_eq!(turn, 880);
        // Laggards contribute committed + pending.
        for cell in [Cell::new(0, 0), Cell::new(0, 1), Cell::new(2, 1), Cell::new(3, 1)] {
            assert!(flipped.contains(&cell));
        }
        // The ahead worker contributes committed only.
        assert!(flipped.contains(&Cell::new(1, 0)));
        assert!(!flipped.contains(&Cell::new(9, 9)));
    }

    #[test]
    fn test_two_ahead_is_not_sync() {
        let responses = [
            response(&[], &[], 880),
            response(&[], &[], 882),
        ];
        assert!(matches!(
            merge_changes(&responses),
            Err(BrokerError::NotSync)
        ));
    }

    #[test]
    fn test_rebuild_world_applies_flips() {
        let mut initial = Board::new(4, 4);
        initial.set(0, 0, ALIVE);

        let responses = [response(&[(0, 0), (1, 1)], &[], 5)];
        let (world, turn) = rebuild_world(&initial, &responses).unwrap();
        assert_eq!(turn, 5);
        assert!(!world.is_alive(0, 0), "flip kills the initially live cell");
        assert!(world.is_alive(1, 1), "flip raises the initially dead cell");
        // The initial board itself is untouched.
        assert!(initial.is_alive(0, 0));
    }
}
