//! Conway rule kernel (B3/S23) and row partitioning.
//!
//! Workers never see the whole torus. Each generation they build a virtual
//! stripe of height `h + 2` - their own rows with the upper and lower halo
//! rows from the ring neighbours bolted on - and run the kernel over the
//! interior. Vertical neighbours are then plain `y - 1` / `y + 1` reads;
//! only the x axis wraps.
//!
//! [`step`] is the single-process reference on the full torus. A distributed
//! run over any worker and thread count must reproduce it bit for bit.

use crate::board::{Board, Cell, ALIVE, DEAD};

/// Splits `total` items into `parts` contiguous runs.
///
/// Each run gets `total / parts` items; the first `total % parts` runs get
/// one extra. Used both by the broker (board rows across workers) and the
/// worker (stripe rows across compute tasks).
pub fn split_lengths(total: usize, parts: usize) -> Vec<usize> {
    let average = total / parts;
    let rest = total % parts;
    (0..parts)
        .map(|i| if i < rest { average + 1 } else { average })
        .collect()
}

/// Counts live neighbours of `(x, y)` inside a virtual stripe.
///
/// `y` must have valid rows above and below; `x` wraps modulo `width`.
#[inline]
fn live_neighbours(cells: &[u8], width: usize, x: usize, y: usize) -> usize {
    let left = (x + width - 1) % width;
    let right = (x + 1) % width;
    let mut count = 0;
    for row in [y - 1, y + 1] {
        let base = row * width;
        count += usize::from(cells[base + left] != DEAD);
        count += usize::from(cells[base + x] != DEAD);
        count += usize::from(cells[base + right] != DEAD);
    }
    let base = y * width;
    count += usize::from(cells[base + left] != DEAD);
    count += usize::from(cells[base + right] != DEAD);
    count
}

/// Runs the rule over rows `[y0, y1)` of a virtual stripe.
///
/// `virtual_stripe` holds `h + 2` rows: halo, stripe, halo. The range must
/// stay within the interior, `1 <= y0 <= y1 <= h`. Returned cells are
/// stripe-local: the halo offset is already subtracted, so `y` is in
/// `[0, h)`.
pub fn flipped_in_rows(
    virtual_stripe: &[u8],
    width: usize,
    y0: usize,
    y1: usize,
) -> Vec<Cell> {
    let mut flipped = Vec::new();
    for y in y0..y1 {
        for x in 0..width {
            let alive = virtual_stripe[y * width + x] != DEAD;
            let neighbours = live_neighbours(virtual_stripe, width, x, y);
            let flips = if alive {
                !(2..=3).contains(&neighbours)
            } else {
                neighbours == 3
            };
            if flips {
                flipped.push(Cell::new(x, y - 1));
            }
        }
    }
    flipped
}

/// Advances a full board by one generation on the torus.
pub fn step(board: &Board) -> Board {
    let width = board.width();
    let height = board.height();
    let mut next = board.clone();
    for y in 0..height {
        for x in 0..width {
            let mut neighbours = 0;
            for dy in [height - 1, 0, 1] {
                for dx in [width - 1, 0, 1] {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = (x + dx) % width;
                    let ny = (y + dy) % height;
                    neighbours += usize::from(board.is_alive(nx, ny));
                }
            }
            let cell = if board.is_alive(x, y) {
                if (2..=3).contains(&neighbours) {
                    ALIVE
                } else {
                    DEAD
                }
            } else if neighbours == 3 {
                ALIVE
            } else {
                DEAD
            };
            next.set(x, y, cell);
        }
    }
    next
}

/// Iterates [`step`] `turns` times.
pub fn step_n(board: &Board, turns: u32) -> Board {
    let mut current = board.clone();
    for _ in 0..turns {
        current = step(&current);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from_art(rows: &[&str]) -> Board {
        let width = rows[0].len();
        let cells = rows
            .iter()
            .flat_map(|row| row.bytes().map(|b| if b == b'O' { ALIVE } else { DEAD }))
            .collect();
        Board::from_cells(width, rows.len(), cells).unwrap()
    }

    #[test]
    fn test_split_lengths_even() {
        assert_eq!(split_lengths(12, 4), vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_split_lengths_remainder_goes_first() {
        assert_eq!(split_lengths(16, 3), vec![6, 5, 5]);
        assert_eq!(split_lengths(5, 2), vec![3, 2]);
    }

    #[test]
    fn test_split_lengths_more_parts_than_items() {
        assert_eq!(split_lengths(2, 4), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_block_is_still() {
        let block = board_from_art(&["....", ".OO.", ".OO.", "...."]);
        assert_eq!(step(&block), block);
    }

    #[test]
    fn test_blinker_oscillates() {
        let horizontal = board_from_art(&[".....", ".....", ".OOO.", ".....", "....."]);
        let vertical = board_from_art(&[".....", "..O..", "..O..", "..O..", "....."]);

        assert_eq!(step(&horizontal), vertical);
        assert_eq!(step(&vertical), horizontal);
        assert_eq!(step_n(&horizontal, 4), horizontal);
    }

    #[test]
    fn test_glider_returns_home_on_torus() {
        // One diagonal cell every 4 generations; 32 generations walk it all
        // the way around an 8x8 torus.
        let glider = board_from_art(&[
            ".O......",
            "..O.....",
            "OOO.....",
            "........",
            "........",
            "........",
            "........",
            "........",
        ]);
        assert_ne!(step_n(&glider, 4), glider);
        assert_eq!(step_n(&glider, 32), glider);
    }

    #[test]
    fn test_wrap_around_edges() {
        // A blinker straddling the right edge must see its wrapped column.
        let board = board_from_art(&["....", "O..O", "O..O", "...."]);
        let next = step(&board);
        assert!(next.is_alive(0, 1));
        assert!(next.is_alive(3, 1));
        assert!(next.is_alive(0, 2));
        assert!(next.is_alive(3, 2));
    }

    #[test]
    fn test_flipped_in_rows_matches_reference() {
        let board = board_from_art(&[".....", ".....", ".OOO.", ".....", "....."]);
        let reference = step(&board);

        // Treat the whole board as one stripe and fake the torus halos.
        let height = board.height();
        let mut virtual_stripe = board.row(height - 1).to_vec();
        virtual_stripe.extend_from_slice(board.cells());
        virtual_stripe.extend_from_slice(board.row(0));

        let mut stripe = board.clone();
        let flips = flipped_in_rows(&virtual_stripe, board.width(), 1, height + 1);
        stripe.apply_flips(&flips);
        assert_eq!(stripe, reference);
    }

    #[test]
    fn test_flipped_in_rows_single_row_stripe() {
        // Middle row of a vertical blinker as a one-row stripe: both halos
        // carry the live column, so the row grows its horizontal arms.
        let spine_row = [DEAD, DEAD, ALIVE, DEAD, DEAD];

        let mut virtual_stripe = spine_row.to_vec();
        virtual_stripe.extend_from_slice(&spine_row);
        virtual_stripe.extend_from_slice(&spine_row);

        let flips = flipped_in_rows(&virtual_stripe, 5, 1, 2);
        assert_eq!(flips, vec![Cell::new(1, 0), Cell::new(3, 0)]);
    }

    #[test]
    fn test_flipped_in_rows_empty_range() {
        let virtual_stripe = vec![DEAD; 15];
        assert!(flipped_in_rows(&virtual_stripe, 5, 1, 1).is_empty());
    }
}
