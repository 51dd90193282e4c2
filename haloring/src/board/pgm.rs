//! Binary PGM (P5) encoding for board snapshots.
//!
//! Snapshots are written as `P5\n{W} {H}\n255\n` followed by the H*W cell
//! bytes in row-major order. The reader tolerates arbitrary whitespace and
//! `#` comments between header tokens, which is what common PGM emitters
//! produce.

use std::io::{self, Read, Write};

use thiserror::Error;

use super::Board;

/// Maximum grey value; doubles as the live-cell sentinel.
const MAX_VAL: u32 = 255;

/// Errors raised while encoding or decoding PGM data.
#[derive(Debug, Error)]
pub enum PgmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a binary PGM: expected magic P5")]
    BadMagic,

    #[error("malformed header: {0}")]
    Header(String),

    #[error("unsupported max value {0}, expected 255")]
    MaxVal(u32),

    #[error("truncated pixel data: expected {expected} bytes, read {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Snapshot file name for a board at a given turn: `{H}x{W}x{turn}`.
pub fn snapshot_filename(board: &Board, turn: u32) -> String {
    format!("{}x{}x{}", board.height(), board.width(), turn)
}

/// Writes a board as binary PGM.
pub fn write<W: Write>(writer: &mut W, board: &Board) -> Result<(), PgmError> {
    write!(writer, "P5\n{} {}\n{}\n", board.width(), board.height(), MAX_VAL)?;
    writer.write_all(board.cells())?;
    writer.flush()?;
    Ok(())
}

/// Reads a binary PGM into a board.
pub fn read<R: Read>(reader: &mut R) -> Result<Board, PgmError> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).map_err(|_| PgmError::BadMagic)?;
    if &magic != b"P5" {
        return Err(PgmError::BadMagic);
    }

    let width = read_header_value(reader)? as usize;
    let height = read_header_value(reader)? as usize;
    if width == 0 || height == 0 {
        return Err(PgmError::Header("zero-sized dimensions".to_string()));
    }
    let max_val = read_header_value(reader)?;
    if max_val != MAX_VAL {
        return Err(PgmError::MaxVal(max_val));
    }

    let expected = width * height;
    let mut cells = vec![0u8; expected];
    let mut actual = 0;
    while actual < expected {
        match reader.read(&mut cells[actual..])? {
            0 => return Err(PgmError::Truncated { expected, actual }),
            n => actual += n,
        }
    }

    Board::from_cells(width, height, cells)
        .ok_or_else(|| PgmError::Header("payload does not match dimensions".to_string()))
}

/// Reads the next whitespace-delimited decimal token, skipping `#` comments.
///
/// Consumes exactly one byte of trailing whitespace, which for the final
/// header token is the single separator before the pixel payload.
fn read_header_value<R: Read>(reader: &mut R) -> Result<u32, PgmError> {
    let mut value: Option<u32> = None;
    let mut in_comment = false;
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            return Err(PgmError::Header("unexpected end of header".to_string()));
        }
        let b = byte[0];
        if in_comment {
            in_comment = b != b'\n';
            continue;
        }
        match b {
            b'#' if value.is_none() => in_comment = true,
            b'0'..=b'9' => {
                let digit = (b - b'0') as u32;
                value = Some(
                    value
                        .unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(digit))
                        .ok_or_else(|| PgmError::Header("dimension overflow".to_string()))?,
                );
            }
            b' ' | b'\t' | b'\r' | b'\n' => {
                if let Some(v) = value {
                    return Ok(v);
                }
            }
            other => {
                return Err(PgmError::Header(format!(
                    "unexpected byte 0x{other:02x} in header"
                )))
            }
        }
    }
}
