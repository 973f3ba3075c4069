//! Binary PGM (P5) import/export
//!
//! The driver loads its starting board from a greyscale image and writes the
//! final generation back out. Any non-zero pixel is read as a live cell.

use super::{Board, ALIVE, DEAD};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read a board from a P5 PGM file
pub fn read_pgm(path: &Path) -> Result<Board> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read PGM file: {}", path.display()))?;
    decode_pgm(&bytes).with_context(|| format!("Invalid PGM file: {}", path.display()))
}

/// Write a board as a P5 PGM file, creating parent directories as needed
pub fn write_pgm(path: &Path, board: &Board) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, encode_pgm(board))
        .with_context(|| format!("Failed to write PGM file: {}", path.display()))
}

/// Encode a board as P5 bytes with maxval 255
pub fn encode_pgm(board: &Board) -> Vec<u8> {
    let header = format!("P5\n{} {}\n255\n", board.width(), board.height());
    let mut out = Vec::with_capacity(header.len() + board.cells().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(board.cells());
    out
}

/// Decode P5 bytes into a board
pub fn decode_pgm(bytes: &[u8]) -> Result<Board> {
    let mut pos = 0;
    let magic = next_token(bytes, &mut pos).context("Missing PGM magic")?;
    if magic != "P5" {
        anyhow::bail!("Unsupported PGM magic {:?}, expected P5", magic);
    }
    let width: usize = next_token(bytes, &mut pos)
        .context("Missing PGM width")?
        .parse()
        .context("Invalid PGM width")?;
    let height: usize = next_token(bytes, &mut pos)
        .context("Missing PGM height")?
        .parse()
        .context("Invalid PGM height")?;
    let maxval: u32 = next_token(bytes, &mut pos)
        .context("Missing PGM maxval")?
        .parse()
        .context("Invalid PGM maxval")?;
    if maxval == 0 || maxval > 255 {
        anyhow::bail!("Unsupported PGM maxval {} (only 8-bit images)", maxval);
    }

    // Exactly one whitespace byte separates the header from the raster
    pos += 1;
    let expected = width
        .checked_mul(height)
        .with_context(|| format!("PGM size {}x{} is too large", width, height))?;
    let end = pos
        .checked_add(expected)
        .with_context(|| format!("PGM size {}x{} is too large", width, height))?;
    let raster = bytes.get(pos..end).ok_or_else(|| {
        anyhow::anyhow!(
            "PGM raster truncated: need {} bytes, have {}",
            expected,
            bytes.len().saturating_sub(pos)
        )
    })?;

    let cells = raster
        .iter()
        .map(|&p| if p == 0 { DEAD } else { ALIVE })
        .collect();
    Ok(Board::from_cells(width, height, cells)?)
}

/// Read the next whitespace-delimited header token, skipping `#` comments
fn next_token(bytes: &[u8], pos: &mut usize) -> Option<String> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }

    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    if start == *pos {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[start..*pos]).into_owned())
}
