//! Chunk cursor owned by the pipeline driver.
//!
//! A chunk is the half-open range of data rows `[start_row, start_row + chunk_size)`,
//! counted after the header line. The cursor only ever moves forward.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCursor {
    pub start_row: usize,
    pub chunk_size: usize,
}

impl ChunkCursor {
    pub fn new(start_row: usize, chunk_size: usize) -> Self {
        ChunkCursor {
            start_row,
            chunk_size,
        }
    }

    /// First row past the chunk (exclusive bound).
    pub fn end_row(&self) -> usize {
        self.start_row + self.chunk_size
    }

    /// Move the cursor to the next chunk of the same size.
    pub fn advance(&mut self) {
        self.start_row = self.end_row();
    }

    /// `true` once the cursor starts at or after the last data row.
    pub fn is_exhausted(&self, total_rows: usize) -> bool {
        self.start_row >= total_rows
    }

    /// Index of the chunk, used to name chunk-indexed outputs.
    pub fn index(&self) -> usize {
        if self.chunk_size == 0 {
            0
        } else {
            self.start_row / self.chunk_size
        }
    }
}

impl fmt::Display for ChunkCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_row, self.end_row())
    }
}

#[cfg(test)]
mod chunk_test {
    use super::*;

    #[test]
    fn test_cursor_advances_monotonically() {
        let mut cursor = ChunkCursor::new(0, 10);
        assert_eq!(cursor.index(), 0);
        cursor.advance();
        assert_eq!(cursor, ChunkCursor::new(10, 10));
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.to_string(), "[10, 20)");
        assert!(!cursor.is_exhausted(15));
        cursor.advance();
        assert!(cursor.is_exhausted(15));
    }
}
