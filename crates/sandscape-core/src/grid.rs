//! Row-major grid store: two parallel word buffers (heads, tails).

use thiserror::Error;

use crate::codec::{Cell, CodecError};

/// Errors raised by grid accessors and buffer import.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("coordinate ({x}, {y}) outside {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
    #[error("{buffer} buffer holds {actual} words, expected {expected}")]
    BufferLength {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("cell {index} is corrupt: {source}")]
    CorruptCell {
        index: usize,
        #[source]
        source: CodecError,
    },
}

/// Width x height cells stored as parallel row-major `u32` buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    heads: Vec<u32>,
    tails: Vec<u32>,
}

impl Grid {
    /// Construct a grid with every cell set to `fill`.
    pub fn new(width: u32, height: u32, fill: Cell) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::ZeroDimension { width, height });
        }
        let len = (width as usize) * (height as usize);
        Ok(Self {
            width,
            height,
            heads: vec![fill.head; len],
            tails: vec![fill.tail; len],
        })
    }

    /// Rebuild a grid from persisted buffers, validating lengths and every cell.
    pub fn from_buffers(
        heads: Vec<u32>,
        tails: Vec<u32>,
        width: u32,
        height: u32,
    ) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::ZeroDimension { width, height });
        }
        let expected = (width as usize) * (height as usize);
        if heads.len() != expected {
            return Err(GridError::BufferLength {
                buffer: "heads",
                expected,
                actual: heads.len(),
            });
        }
        if tails.len() != expected {
            return Err(GridError::BufferLength {
                buffer: "tails",
                expected,
                actual: tails.len(),
            });
        }
        for (index, (&head, &tail)) in heads.iter().zip(&tails).enumerate() {
            Cell::new(head, tail)
                .validate()
                .map_err(|source| GridError::CorruptCell { index, source })?;
        }
        Ok(Self {
            width,
            height,
            heads,
            tails,
        })
    }

    /// Replace the whole grid with persisted buffers.
    pub fn import_buffers(
        &mut self,
        heads: Vec<u32>,
        tails: Vec<u32>,
        width: u32,
        height: u32,
    ) -> Result<(), GridError> {
        *self = Self::from_buffers(heads, tails, width, height)?;
        Ok(())
    }

    /// Borrow both buffers in row-major order.
    #[must_use]
    pub fn export_buffers(&self) -> (&[u32], &[u32]) {
        (&self.heads, &self.tails)
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Flat index for `(x, y)`; callers must have checked [`Grid::in_bounds`].
    #[inline]
    #[must_use]
    pub const fn index(&self, x: i32, y: i32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    fn checked_index(&self, x: i32, y: i32) -> Result<usize, GridError> {
        if self.in_bounds(x, y) {
            Ok(self.index(x, y))
        } else {
            Err(GridError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    pub fn get_cell(&self, x: i32, y: i32) -> Result<Cell, GridError> {
        let idx = self.checked_index(x, y)?;
        Ok(Cell::new(self.heads[idx], self.tails[idx]))
    }

    /// Bounds-tolerant read used by neighbourhood probes.
    #[inline]
    #[must_use]
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        self.in_bounds(x, y).then(|| {
            let idx = self.index(x, y);
            Cell::new(self.heads[idx], self.tails[idx])
        })
    }

    pub fn set_cell(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), GridError> {
        let idx = self.checked_index(x, y)?;
        self.heads[idx] = cell.head;
        self.tails[idx] = cell.tail;
        Ok(())
    }

    pub fn get_head(&self, x: i32, y: i32) -> Result<u32, GridError> {
        let idx = self.checked_index(x, y)?;
        Ok(self.heads[idx])
    }

    pub fn set_head(&mut self, x: i32, y: i32, head: u32) -> Result<(), GridError> {
        let idx = self.checked_index(x, y)?;
        self.heads[idx] = head;
        Ok(())
    }

    pub fn get_tail(&self, x: i32, y: i32) -> Result<u32, GridError> {
        let idx = self.checked_index(x, y)?;
        Ok(self.tails[idx])
    }

    pub fn set_tail(&mut self, x: i32, y: i32, tail: u32) -> Result<(), GridError> {
        let idx = self.checked_index(x, y)?;
        self.tails[idx] = tail;
        Ok(())
    }

    /// Exchange both words of two cells.
    pub fn swap(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<(), GridError> {
        let a = self.checked_index(x1, y1)?;
        let b = self.checked_index(x2, y2)?;
        self.swap_indices(a, b);
        Ok(())
    }

    #[inline]
    pub(crate) fn swap_indices(&mut self, a: usize, b: usize) {
        self.heads.swap(a, b);
        self.tails.swap(a, b);
    }

    #[inline]
    pub(crate) fn head_at(&self, idx: usize) -> u32 {
        self.heads[idx]
    }

    #[inline]
    pub(crate) fn cell_at_index(&self, idx: usize) -> Cell {
        Cell::new(self.heads[idx], self.tails[idx])
    }

    #[inline]
    pub(crate) fn put(&mut self, idx: usize, cell: Cell) {
        self.heads[idx] = cell.head;
        self.tails[idx] = cell.tail;
    }

    /// Overwrite every cell with `cell`.
    pub fn fill(&mut self, cell: Cell) {
        self.heads.fill(cell.head);
        self.tails.fill(cell.tail);
    }

    /// Iterate `(x, y, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, Cell)> + '_ {
        let width = self.width as usize;
        self.heads
            .iter()
            .zip(&self.tails)
            .enumerate()
            .map(move |(idx, (&head, &tail))| {
                (
                    (idx % width) as i32,
                    (idx / width) as i32,
                    Cell::new(head, tail),
                )
            })
    }
}
