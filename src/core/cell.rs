//! Screen cells and the row-major cell grid.
//!
//! Invariant: a virtual cell (the right half of a double-width grapheme) is
//! never written directly; writes at its position clear both halves first.

use crate::core::geometry::{Pos, Size};
use crate::core::look::{Color, Look};

/// The atomic unit of the screen: one grapheme and its appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// UTF-8 bytes of a single user-perceived character; empty means blank.
    pub grapheme: String,
    /// Display width in columns (1 or 2).
    pub width: u8,
    pub look: Look,
    /// True when this cell differs from what the terminal displays.
    pub dirty: bool,
    /// True when this cell is the right half of its left neighbor.
    pub is_virtual: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            look: Look::default(),
            dirty: false,
            is_virtual: false,
        }
    }
}

impl Cell {
    /// Reset to the default blank cell, keeping the dirty flag raised.
    pub fn reset(&mut self) {
        self.grapheme.clear();
        self.width = 1;
        self.look = Look::default();
        self.is_virtual = false;
        self.dirty = true;
    }
}

/// A width x height grid of cells, indexed row-major.
#[derive(Debug, Default)]
pub struct ScreenBuffer {
    rows: Vec<Vec<Cell>>,
    size: Size,
}

impl ScreenBuffer {
    pub fn new(size: Size) -> Self {
        let mut buffer = Self::default();
        buffer.set_size(size);
        buffer
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Resize, preserving the top-left overlap. Newly exposed cells start at
    /// the defaults; surviving cells are marked dirty so the next flush
    /// repaints them.
    pub fn set_size(&mut self, size: Size) {
        let width = usize::from(size.width);
        let height = usize::from(size.height);

        self.rows.truncate(height);
        for row in &mut self.rows {
            row.truncate(width);
            for cell in row.iter_mut() {
                cell.dirty = true;
            }
            row.resize_with(width, Cell::default);
        }
        self.rows.resize_with(height, || vec![Cell::default(); width]);

        self.size = size;
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        self.rows
            .get(usize::from(pos.y))
            .and_then(|row| row.get(usize::from(pos.x)))
    }

    pub fn cell_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        self.rows
            .get_mut(usize::from(pos.y))
            .and_then(|row| row.get_mut(usize::from(pos.x)))
    }

    pub fn mark_all_dirty(&mut self) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                cell.dirty = true;
            }
        }
    }

    /// Write a grapheme at `pos`. Out-of-bounds writes are discarded.
    ///
    /// Writing at a virtual position clears the owning double-width cell
    /// first; overwriting the left half of a pair releases its partner. A
    /// width-2 grapheme that would hang past the last column clears the
    /// target cell instead.
    pub fn set_cell(&mut self, pos: Pos, grapheme: &str, width: u8, look: Look) {
        if !self.size.contains(pos) {
            return;
        }

        if self.cell(pos).is_some_and(|cell| cell.is_virtual) {
            // pos.x > 0 by construction: column 0 can never be a right half.
            let parent = Pos::new(pos.x - 1, pos.y);
            if let Some(cell) = self.cell_mut(parent) {
                cell.reset();
            }
        }

        if self.cell(pos).is_some_and(|cell| cell.width == 2) {
            let partner = Pos::new(pos.x + 1, pos.y);
            if let Some(cell) = self.cell_mut(partner) {
                if cell.is_virtual {
                    cell.reset();
                }
            }
        }

        if width == 2 && pos.x + 1 >= self.size.width {
            if let Some(cell) = self.cell_mut(pos) {
                cell.reset();
            }
            return;
        }

        let resolved = look.resolved_over(self.cell(pos).map(|cell| cell.look).unwrap_or_default());
        if let Some(cell) = self.cell_mut(pos) {
            cell.grapheme.clear();
            cell.grapheme.push_str(grapheme);
            cell.width = width;
            cell.look = resolved;
            cell.is_virtual = false;
            cell.dirty = true;
        }

        if width == 2 {
            let partner = Pos::new(pos.x + 1, pos.y);
            if let Some(cell) = self.cell_mut(partner) {
                cell.reset();
                cell.is_virtual = true;
            }
        }
    }

    /// Clear every cell in the buffer to a blank with the given colors.
    /// `NoChange` components keep the cell's stored color.
    pub fn clear(&mut self, bg: Color, fg: Color) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                let kept = cell.look;
                cell.reset();
                cell.look = Look::new(
                    fg.resolved_over(kept.fg),
                    bg.resolved_over(kept.bg),
                    Default::default(),
                );
            }
        }
    }
}
