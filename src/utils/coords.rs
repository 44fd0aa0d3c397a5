use serde::{Deserialize, Serialize};

use super::{Size, Vec2};

// ----------------------------------------------
// Cell
// ----------------------------------------------

// X,Y position in the tile grid of cells.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    #[inline]
    pub const fn invalid() -> Self {
        Self { x: -1, y: -1 }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x >= 0 && self.y >= 0
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

// ----------------------------------------------
// CellRange
// ----------------------------------------------

#[derive(Copy, Clone)]
pub struct CellRange {
    // Inclusive range, e.g.: [start..=end]
    pub start: Cell,
    pub end: Cell,
}

impl CellRange {
    #[inline]
    pub const fn new(start: Cell, end: Cell) -> Self {
        Self { start, end }
    }

    // Full range of a grid of the given size, [0,0] anchored.
    #[inline]
    pub fn from_size(size: Size) -> Self {
        Self {
            start: Cell::zero(),
            end: Cell::new(size.width - 1, size.height - 1),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.start.is_valid() && self.end.is_valid() &&
        self.start.x <= self.end.x && self.start.y <= self.end.y
    }

    #[inline]
    pub fn iter(&self) -> CellRangeIter {
        CellRangeIter::new(*self)
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        if cell.x < self.start.x || cell.y < self.start.y {
            return false;
        }
        if cell.x > self.end.x || cell.y > self.end.y {
            return false;
        }
        true
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{},{}; {},{}]",
               self.start.x,
               self.start.y,
               self.end.x,
               self.end.y)
    }
}

// ----------------------------------------------
// CellRangeIter
// ----------------------------------------------

// Row-major iteration over an inclusive cell range.
#[derive(Copy, Clone)]
pub struct CellRangeIter {
    range:  CellRange,
    curr_y: i32,
    curr_x: i32,
    done:   bool,
}

impl CellRangeIter {
    #[inline]
    pub fn new(range: CellRange) -> Self {
        Self {
            range,
            curr_y: range.start.y,
            curr_x: range.start.x,
            done: !range.is_valid(),
        }
    }
}

impl Iterator for CellRangeIter {
    type Item = Cell;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = Cell {
            x: self.curr_x,
            y: self.curr_y,
        };

        // Determine next x,y:
        if self.curr_x < self.range.end.x {
            self.curr_x += 1;
        } else if self.curr_y < self.range.end.y {
            self.curr_y += 1;
            self.curr_x = self.range.start.x;
        } else {
            self.done = true;
        }

        Some(result)
    }
}

// ----------------------------------------------
// GridTransform
// ----------------------------------------------

// Affine world<->grid mapping: a world-space origin offset plus a
// uniform cell size. Bounds checking against a live grid is the
// caller's responsibility; this is a pure coordinate mapping.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct GridTransform {
    pub origin: Vec2,
    pub cell_size: f32,
}

impl GridTransform {
    #[inline]
    pub fn new(origin: Vec2, cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        Self { origin, cell_size }
    }

    // Maps a world position to the cell containing it. Positions below
    // or left of the origin map to Cell::invalid().
    #[inline]
    pub fn world_to_cell(&self, world_pos: Vec2) -> Cell {
        let local = world_pos - self.origin;
        if local.x < 0.0 || local.y < 0.0 {
            return Cell::invalid();
        }
        Cell::new(
            (local.x / self.cell_size).floor() as i32,
            (local.y / self.cell_size).floor() as i32,
        )
    }

    // World position of the center of the given cell.
    #[inline]
    pub fn cell_to_world_center(&self, cell: Cell) -> Vec2 {
        self.origin + Vec2::new(cell.x as f32 + 0.5, cell.y as f32 + 0.5) * self.cell_size
    }
}

impl Default for GridTransform {
    #[inline]
    fn default() -> Self {
        Self { origin: Vec2::zero(), cell_size: 1.0 }
    }
}

// ----------------------------------------------
// Unit Tests
// ----------------------------------------------
