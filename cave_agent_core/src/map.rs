use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Location;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Location ({row}, {column}) is out of bounds for grid size ({rows}, {columns})")]
    OutOfBounds {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order and is
/// addressed by [`Location`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    rows: usize,
    columns: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `rows * columns` overflows `usize`.
    pub fn new(rows: usize, columns: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = rows.checked_mul(columns).expect("Grid size overflow");
        Grid {
            rows,
            columns,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a new grid whose cells are produced by `f`, called once per
    /// location in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `rows * columns` overflows `usize`.
    pub fn from_generator<F>(rows: usize, columns: usize, mut f: F) -> Self
    where
        F: FnMut(Location) -> T,
    {
        let size = rows.checked_mul(columns).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for row in 0..rows {
            for column in 0..columns {
                cells.push(f(Location { row, column }));
            }
        }
        Grid {
            rows,
            columns,
            cells,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Converts a location to a flat vector index, `None` when out of bounds.
    #[inline]
    fn index_of(&self, location: Location) -> Option<usize> {
        if self.contains(location) {
            Some(location.row * self.columns + location.column)
        } else {
            None
        }
    }

    /// Checks if the location is within the grid boundaries.
    #[inline]
    pub fn contains(&self, location: Location) -> bool {
        location.row < self.rows && location.column < self.columns
    }

    /// Builds the out-of-bounds error for `location`.
    pub fn out_of_bounds(&self, location: Location) -> GridError {
        GridError::OutOfBounds {
            row: location.row,
            column: location.column,
            rows: self.rows,
            columns: self.columns,
        }
    }

    /// Gets an immutable reference to the cell at `location`.
    pub fn get(&self, location: Location) -> Option<&T> {
        let index = self.index_of(location)?;
        self.cells.get(index)
    }

    /// Gets a mutable reference to the cell at `location`, or an error when the
    /// location lies outside the grid.
    pub fn get_mut(&mut self, location: Location) -> Result<&mut T, GridError> {
        let index = self
            .index_of(location)
            .ok_or_else(|| self.out_of_bounds(location))?;
        Ok(&mut self.cells[index])
    }

    /// Returns an iterator that yields `(Location, &T)` for each cell in
    /// row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Location, &T)> {
        let columns = self.columns;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            (
                Location {
                    row: index / columns,
                    column: index % columns,
                },
                cell,
            )
        })
    }
}

impl<T> Index<Location> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, location: Location) -> &Self::Output {
        match self.index_of(location) {
            Some(idx) => &self.cells[idx],
            None => panic!("{}", self.out_of_bounds(location)),
        }
    }
}

impl<T> IndexMut<Location> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, location: Location) -> &mut Self::Output {
        match self.index_of(location) {
            Some(idx) => &mut self.cells[idx],
            None => panic!("{}", self.out_of_bounds(location)),
        }
    }
}

/// Errors raised when a cave layout is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaveError {
    #[error("cave has no cells ({rows} x {columns})")]
    Empty { rows: usize, columns: usize },
    #[error("rock bitmap holds {len} cells, expected {rows} x {columns}")]
    LengthMismatch {
        rows: usize,
        columns: usize,
        len: usize,
    },
}

/// The static layout of the cave: which cells are rock.
///
/// Fixed for a session; a resent layout replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CaveRecord", into = "CaveRecord")]
pub struct Cave {
    rocks: Grid<bool>,
}

/// Wire shape of a cave: dimensions plus a row-major rock bitmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaveRecord {
    rows: usize,
    columns: usize,
    rocks: Vec<bool>,
}

impl Cave {
    pub fn new(rows: usize, columns: usize, rocks: Vec<bool>) -> Result<Self, CaveError> {
        if rows == 0 || columns == 0 {
            return Err(CaveError::Empty { rows, columns });
        }
        if rows.checked_mul(columns) != Some(rocks.len()) {
            return Err(CaveError::LengthMismatch {
                rows,
                columns,
                len: rocks.len(),
            });
        }
        Ok(Cave {
            rocks: Grid {
                rows,
                columns,
                cells: rocks,
            },
        })
    }

    /// Builds a cave by asking `is_rock` about every cell.
    pub fn from_fn<F>(rows: usize, columns: usize, is_rock: F) -> Self
    where
        F: FnMut(Location) -> bool,
    {
        Cave {
            rocks: Grid::from_generator(rows, columns, is_rock),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rocks.rows()
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.rocks.columns()
    }

    #[inline]
    pub fn contains(&self, location: Location) -> bool {
        self.rocks.contains(location)
    }

    /// True for rock cells. Cells outside the cave count as rock.
    #[inline]
    pub fn is_rock(&self, location: Location) -> bool {
        self.rocks.get(location).copied().unwrap_or(true)
    }

    /// Allocates an empty grid with the cave's dimensions.
    pub fn overlay<T: Default + Clone>(&self) -> Grid<T> {
        Grid::new(self.rows(), self.columns())
    }
}

impl TryFrom<CaveRecord> for Cave {
    type Error = CaveError;

    fn try_from(record: CaveRecord) -> Result<Self, Self::Error> {
        Cave::new(record.rows, record.columns, record.rocks)
    }
}

impl From<Cave> for CaveRecord {
    fn from(cave: Cave) -> Self {
        CaveRecord {
            rows: cave.rows(),
            columns: cave.columns(),
            rocks: cave.rocks.cells,
        }
    }
}
