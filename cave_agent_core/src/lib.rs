use serde::{Deserialize, Serialize};

pub mod agent;
pub mod map;
pub mod protocol;
pub mod scenario;
pub mod session;
pub mod snapshot;

/// A cell of the cave, addressed by row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub row: usize,
    pub column: usize,
}

impl Location {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Returns the manhattan distance between two locations.
    pub fn manhattan_distance(&self, other: &Location) -> usize {
        self.row.abs_diff(other.row) + self.column.abs_diff(other.column)
    }

    /// The neighbouring location one step in `direction`, or `None` when the
    /// step would leave the non-negative quadrant.
    pub fn step(self, direction: Direction) -> Option<Location> {
        let (dr, dc) = direction.offset();
        Some(Location {
            row: self.row.checked_add_signed(dr)?,
            column: self.column.checked_add_signed(dc)?,
        })
    }

    /// The direction leading from `self` to an orthogonally adjacent `other`.
    pub fn direction_to(self, other: Location) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| self.step(*direction) == Some(other))
    }
}

/// A unit move on the 4-connected grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Fixed enumeration order; also the tie-break order wherever
    /// directions compete.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// `(row, column)` delta of this move.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

/// Collectable entities lying in the cave.
///
/// Two items of the same kind are still distinct entities; `id` carries the
/// server-side identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    Gold {
        id: u64,
        #[serde(default)]
        value: u32,
    },
    Health {
        id: u64,
        #[serde(default)]
        value: u32,
    },
}

/// Anything that occupies a cell and moves: human players (ourselves
/// included) and dragons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Player {
    HumanPlayer { name: String },
    Dragon {
        #[serde(default)]
        id: u64,
    },
}

impl Player {
    pub fn human(name: impl Into<String>) -> Self {
        Player::HumanPlayer { name: name.into() }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Player::HumanPlayer { .. })
    }
}
