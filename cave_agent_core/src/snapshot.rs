use serde::{Deserialize, Serialize};

use crate::{
    Direction, Item, Location, Player,
    map::{Cave, Grid, GridError},
};

/// Cost of entering an ordinary cell.
pub const BASE_STEP_COST: usize = 1;
/// Discount applied when the entered cell holds a health item.
pub const HEALTH_DISCOUNT: usize = 1;

/// An item and where it lies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLocation {
    pub entity: Item,
    pub location: Location,
}

/// A player (or dragon) and where it stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLocation {
    pub entity: Player,
    pub location: Location,
}

/// Everything that moves or can be picked up, as of one tick.
///
/// Each snapshot fully replaces the previous one; anything absent is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub items: Vec<ItemLocation>,
    pub players: Vec<PlayerLocation>,
}

impl WorldSnapshot {
    pub fn new(items: Vec<ItemLocation>, players: Vec<PlayerLocation>) -> Self {
        Self { items, players }
    }

    /// Where `player` stands, if present.
    pub fn locate(&self, player: &Player) -> Option<Location> {
        self.players
            .iter()
            .find(|entry| entry.entity == *player)
            .map(|entry| entry.location)
    }

    pub fn gold(&self) -> impl Iterator<Item = Location> + '_ {
        self.items
            .iter()
            .filter(|entry| matches!(entry.entity, Item::Gold { .. }))
            .map(|entry| entry.location)
    }

    pub fn health(&self) -> impl Iterator<Item = Location> + '_ {
        self.items
            .iter()
            .filter(|entry| matches!(entry.entity, Item::Health { .. }))
            .map(|entry| entry.location)
    }
}

/// What is standing or lying on a cell this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub me: bool,
    pub other_player: bool,
    pub dragon: bool,
    pub gold: bool,
    pub health: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("{player:?} is not present in the snapshot")]
    SelfMissing { player: Player },
    #[error(transparent)]
    OutOfBounds(#[from] GridError),
}

/// Read-only view of one tick from the point of view of `me`.
///
/// Cells holding another human player or a dragon are unsafe: the planner
/// never enters them and they count towards being boxed in.
#[derive(Debug)]
pub struct WorldView<'a> {
    pub cave: &'a Cave,
    pub snapshot: &'a WorldSnapshot,
    pub me: &'a Player,
    pub location: Location,
    occupancy: Grid<Occupancy>,
}

impl<'a> WorldView<'a> {
    pub fn new(
        cave: &'a Cave,
        snapshot: &'a WorldSnapshot,
        me: &'a Player,
    ) -> Result<Self, ViewError> {
        let mut occupancy: Grid<Occupancy> = cave.overlay();

        for entry in &snapshot.items {
            let cell = occupancy.get_mut(entry.location)?;
            match entry.entity {
                Item::Gold { .. } => cell.gold = true,
                Item::Health { .. } => cell.health = true,
            }
        }

        for entry in &snapshot.players {
            let cell = occupancy.get_mut(entry.location)?;
            match &entry.entity {
                player if player == me => cell.me = true,
                Player::HumanPlayer { .. } => cell.other_player = true,
                Player::Dragon { .. } => cell.dragon = true,
            }
        }

        let location = snapshot
            .locate(me)
            .ok_or_else(|| ViewError::SelfMissing { player: me.clone() })?;

        Ok(WorldView {
            cave,
            snapshot,
            me,
            location,
            occupancy,
        })
    }

    /// Occupancy of `location`, `None` outside the cave.
    pub fn occupancy(&self, location: Location) -> Option<Occupancy> {
        self.occupancy.get(location).copied()
    }

    pub fn occupancy_grid(&self) -> &Grid<Occupancy> {
        &self.occupancy
    }

    pub fn has_other_player(&self, location: Location) -> bool {
        self.occupancy(location).is_some_and(|cell| cell.other_player)
    }

    /// True for rock, out-of-cave cells, and cells held by another player or a
    /// dragon.
    pub fn is_unsafe(&self, location: Location) -> bool {
        if self.cave.is_rock(location) {
            return true;
        }
        self.occupancy(location)
            .is_none_or(|cell| cell.other_player || cell.dragon)
    }

    /// Incremental cost of stepping onto `location`; never negative.
    pub fn step_cost(&self, location: Location) -> usize {
        let discount = match self.occupancy(location) {
            Some(cell) if cell.health => HEALTH_DISCOUNT,
            _ => 0,
        };
        BASE_STEP_COST.saturating_sub(discount)
    }

    /// Cheapest possible cost of a single step this tick.
    pub fn min_step_cost(&self) -> usize {
        match self.snapshot.health().next() {
            Some(_) => BASE_STEP_COST.saturating_sub(HEALTH_DISCOUNT),
            None => BASE_STEP_COST,
        }
    }

    /// Safe orthogonal neighbours of `location`, in [`Direction::ALL`] order.
    pub fn safe_neighbors(
        &self,
        location: Location,
    ) -> impl Iterator<Item = (Direction, Location)> + '_ {
        Direction::ALL.into_iter().filter_map(move |direction| {
            let next = location.step(direction)?;
            (!self.is_unsafe(next)).then_some((direction, next))
        })
    }

    /// True when none of the four neighbours of our own cell is safe.
    pub fn is_boxed_in(&self) -> bool {
        self.safe_neighbors(self.location).next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Player {
        Player::human("me")
    }

    #[test]
    fn view_marks_occupants_and_locates_self() {
        let cave = Cave::from_fn(3, 3, |_| false);
        let snapshot = WorldSnapshot::new(
            vec![ItemLocation {
                entity: Item::Health { id: 1, value: 5 },
                location: Location::new(0, 1),
            }],
            vec![
                PlayerLocation {
                    entity: me(),
                    location: Location::new(1, 1),
                },
                PlayerLocation {
                    entity: Player::human("rival"),
                    location: Location::new(2, 1),
                },
                PlayerLocation {
                    entity: Player::Dragon { id: 9 },
                    location: Location::new(1, 0),
                },
            ],
        );
        let player = me();
        let view = WorldView::new(&cave, &snapshot, &player).unwrap();

        assert_eq!(view.location, Location::new(1, 1));
        assert!(view.has_other_player(Location::new(2, 1)));
        assert!(view.is_unsafe(Location::new(2, 1)));
        assert!(view.is_unsafe(Location::new(1, 0)));
        assert!(!view.is_unsafe(Location::new(0, 1)));
        assert!(!view.is_unsafe(Location::new(1, 1)));
        assert_eq!(view.step_cost(Location::new(0, 1)), 0);
        assert_eq!(view.step_cost(Location::new(1, 2)), 1);
        assert_eq!(view.min_step_cost(), 0);

        let safe: Vec<_> = view.safe_neighbors(view.location).collect();
        assert_eq!(
            safe,
            vec![
                (Direction::Up, Location::new(0, 1)),
                (Direction::Right, Location::new(1, 2)),
            ]
        );
        assert!(!view.is_boxed_in());
    }

    #[test]
    fn view_requires_self_in_snapshot() {
        let cave = Cave::from_fn(2, 2, |_| false);
        let snapshot = WorldSnapshot::default();
        let player = me();
        assert!(matches!(
            WorldView::new(&cave, &snapshot, &player),
            Err(ViewError::SelfMissing { .. })
        ));
    }

    #[test]
    fn view_rejects_locations_outside_the_cave() {
        let cave = Cave::from_fn(2, 2, |_| false);
        let snapshot = WorldSnapshot::new(
            vec![ItemLocation {
                entity: Item::Gold { id: 1, value: 1 },
                location: Location::new(5, 0),
            }],
            vec![PlayerLocation {
                entity: me(),
                location: Location::new(0, 0),
            }],
        );
        let player = me();
        assert!(matches!(
            WorldView::new(&cave, &snapshot, &player),
            Err(ViewError::OutOfBounds(GridError::OutOfBounds { row: 5, .. }))
        ));
    }
}
