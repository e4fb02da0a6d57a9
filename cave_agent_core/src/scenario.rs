use crate::{
    Item, Location, Player,
    map::Cave,
    snapshot::{ItemLocation, PlayerLocation, ViewError, WorldSnapshot, WorldView},
};

/// Name given to the `@` player of a scenario map.
pub const SELF_NAME: &str = "me";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error("map is empty")]
    Empty,
    #[error("inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown map glyph '{glyph}' at ({row}, {column})")]
    UnknownGlyph {
        glyph: char,
        row: usize,
        column: usize,
    },
    #[error("map has no '@' cell")]
    MissingSelf,
    #[error("map has more than one '@' cell")]
    DuplicateSelf,
}

/// A cave together with one snapshot, as loaded from a text map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub cave: Cave,
    pub snapshot: WorldSnapshot,
    pub me: Player,
}

impl Scenario {
    pub fn view(&self) -> Result<WorldView<'_>, ViewError> {
        WorldView::new(&self.cave, &self.snapshot, &self.me)
    }
}

/// Loads a scenario from a text map, one character per cell:
///
/// | glyph | meaning |
/// |-------|---------|
/// | `#`   | rock |
/// | `.`   | open floor |
/// | `G`   | gold |
/// | `H`   | health |
/// | `@`   | ourselves |
/// | `P`   | another human player |
/// | `D`   | dragon |
///
/// Blank lines and surrounding whitespace are ignored.
pub fn parse_scenario(map: &str) -> Result<Scenario, ScenarioError> {
    let lines: Vec<&str> = map
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let Some(first) = lines.first() else {
        return Err(ScenarioError::Empty);
    };
    let columns = first.chars().count();

    let mut rocks = Vec::with_capacity(lines.len() * columns);
    let mut items = Vec::new();
    let mut players = Vec::new();
    let mut me_at = None;
    let mut next_id = 0u64;

    for (row, line) in lines.iter().enumerate() {
        let found = line.chars().count();
        if found != columns {
            return Err(ScenarioError::RaggedRow {
                row,
                expected: columns,
                found,
            });
        }

        for (column, glyph) in line.chars().enumerate() {
            let location = Location { row, column };
            next_id += 1;
            rocks.push(glyph == '#');
            match glyph {
                '#' | '.' => {}
                'G' => items.push(ItemLocation {
                    entity: Item::Gold {
                        id: next_id,
                        value: 1,
                    },
                    location,
                }),
                'H' => items.push(ItemLocation {
                    entity: Item::Health {
                        id: next_id,
                        value: 1,
                    },
                    location,
                }),
                'P' => players.push(PlayerLocation {
                    entity: Player::human(format!("player-{next_id}")),
                    location,
                }),
                'D' => players.push(PlayerLocation {
                    entity: Player::Dragon { id: next_id },
                    location,
                }),
                '@' => {
                    if me_at.replace(location).is_some() {
                        return Err(ScenarioError::DuplicateSelf);
                    }
                    players.push(PlayerLocation {
                        entity: Player::human(SELF_NAME),
                        location,
                    });
                }
                glyph => {
                    return Err(ScenarioError::UnknownGlyph { glyph, row, column });
                }
            }
        }
    }

    if me_at.is_none() {
        return Err(ScenarioError::MissingSelf);
    }

    let cave = Cave::new(lines.len(), columns, rocks).map_err(|_| ScenarioError::Empty)?;
    Ok(Scenario {
        cave,
        snapshot: WorldSnapshot::new(items, players),
        me: Player::human(SELF_NAME),
    })
}
