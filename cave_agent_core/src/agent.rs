use std::{cmp::Ordering, collections::BinaryHeap};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

use crate::{Direction, Location, map::Grid, snapshot::WorldView};

/// Trait defining the behavior of an agent.
/// Agents decide which move to make based on the WorldView of the current tick.
pub trait Agent {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Determines the move the agent wants to make this tick.
    /// `&mut self` allows the agent to draw from its own random source.
    fn decide(&mut self, view: &WorldView) -> Decision;
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// First step of a planned path towards the target.
    Planned,
    /// Boxed in, or the target could not be reached.
    Escape,
    /// Nothing worth collecting and room to move; stay put.
    NoTarget,
    /// Undirected move of a random agent.
    Wander,
}

/// A route found by [`plan_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    /// Unit moves from start to target.
    pub steps: Vec<Direction>,
    /// Cells entered by each step; the last one is the target.
    pub cells: Vec<Location>,
    /// Sum of the incremental step costs.
    pub cost: usize,
}

impl Path {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The outcome of one tick's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub kind: DecisionKind,
    pub target: Option<Location>,
    pub path: Path,
    /// The move to send, if any.
    pub command: Option<Direction>,
}

impl Decision {
    fn stay() -> Self {
        Decision {
            kind: DecisionKind::NoTarget,
            target: None,
            path: Path::default(),
            command: None,
        }
    }
}

/// Picks the closest gold, falling back to the closest health.
///
/// Distances are manhattan; ties go to the location that comes first in
/// row-major order, so the result does not depend on snapshot ordering.
/// Items still listed on our own cell are skipped.
pub fn select_target(view: &WorldView) -> Option<Location> {
    nearest(view.location, view.snapshot.gold())
        .or_else(|| nearest(view.location, view.snapshot.health()))
}

fn nearest(from: Location, candidates: impl Iterator<Item = Location>) -> Option<Location> {
    candidates
        .filter(|location| *location != from)
        .min_by_key(|location| (from.manhattan_distance(location), *location))
}

/// A* search over the 4-connected cave from `start` to `target`.
///
/// Entering a health cell is discounted (see [`WorldView::step_cost`]) so
/// routes through healing tiles are preferred. The estimate is the manhattan
/// distance times [`WorldView::min_step_cost`], which never overestimates
/// and never drops by more than a step costs, so expanding every cell at
/// most once still yields a cheapest path. With health on the map it
/// degrades to uniform-cost search. Returns an empty path when
/// `start == target` or when the target cannot be reached through safe
/// cells.
pub fn plan_path(view: &WorldView, start: Location, target: Location) -> Path {
    // For priority queue
    #[derive(Clone, Copy, Eq, PartialEq)]
    struct Frontier {
        priority: usize,
        cost: usize,
        location: Location,
    }

    impl Ord for Frontier {
        fn cmp(&self, other: &Self) -> Ordering {
            // Reverse ordering for min-heap behavior; row-major on ties
            other
                .priority
                .cmp(&self.priority)
                .then_with(|| other.location.cmp(&self.location))
        }
    }

    impl PartialOrd for Frontier {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    if start == target || !view.cave.contains(start) || !view.cave.contains(target) {
        return Path::default();
    }

    let floor = view.min_step_cost();
    let estimate = |at: Location| at.manhattan_distance(&target) * floor;

    let mut frontier = BinaryHeap::new();
    let mut came_from: Grid<Option<Location>> = view.cave.overlay();
    let mut cost_so_far: Grid<Option<usize>> = view.cave.overlay();
    let mut closed: Grid<bool> = view.cave.overlay();

    frontier.push(Frontier {
        priority: estimate(start),
        cost: 0,
        location: start,
    });
    cost_so_far[start] = Some(0);

    while let Some(Frontier {
        location: current,
        cost,
        ..
    }) = frontier.pop()
    {
        if closed[current] {
            continue;
        }
        closed[current] = true;

        if current == target {
            return reconstruct(&came_from, start, target, cost).unwrap_or_default();
        }

        for (_, neighbor) in view.safe_neighbors(current) {
            if closed[neighbor] {
                continue;
            }
            let new_cost = cost + view.step_cost(neighbor);
            if cost_so_far[neighbor].is_none_or(|known| new_cost < known) {
                cost_so_far[neighbor] = Some(new_cost);
                came_from[neighbor] = Some(current);
                frontier.push(Frontier {
                    priority: new_cost + estimate(neighbor),
                    cost: new_cost,
                    location: neighbor,
                });
            }
        }
    }

    Path::default()
}

/// Walks the predecessor map back from `target` and turns it into moves.
fn reconstruct(
    came_from: &Grid<Option<Location>>,
    start: Location,
    target: Location,
    cost: usize,
) -> Option<Path> {
    let mut cells = vec![target];
    let mut current = target;
    while current != start {
        current = came_from[current]?;
        cells.push(current);
    }
    cells.reverse();

    let steps = cells
        .windows(2)
        .map(|pair| pair[0].direction_to(pair[1]))
        .collect::<Option<Vec<_>>>()?;
    cells.remove(0);

    Some(Path { steps, cells, cost })
}

/// Single-step fallback used when boxed in or when no path exists.
///
/// Prefers the neighbouring cell held by another human player that lies
/// closest to `target`; otherwise any of the four directions at random.
pub fn escape<R: Rng>(view: &WorldView, target: Option<Location>, rng: &mut R) -> Direction {
    if let Some(target) = target {
        let towards_player = Direction::ALL
            .into_iter()
            .filter_map(|direction| Some((direction, view.location.step(direction)?)))
            .filter(|(_, cell)| !view.cave.is_rock(*cell) && view.has_other_player(*cell))
            .min_by_key(|(_, cell)| cell.manhattan_distance(&target));
        if let Some((direction, _)) = towards_player {
            return direction;
        }
    }
    Direction::ALL[rng.random_range(0..Direction::ALL.len())]
}

/// An agent that wanders in a random safe direction every tick.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl Agent for RandomWalker {
    fn name(&self) -> &'static str {
        "random"
    }

    fn decide(&mut self, view: &WorldView) -> Decision {
        let safe: Vec<Direction> = view
            .safe_neighbors(view.location)
            .map(|(direction, _)| direction)
            .collect();
        let choices: &[Direction] = if safe.is_empty() {
            &Direction::ALL
        } else {
            &safe
        };
        let direction = choices[self.rng.random_range(0..choices.len())];

        Decision {
            kind: DecisionKind::Wander,
            target: None,
            path: Path::default(),
            command: Some(direction),
        }
    }
}

/// A planning agent that heads for the nearest gold (or health) along the
/// cheapest safe path, replanning from scratch every tick.
#[derive(Debug)]
pub struct PlanningAgent {
    rng: StdRng,
}

impl PlanningAgent {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    fn escape(&mut self, view: &WorldView, target: Option<Location>, path: Path) -> Decision {
        let direction = escape(view, target, &mut self.rng);
        warn!(
            location = ?view.location,
            ?target,
            ?direction,
            "no safe route, escaping"
        );
        Decision {
            kind: DecisionKind::Escape,
            target,
            path,
            command: Some(direction),
        }
    }
}

impl Agent for PlanningAgent {
    fn name(&self) -> &'static str {
        "planning"
    }

    fn decide(&mut self, view: &WorldView) -> Decision {
        let target = select_target(view);

        // 1. Surrounded: nothing to plan
        if view.is_boxed_in() {
            return self.escape(view, target, Path::default());
        }

        // 2. Nothing to collect
        let Some(goal) = target else {
            debug!(location = ?view.location, "no target this tick");
            return Decision::stay();
        };

        // 3. Plan and take the first step
        let path = plan_path(view, view.location, goal);
        match path.steps.first().copied() {
            Some(step) => {
                debug!(
                    location = ?view.location,
                    target = ?goal,
                    steps = path.steps.len(),
                    cost = path.cost,
                    ?step,
                    "planned"
                );
                Decision {
                    kind: DecisionKind::Planned,
                    target,
                    path,
                    command: Some(step),
                }
            }
            None => self.escape(view, target, path),
        }
    }
}
