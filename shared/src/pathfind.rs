//! Grid A* over the heightfield, producing ground-level waypoints for the autopilot.
//!
//! Cells whose center lies inside an obstacle footprint are closed, a step between two cells
//! may not pass through an obstacle, and diagonal moves may not cut a blocked corner. Height
//! steps up to `GRID_MAX_STEP` are allowed since the walk gait can jump onto ledges.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use bevy::prelude::*;

use crate::world::CollisionWorld;

const GRID_CELL_SIZE: f32 = 1.0; // meters
const GRID_MAX_STEP: f32 = 1.5; // max height delta between neighbor cells
const GRID_MAX_NODES: usize = 4000; // hard cap per search
const STEP_PROBE_HEIGHT: f32 = 0.25; // obstacle probe height above the ground between cells

const NEIGHBORS: [IVec2; 8] = [
    IVec2::new(1, 0),
    IVec2::new(-1, 0),
    IVec2::new(0, 1),
    IVec2::new(0, -1),
    IVec2::new(1, 1),
    IVec2::new(1, -1),
    IVec2::new(-1, 1),
    IVec2::new(-1, -1),
];

/// Open-set entry ordered by estimated total cost.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    f: f32,
    cell: IVec2,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .total_cmp(&other.f)
            .then_with(|| self.cell.x.cmp(&other.cell.x))
            .then_with(|| self.cell.y.cmp(&other.cell.y))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Grid<'a> {
    world: &'a CollisionWorld,
    heights: HashMap<IVec2, f32>,
}

impl Grid<'_> {
    fn cell_of(p: Vec3) -> IVec2 {
        IVec2::new(
            (p.x / GRID_CELL_SIZE).round() as i32,
            (p.z / GRID_CELL_SIZE).round() as i32,
        )
    }

    fn center(cell: IVec2) -> Vec2 {
        cell.as_vec2() * GRID_CELL_SIZE
    }

    fn height(&mut self, cell: IVec2) -> f32 {
        let world = self.world;
        *self.heights.entry(cell).or_insert_with(|| {
            let c = Self::center(cell);
            world.terrain.get_height(c.x, c.y)
        })
    }

    fn ground_point(&mut self, cell: IVec2) -> Vec3 {
        let c = Self::center(cell);
        Vec3::new(c.x, self.height(cell), c.y)
    }

    fn blocked(&self, cell: IVec2) -> bool {
        self.world.obstacles.point_blocked(Self::center(cell))
    }

    /// Whether the straight segment between two cells clears every obstacle.
    fn segment_clear(&mut self, from: IVec2, to: IVec2) -> bool {
        let a = self.ground_point(from) + Vec3::Y * STEP_PROBE_HEIGHT;
        let b = self.ground_point(to) + Vec3::Y * STEP_PROBE_HEIGHT;
        let span = b - a;
        self.world
            .obstacles
            .raycast(a, span.normalize_or_zero(), span.length(), 0.0)
            .is_none()
    }

    fn step_allowed(&mut self, from: IVec2, to: IVec2) -> bool {
        if self.blocked(to) || (self.height(to) - self.height(from)).abs() > GRID_MAX_STEP {
            return false;
        }
        let d = to - from;
        // No squeezing diagonally between two blocked cells' corners
        if d.x != 0 && d.y != 0 && (self.blocked(from + IVec2::new(d.x, 0)) || self.blocked(from + IVec2::new(0, d.y))) {
            return false;
        }
        self.segment_clear(from, to)
    }
}

fn heuristic(a: IVec2, b: IVec2) -> f32 {
    (a - b).as_vec2().length()
}

/// Outcome of one A* search over cells.
struct Search {
    /// Cells from the start's successor up to and including the goal cell.
    cells: Option<Vec<IVec2>>,
    expanded: usize,
    closed: HashSet<IVec2>,
}

fn search(grid: &mut Grid, start: IVec2, goal: IVec2) -> Search {
    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<IVec2, IVec2> = HashMap::new();
    let mut cost: HashMap<IVec2, f32> = HashMap::from([(start, 0.0)]);
    open.push(Reverse(Candidate {
        f: heuristic(start, goal),
        cell: start,
    }));

    let mut closed = HashSet::new();
    let mut expanded = 0_usize;
    while let Some(Reverse(Candidate { cell: current, .. })) = open.pop() {
        // Stale entry for a cell that was already expanded
        if !closed.insert(current) {
            continue;
        }
        expanded += 1;
        if expanded > GRID_MAX_NODES {
            return Search {
                cells: None,
                expanded,
                closed,
            };
        }

        if current == goal {
            let mut cells = vec![current];
            let mut cur = current;
            while let Some(&prev) = came_from.get(&cur) {
                cells.push(prev);
                cur = prev;
            }
            // Drop the start cell
            cells.pop();
            cells.reverse();
            return Search {
                cells: Some(cells),
                expanded,
                closed,
            };
        }

        let current_cost = cost.get(&current).copied().unwrap_or(f32::INFINITY);
        for offset in NEIGHBORS {
            let next = current + offset;
            if closed.contains(&next) || !grid.step_allowed(current, next) {
                continue;
            }
            let tentative = current_cost + offset.as_vec2().length();
            if tentative < cost.get(&next).copied().unwrap_or(f32::INFINITY) {
                came_from.insert(next, current);
                cost.insert(next, tentative);
                open.push(Reverse(Candidate {
                    f: tentative + heuristic(next, goal),
                    cell: next,
                }));
            }
        }
    }

    Search {
        cells: None,
        expanded,
        closed,
    }
}

/// Plan ground-level waypoints from `start` to `goal`.
///
/// The start cell is omitted and the last waypoint is `goal` itself projected onto the
/// ground. Returns an empty path when the goal is unreachable or the search exceeds its
/// node budget.
pub fn find_path(world: &CollisionWorld, start: Vec3, goal: Vec3) -> Vec<Vec3> {
    let start_cell = Grid::cell_of(start);
    let goal_cell = Grid::cell_of(goal);
    let goal_ground = Vec3::new(goal.x, world.terrain.get_height(goal.x, goal.z), goal.z);
    if start_cell == goal_cell {
        return vec![goal_ground];
    }

    let mut grid = Grid {
        world,
        heights: HashMap::new(),
    };
    let Search { cells, expanded, .. } = search(&mut grid, start_cell, goal_cell);
    let Some(mut cells) = cells else {
        if expanded > GRID_MAX_NODES {
            warn!("Path search from {:?} to {:?} exceeded {} nodes", start, goal, GRID_MAX_NODES);
        } else {
            warn!("No path from {:?} to {:?}", start, goal);
        }
        return Vec::new();
    };

    // The goal cell's center is replaced by the exact goal
    cells.pop();
    let mut path: Vec<Vec3> = cells.into_iter().map(|c| grid.ground_point(c)).collect();
    path.push(goal_ground);
    debug!("Planned {} waypoints from {:?} to {:?} ({} nodes)", path.len(), start, goal, expanded);
    path
}
