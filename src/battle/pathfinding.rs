//! A* pathfinding over the collision grid
//!
//! Uniform step cost, orthogonal moves only. Exposed read-only to agents
//! through `game.map`; the tick loop never calls it.

use ahash::AHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::battle::grid::{Cell, CollisionGrid};

/// Node in the A* open set
#[derive(Debug, Clone)]
struct PathNode {
    cell: Cell,
    f_cost: u32, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; ties broken on cell for determinism
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Expansions between two wall-clock checks
const DEADLINE_CHECK_EXPANSIONS: u32 = 256;

/// Outcome of a bounded search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSearch {
    Found(Vec<Cell>),
    Unreachable,
    /// The deadline passed before the search finished
    Expired,
}

/// Find path using A* algorithm
///
/// Returns the ordered cells from `start` to `goal` inclusive, or `None`
/// if either endpoint is solid or no path exists.
pub fn find_path(grid: &CollisionGrid, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
    match search_path(grid, start, goal, None) {
        PathSearch::Found(path) => Some(path),
        PathSearch::Unreachable | PathSearch::Expired => None,
    }
}

/// A* that gives up once `deadline` has passed
pub fn search_path(
    grid: &CollisionGrid,
    start: Cell,
    goal: Cell,
    deadline: Option<Instant>,
) -> PathSearch {
    if grid.is_blocked(start) || grid.is_blocked(goal) {
        return PathSearch::Unreachable;
    }
    if start == goal {
        return PathSearch::Found(vec![start]);
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<Cell, Cell> = AHashMap::new();
    let mut g_scores: AHashMap<Cell, u32> = AHashMap::new();
    let mut expansions: u32 = 0;

    g_scores.insert(start, 0);
    open_set.push(PathNode {
        cell: start,
        f_cost: start.distance(&goal),
    });

    while let Some(current) = open_set.pop() {
        if let Some(deadline) = deadline {
            if expansions % DEADLINE_CHECK_EXPANSIONS == 0 && Instant::now() >= deadline {
                return PathSearch::Expired;
            }
        }
        expansions = expansions.wrapping_add(1);

        if current.cell == goal {
            return PathSearch::Found(reconstruct_path(&came_from, current.cell));
        }

        let current_g = *g_scores.get(&current.cell).unwrap_or(&u32::MAX);

        for neighbor in current.cell.neighbors() {
            if grid.is_blocked(neighbor) {
                continue;
            }

            let tentative_g = current_g.saturating_add(1);
            let neighbor_g = *g_scores.get(&neighbor).unwrap_or(&u32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.cell);
                g_scores.insert(neighbor, tentative_g);
                open_set.push(PathNode {
                    cell: neighbor,
                    f_cost: tentative_g + neighbor.distance(&goal),
                });
            }
        }
    }

    PathSearch::Unreachable
}

/// Reconstruct path from came_from map
fn reconstruct_path(came_from: &AHashMap<Cell, Cell>, mut current: Cell) -> Vec<Cell> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
