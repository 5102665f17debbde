//! Static collision grid for the arena
//!
//! The grid never changes during a match. Units and bullets query it for
//! terrain collisions; agents get a read-only handle to it for pathfinding.
//! Anything outside the grid counts as solid.

use glam::Vec2;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::battle::constants::DEFAULT_CELL_SIZE;
use crate::core::error::{ArenaError, Result};

/// Integer cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell
    pub fn distance(&self, other: &Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Orthogonal neighbors (N, E, S, W)
    pub fn neighbors(&self) -> [Cell; 4] {
        [
            Cell::new(self.x, self.y - 1),
            Cell::new(self.x + 1, self.y),
            Cell::new(self.x, self.y + 1),
            Cell::new(self.x - 1, self.y),
        ]
    }
}

/// On-disk JSON map document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    /// One string per row; `#` is solid, anything else is free
    pub layout: Vec<String>,
}

fn default_cell_size() -> f32 {
    DEFAULT_CELL_SIZE
}

/// Dense grid of blocked/free cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionGrid {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    blocked: Vec<bool>,
}

impl CollisionGrid {
    /// Create an open grid with no solid cells
    pub fn new(width: u32, height: u32, cell_size: f32) -> Self {
        Self {
            name: String::new(),
            width,
            height,
            cell_size,
            blocked: vec![false; width as usize * height as usize],
        }
    }

    /// Parse a text layout: one line per row, `#` marks a solid cell
    ///
    /// Blank lines are skipped. Rows shorter than the widest row are padded
    /// with free cells.
    pub fn from_text(layout: &str, cell_size: f32) -> Result<Self> {
        let rows: Vec<&str> = layout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        Self::from_rows(&rows, cell_size)
    }

    /// Parse a JSON [`MapDocument`]
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: MapDocument = serde_json::from_str(json)?;
        let rows: Vec<&str> = doc.layout.iter().map(String::as_str).collect();
        let mut grid = Self::from_rows(&rows, doc.cell_size)?;
        grid.name = doc.name;
        Ok(grid)
    }

    /// Load a map file; `.json` files are map documents, anything else is a
    /// text layout with unit-sized cells
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut grid = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents)?,
            _ => Self::from_text(&contents, DEFAULT_CELL_SIZE)?,
        };
        if grid.name.is_empty() {
            grid.name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(grid)
    }

    fn from_rows(rows: &[&str], cell_size: f32) -> Result<Self> {
        if rows.is_empty() {
            return Err(ArenaError::MapError("map layout has no rows".into()));
        }
        if cell_size <= 0.0 || !cell_size.is_finite() {
            return Err(ArenaError::MapError(format!(
                "cell size must be positive, got {}",
                cell_size
            )));
        }

        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0);
        if width == 0 {
            return Err(ArenaError::MapError("map layout has no columns".into()));
        }

        let mut grid = Self::new(width as u32, rows.len() as u32, cell_size);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    grid.set_blocked(Cell::new(x as i32, y as i32), true);
                }
            }
        }
        Ok(grid)
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if self.in_bounds(cell) {
            Some(cell.y as usize * self.width as usize + cell.x as usize)
        } else {
            None
        }
    }

    /// Check if a cell lies within the grid
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width as i32 && cell.y < self.height as i32
    }

    /// Mark a cell solid or free; out-of-bounds cells are ignored
    pub fn set_blocked(&mut self, cell: Cell, blocked: bool) {
        if let Some(idx) = self.index(cell) {
            self.blocked[idx] = blocked;
        }
    }

    /// Is the cell solid? Out-of-bounds cells are always solid.
    pub fn is_blocked(&self, cell: Cell) -> bool {
        self.index(cell).map_or(true, |idx| self.blocked[idx])
    }

    /// Convert world position to cell coordinates
    pub fn world_to_cell(&self, pos: Vec2) -> Cell {
        Cell::new(
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// World position of a cell's center
    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        Vec2::new(
            (cell.x as f32 + 0.5) * self.cell_size,
            (cell.y as f32 + 0.5) * self.cell_size,
        )
    }

    /// Does a world position collide with terrain or lie off the map?
    pub fn is_on_collision(&self, pos: Vec2) -> bool {
        if !pos.is_finite() {
            return true;
        }
        self.is_blocked(self.world_to_cell(pos))
    }

    /// Width of the playable area in world units
    pub fn world_width(&self) -> f32 {
        self.width as f32 * self.cell_size
    }

    /// Height of the playable area in world units
    pub fn world_height(&self) -> f32 {
        self.height as f32 * self.cell_size
    }

    /// All free cells in row-major order
    pub fn free_cells(&self) -> Vec<Cell> {
        (0..self.height as i32)
            .flat_map(|y| (0..self.width as i32).map(move |x| Cell::new(x, y)))
            .filter(|cell| !self.is_blocked(*cell))
            .collect()
    }

    /// Pick `count` spawn cells at random among the free ones
    ///
    /// Cells are distinct while enough free cells exist; after that the
    /// shuffled order repeats. `None` when the grid has no free cell.
    pub fn spawn_cells<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Option<Vec<Cell>> {
        let mut free = self.free_cells();
        if free.is_empty() {
            return None;
        }
        free.shuffle(rng);
        Some(free.iter().cycle().take(count).copied().collect())
    }

    /// Render the grid back to its text layout
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity((self.width as usize + 1) * self.height as usize);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                out.push(if self.is_blocked(Cell::new(x, y)) { '#' } else { '.' });
            }
            out.push('\n');
        }
        out
    }
}
