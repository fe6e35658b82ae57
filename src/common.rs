mod cat;
mod group;
mod path;

pub use cat::Cat;
pub use group::{Group, Groups};
pub use path::AgentPath;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cell position on the grid, x growing right and y growing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Coord { x, y }
    }

    /// Shifted copy, or None when the move would leave the first quadrant.
    pub fn shifted(&self, dx: i32, dy: i32) -> Option<Coord> {
        let new_x = self.x as i32 + dx;
        let new_y = self.y as i32 + dy;
        if new_x < 0 || new_y < 0 {
            return None;
        }
        Some(Coord {
            x: new_x as usize,
            y: new_y as usize,
        })
    }
}

/// The four cardinal moves an agent may take in one time step.
pub(crate) const DIRECTIONS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Agent {
    pub id: usize,
    pub coord: Coord,
    pub color: usize,
}

impl Agent {
    pub fn new(id: usize, coord: Coord, color: usize) -> Self {
        Agent { id, coord, color }
    }

    /// A copy of this agent standing on the given cell. Callers check walkability.
    pub fn moved_to(&self, coord: Coord) -> Agent {
        Agent {
            id: self.id,
            coord,
            color: self.color,
        }
    }
}

/// A start or goal cell tagged with a team color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedCell {
    pub x: usize,
    pub y: usize,
    pub color: usize,
}

impl MarkedCell {
    pub fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

/// Shared stop flag for a single solve. Cloned into the watchdog task; the
/// solver checks it once per popped frontier node and unwinds with
/// "no solution" once it trips.
#[derive(Debug, Clone, Default)]
pub struct Deadline(Arc<AtomicBool>);

impl Deadline {
    pub fn new() -> Self {
        Deadline(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_expired(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Final per-agent routes in input order, padded to equal length by repeating
/// each path's last cell.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub paths: Vec<Vec<Coord>>,
}

impl Solution {
    pub fn from_paths(mut agent_paths: Vec<AgentPath>) -> Self {
        agent_paths.sort_by_key(|path| path.agent_id);
        let longest = agent_paths.iter().map(|path| path.len()).max().unwrap_or(0);
        let paths = agent_paths
            .into_iter()
            .map(|path| {
                let mut coords = path.coords().to_vec();
                let last = *coords.last().expect("paths are never empty");
                coords.resize(longest, last);
                coords
            })
            .collect();
        Solution { paths }
    }

    pub fn total_cost(&self) -> usize {
        self.paths
            .iter()
            .map(|coords| {
                let last = *coords.last().expect("paths are never empty");
                let rest = coords.iter().rev().take_while(|c| **c == last).count();
                coords.len() - rest
            })
            .sum()
    }

    pub fn write_json(&self, path: &str) -> anyhow::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &self.paths)?;
        Ok(())
    }
}
