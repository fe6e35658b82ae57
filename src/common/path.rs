use super::Coord;

/// A time-indexed route for one agent, from time 0 to time len-1. Paths are
/// immutable once built; an agent whose path has ended is treated as resting
/// on its final cell forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPath {
    pub agent_id: usize,
    pub color: usize,
    coords: Vec<Coord>,
}

impl AgentPath {
    pub fn new(agent_id: usize, color: usize, coords: Vec<Coord>) -> Self {
        assert!(!coords.is_empty(), "a path holds at least the start cell");
        AgentPath {
            agent_id,
            color,
            coords,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    /// Position at the given time, holding the final cell once the path ends.
    pub fn at(&self, time: usize) -> Coord {
        if time < self.coords.len() {
            self.coords[time]
        } else {
            *self.coords.last().expect("paths are never empty")
        }
    }

    /// Effective cost: the path length minus the trailing rest run on the
    /// final cell. An agent that never leaves its start costs 0.
    pub fn cost(&self) -> usize {
        let last = *self.coords.last().expect("paths are never empty");
        let rest = self.coords.iter().rev().take_while(|c| **c == last).count();
        self.coords.len() - rest
    }

    /// Whether two routes collide: a shared cell at any time step, or a swap
    /// across an edge between consecutive steps. The shorter path's final
    /// cell is held in place for the comparison.
    pub fn conflicts(&self, other: &AgentPath) -> bool {
        let n = self.len();
        let m = other.len();
        let mut i = 1;
        while i < n && i < m {
            if self.coords[i] == other.coords[i] {
                return true;
            }
            if self.coords[i - 1] == other.coords[i] && self.coords[i] == other.coords[i - 1] {
                return true;
            }
            i += 1;
        }
        let self_last = *self.coords.last().expect("paths are never empty");
        let other_last = *other.coords.last().expect("paths are never empty");
        while i < n {
            if self.coords[i] == other_last {
                return true;
            }
            i += 1;
        }
        while i < m {
            if other.coords[i] == self_last {
                return true;
            }
            i += 1;
        }
        false
    }
}
