use std::collections::VecDeque;

use crate::common::{Agent, Coord, MarkedCell, DIRECTIONS};
use crate::scenario::Problem;

/// Distance sentinel for cells no goal can reach.
pub const UNREACHABLE: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicMode {
    /// Per-color tables; agents are guided to the nearest goal of their color
    /// and the matching stays implicit.
    Color,
    /// Per-goal tables; the matching layer enumerates explicit assignments.
    Exhaustive,
}

/// The immutable problem board: walls, colored starts and goals, and the BFS
/// distance tables the search layers read. Built once per problem.
#[derive(Debug, Clone)]
pub struct Map {
    pub width: usize,
    pub height: usize,
    walls: Vec<Vec<bool>>,
    pub starts: Vec<MarkedCell>,
    pub goals: Vec<MarkedCell>,
    pub mode: HeuristicMode,
    per_goal: Vec<Vec<Vec<usize>>>,
    per_color: Vec<Vec<Vec<usize>>>,
}

impl Map {
    /// Builds the board and its distance tables. Exhaustive mode computes one
    /// table per goal; color mode computes one multi-source table per color,
    /// plus the per-goal tables when the assignment heuristic needs them.
    pub fn new(problem: &Problem, mode: HeuristicMode, with_goal_tables: bool) -> Self {
        let walls: Vec<Vec<bool>> = problem
            .grid
            .iter()
            .map(|row| row.iter().map(|&cell| cell == 1).collect())
            .collect();
        let mut map = Map {
            width: problem.width,
            height: problem.height,
            walls,
            starts: problem.starts.clone(),
            goals: problem.goals.clone(),
            mode,
            per_goal: Vec::new(),
            per_color: Vec::new(),
        };
        if mode == HeuristicMode::Exhaustive || with_goal_tables {
            let tables: Vec<Vec<Vec<usize>>> = map
                .goals
                .iter()
                .map(|goal| map.bfs_distances(&[goal.coord()]))
                .collect();
            map.per_goal = tables;
        }
        if mode == HeuristicMode::Color {
            let num_colors = map
                .goals
                .iter()
                .map(|goal| goal.color)
                .max()
                .map_or(0, |max| max + 1);
            let tables: Vec<Vec<Vec<usize>>> = (0..num_colors)
                .map(|color| {
                    let sources: Vec<Coord> = map
                        .goals
                        .iter()
                        .filter(|goal| goal.color == color)
                        .map(|goal| goal.coord())
                        .collect();
                    map.bfs_distances(&sources)
                })
                .collect();
            map.per_color = tables;
        }
        map
    }

    /// Unweighted multi-source BFS over walkable cells. The first time a cell
    /// is reached is its true distance.
    fn bfs_distances(&self, sources: &[Coord]) -> Vec<Vec<usize>> {
        let mut distances = vec![vec![UNREACHABLE; self.width]; self.height];
        let mut queue = VecDeque::new();
        for &source in sources {
            if distances[source.y][source.x] == UNREACHABLE {
                distances[source.y][source.x] = 0;
                queue.push_back(source);
            }
        }
        while let Some(coord) = queue.pop_front() {
            let dist = distances[coord.y][coord.x];
            for neighbor in self.neighbors(coord) {
                if distances[neighbor.y][neighbor.x] == UNREACHABLE {
                    distances[neighbor.y][neighbor.x] = dist + 1;
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }

    pub fn neighbors(&self, coord: Coord) -> Vec<Coord> {
        let mut result = Vec::with_capacity(4);
        for &(dx, dy) in &DIRECTIONS {
            if let Some(next) = coord.shifted(dx, dy) {
                if self.is_walkable(next) {
                    result.push(next);
                }
            }
        }
        result
    }

    pub fn is_walkable(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height && !self.walls[coord.y][coord.x]
    }

    /// Shortest distance from the cell to the given goal, ignoring agents.
    pub fn goal_heuristic(&self, coord: Coord, goal_index: usize) -> usize {
        self.per_goal[goal_index][coord.y][coord.x]
    }

    /// Shortest distance from the cell to the nearest goal of the color.
    pub fn color_heuristic(&self, coord: Coord, color: usize) -> usize {
        self.per_color[color][coord.y][coord.x]
    }

    /// Whether the agent stands on any goal of its own color.
    pub fn on_color_goal(&self, agent: &Agent) -> bool {
        self.goals
            .iter()
            .any(|goal| goal.color == agent.color && goal.coord() == agent.coord)
    }
}
