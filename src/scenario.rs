use anyhow::{anyhow, bail, Context, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use tracing::info;

use crate::common::{Coord, MarkedCell, DIRECTIONS};

/// A full solver input: the board plus colored starts and goals. Agent id is
/// the index into `starts`; goal id is the index into `goals`.
#[derive(Debug, Clone)]
pub struct Problem {
    pub width: usize,
    pub height: usize,
    pub grid: Vec<Vec<u8>>,
    pub starts: Vec<MarkedCell>,
    pub goals: Vec<MarkedCell>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScenarioFile {
    starts: Vec<MarkedCell>,
    goals: Vec<MarkedCell>,
}

impl Problem {
    /// Loads a Moving AI format map plus a YAML scenario with colored starts
    /// and goals, and validates the combination.
    pub fn from_files(map_path: &str, scen_path: &str) -> Result<Self> {
        let (width, height, grid) = load_map(map_path)
            .with_context(|| format!("failed to load map '{map_path}'"))?;
        let file = File::open(scen_path)
            .with_context(|| format!("failed to open scenario '{scen_path}'"))?;
        let scenario: ScenarioFile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse scenario '{scen_path}'"))?;
        let problem = Problem {
            width,
            height,
            grid,
            starts: scenario.starts,
            goals: scenario.goals,
        };
        problem.validate()?;
        Ok(problem)
    }

    /// Places starts and goals uniformly on distinct free cells of a loaded
    /// map, cycling colors over `num_teams`.
    pub fn generate_random<R: Rng + ?Sized>(
        map_path: &str,
        num_agents: usize,
        num_teams: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let (width, height, grid) = load_map(map_path)
            .with_context(|| format!("failed to load map '{map_path}'"))?;
        let mut free_cells: Vec<Coord> = (0..height)
            .flat_map(|y| (0..width).map(move |x| Coord::new(x, y)))
            .filter(|coord| grid[coord.y][coord.x] == 0)
            .collect();
        if free_cells.len() < num_agents * 2 {
            bail!(
                "map has {} free cells, need {} for starts and goals",
                free_cells.len(),
                num_agents * 2
            );
        }
        free_cells.shuffle(rng);

        let mut starts = Vec::with_capacity(num_agents);
        let mut goals = Vec::with_capacity(num_agents);
        for i in 0..num_agents {
            let color = i % num_teams.max(1);
            let start = free_cells.pop().expect("checked above");
            let goal = free_cells.pop().expect("checked above");
            starts.push(MarkedCell {
                x: start.x,
                y: start.y,
                color,
            });
            goals.push(MarkedCell {
                x: goal.x,
                y: goal.y,
                color,
            });
        }

        let problem = Problem {
            width,
            height,
            grid,
            starts,
            goals,
        };
        problem.validate()?;
        info!("generated scenario: {:?} -> {:?}", problem.starts, problem.goals);
        Ok(problem)
    }

    pub fn write_scenario_yaml(&self, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        let scenario = ScenarioFile {
            starts: self.starts.clone(),
            goals: self.goals.clone(),
        };
        let yaml_data = serde_yaml::to_string(&scenario)?;
        writer.write_all(yaml_data.as_bytes())?;
        Ok(())
    }

    /// Rejects malformed inputs before any solver state is built: count and
    /// color mismatches, occupied or out-of-bounds cells, duplicate cells,
    /// and agents with no reachable goal of their color.
    pub fn validate(&self) -> Result<()> {
        if self.grid.len() != self.height || self.grid.iter().any(|row| row.len() != self.width) {
            bail!("grid does not match the declared {}x{} size", self.width, self.height);
        }
        if self.starts.len() != self.goals.len() {
            bail!(
                "{} starts but {} goals",
                self.starts.len(),
                self.goals.len()
            );
        }
        if self.starts.is_empty() {
            bail!("no agents");
        }

        let mut start_colors: Vec<usize> = self.starts.iter().map(|cell| cell.color).collect();
        let mut goal_colors: Vec<usize> = self.goals.iter().map(|cell| cell.color).collect();
        start_colors.sort_unstable();
        goal_colors.sort_unstable();
        if start_colors != goal_colors {
            bail!("start and goal colors are not multiset-equal");
        }

        for (kind, cells) in [("start", &self.starts), ("goal", &self.goals)] {
            for cell in cells.iter() {
                if cell.x >= self.width || cell.y >= self.height {
                    bail!("{kind} ({}, {}) is out of bounds", cell.x, cell.y);
                }
                if self.grid[cell.y][cell.x] == 1 {
                    bail!("{kind} ({}, {}) is on a wall", cell.x, cell.y);
                }
            }
            let mut seen: Vec<Coord> = cells.iter().map(|cell| cell.coord()).collect();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != cells.len() {
                bail!("duplicate {kind} cells");
            }
        }

        // Every agent must reach at least one goal of its color.
        for (id, start) in self.starts.iter().enumerate() {
            let reachable = self.reachable_from(start.coord());
            let ok = self
                .goals
                .iter()
                .any(|goal| goal.color == start.color && reachable[goal.y][goal.x]);
            if !ok {
                return Err(anyhow!(
                    "agent {id} at ({}, {}) cannot reach any goal of color {}",
                    start.x,
                    start.y,
                    start.color
                ));
            }
        }
        Ok(())
    }

    fn reachable_from(&self, source: Coord) -> Vec<Vec<bool>> {
        let mut reachable = vec![vec![false; self.width]; self.height];
        let mut queue = VecDeque::new();
        reachable[source.y][source.x] = true;
        queue.push_back(source);
        while let Some(coord) = queue.pop_front() {
            for &(dx, dy) in &DIRECTIONS {
                if let Some(next) = coord.shifted(dx, dy) {
                    if next.x < self.width
                        && next.y < self.height
                        && self.grid[next.y][next.x] == 0
                        && !reachable[next.y][next.x]
                    {
                        reachable[next.y][next.x] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        reachable
    }
}

/// Moving AI map format: a four-line header followed by `height` rows where
/// '.' is free and anything else is a wall.
fn load_map(path: &str) -> Result<(usize, usize, Vec<Vec<u8>>)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut header_field = |name: &str| -> Result<String> {
        lines
            .next()
            .ok_or_else(|| anyhow!("missing {name} line"))?
            .map_err(Into::into)
    };
    let _type = header_field("type")?;
    let height: usize = header_field("height")?
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("malformed height line"))?
        .parse()?;
    let width: usize = header_field("width")?
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("malformed width line"))?
        .parse()?;
    let _map = header_field("map")?;

    let mut grid = Vec::with_capacity(height);
    for line in lines.take(height) {
        let row: Vec<u8> = line?
            .chars()
            .map(|ch| if ch == '.' { 0 } else { 1 })
            .collect();
        if row.len() != width {
            bail!("map row has {} cells, expected {width}", row.len());
        }
        grid.push(row);
    }
    if grid.len() != height {
        bail!("map has {} rows, expected {height}", grid.len());
    }
    Ok((width, height, grid))
}
