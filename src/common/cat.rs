use super::{AgentPath, Coord};

/// Collision avoidance table: for every cell, the (agent, time) visits of all
/// currently committed paths. Queried by the OD expansion to count how many
/// committed paths a candidate move would collide with; the count is used as
/// a tie-breaker only and never affects optimality.
#[derive(Debug, Clone)]
pub struct Cat {
    active: bool,
    table: Vec<Vec<Vec<(usize, usize)>>>,
    lengths: Vec<usize>,
    final_cells: Vec<Option<Coord>>,
}

impl Cat {
    pub fn new(num_agents: usize, width: usize, height: usize) -> Self {
        Cat {
            active: true,
            table: vec![vec![Vec::new(); width]; height],
            lengths: vec![0; num_agents],
            final_cells: vec![None; num_agents],
        }
    }

    /// An inert table for runs with the CAT tie-breaker disabled.
    pub fn empty() -> Self {
        Cat {
            active: false,
            table: Vec::new(),
            lengths: Vec::new(),
            final_cells: Vec::new(),
        }
    }

    pub fn add_path(&mut self, path: &AgentPath) {
        if !self.active {
            return;
        }
        for (time, coord) in path.coords().iter().enumerate() {
            self.table[coord.y][coord.x].push((path.agent_id, time));
        }
        self.lengths[path.agent_id] = path.len();
        self.final_cells[path.agent_id] = Some(*path.coords().last().expect("paths are never empty"));
    }

    pub fn remove_path(&mut self, path: &AgentPath) {
        if !self.active {
            return;
        }
        for (time, coord) in path.coords().iter().enumerate() {
            let entries = &mut self.table[coord.y][coord.x];
            if let Some(pos) = entries
                .iter()
                .position(|&(id, t)| id == path.agent_id && t == time)
            {
                entries.swap_remove(pos);
            }
        }
        self.lengths[path.agent_id] = 0;
        self.final_cells[path.agent_id] = None;
    }

    /// Number of committed paths occupying the cell at the given time,
    /// ignoring the listed agents. An agent whose path has already ended
    /// keeps occupying its final cell.
    pub fn count(&self, ignored_ids: &[usize], coord: Coord, time: usize) -> usize {
        if !self.active {
            return 0;
        }
        let mut hits = self.table[coord.y][coord.x]
            .iter()
            .filter(|&&(id, t)| t == time && !ignored_ids.contains(&id))
            .count();
        for (id, &length) in self.lengths.iter().enumerate() {
            if length != 0 && length <= time && !ignored_ids.contains(&id) {
                if self.final_cells[id] == Some(coord) {
                    hits += 1;
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(id: usize, cells: &[(usize, usize)]) -> AgentPath {
        AgentPath::new(
            id,
            0,
            cells.iter().map(|&(x, y)| Coord::new(x, y)).collect(),
        )
    }

    #[test]
    fn test_count_at_time() {
        let mut cat = Cat::new(2, 4, 4);
        cat.add_path(&path(0, &[(0, 0), (1, 0), (2, 0)]));
        assert_eq!(cat.count(&[], Coord::new(1, 0), 1), 1);
        assert_eq!(cat.count(&[], Coord::new(1, 0), 2), 0);
        assert_eq!(cat.count(&[0], Coord::new(1, 0), 1), 0);
    }

    #[test]
    fn test_finished_path_occupies_final_cell() {
        let mut cat = Cat::new(2, 4, 4);
        cat.add_path(&path(0, &[(0, 0), (1, 0)]));
        assert_eq!(cat.count(&[], Coord::new(1, 0), 1), 1);
        assert_eq!(cat.count(&[], Coord::new(1, 0), 5), 1);
        assert_eq!(cat.count(&[], Coord::new(0, 0), 5), 0);
    }

    #[test]
    fn test_remove_restores_counts() {
        let mut cat = Cat::new(2, 4, 4);
        let p = path(1, &[(2, 2), (2, 3)]);
        cat.add_path(&p);
        cat.remove_path(&p);
        assert_eq!(cat.count(&[], Coord::new(2, 2), 0), 0);
        assert_eq!(cat.count(&[], Coord::new(2, 3), 9), 0);
    }

    #[test]
    fn test_inactive_table_counts_nothing() {
        let mut cat = Cat::empty();
        cat.add_path(&path(0, &[(0, 0)]));
        assert_eq!(cat.count(&[], Coord::new(0, 0), 0), 0);
    }
}
