use tracing::info;

use crate::common::{AgentPath, Cat, Deadline, Group, Groups, Solution};
use crate::map::{HeuristicMode, Map};
use crate::scenario::Problem;
use crate::solver::{IdProblem, UNBOUNDED};
use crate::stat::Stats;

/// Top-level driver: builds the map, optionally seeds outer groups from the
/// color classes ("matching ID"), and runs the ID layer. Without matching ID
/// a single ID problem over all agents produces the answer directly.
pub struct MatchingSolver {
    map: Map,
    enable_sorting: bool,
    enable_matching_id: bool,
    use_assignment: bool,
    teams: Vec<Group>,
}

impl MatchingSolver {
    pub fn new(
        problem: &Problem,
        mode: HeuristicMode,
        enable_sorting: bool,
        enable_matching_id: bool,
        use_assignment: bool,
    ) -> Self {
        // The assignment heuristic reads per-goal distances even in color mode.
        let with_goal_tables = use_assignment && mode == HeuristicMode::Color;
        let map = Map::new(problem, mode, with_goal_tables);

        let teams = if enable_matching_id {
            let num_colors = map
                .starts
                .iter()
                .map(|start| start.color)
                .max()
                .map_or(0, |max| max + 1);
            let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); num_colors];
            for (id, start) in map.starts.iter().enumerate() {
                buckets[start.color].push(id);
            }
            buckets
                .into_iter()
                .filter(|bucket| !bucket.is_empty())
                .map(Group::new)
                .collect()
        } else {
            Vec::new()
        };

        MatchingSolver {
            map,
            enable_sorting,
            enable_matching_id,
            use_assignment,
            teams,
        }
    }

    /// Solves the whole problem, or returns None when no solution exists
    /// within the bound or the deadline trips.
    pub fn solve(
        &self,
        enable_cat: bool,
        upper_bound: usize,
        deadline: &Deadline,
        stats: &mut Stats,
    ) -> Option<Solution> {
        if !self.enable_matching_id {
            let group = Group::new((0..self.map.starts.len()).collect());
            let mut id_problem =
                IdProblem::new(&self.map, &group, self.enable_sorting, self.use_assignment);
            let paths =
                id_problem.solve(None, upper_bound, enable_cat, deadline, stats)?;
            return Some(Solution::from_paths(paths));
        }

        let mut path_set = GroupPathSet::new(
            self.map.starts.len(),
            self.map.width,
            self.map.height,
            self.teams.clone(),
            enable_cat,
        );

        let initial_groups: Vec<Group> = path_set.groups.iter().cloned().collect();
        for group in initial_groups {
            info!("solving agents: {:?}", group.agent_ids());
            let paths = {
                let mut id_problem =
                    IdProblem::new(&self.map, &group, self.enable_sorting, self.use_assignment);
                id_problem.solve(Some(&path_set.cat), UNBOUNDED, enable_cat, deadline, stats)?
            };
            path_set.update(paths);
        }

        while let Some((a, b)) = path_set.find_conflict() {
            if deadline.is_expired() {
                return None;
            }
            let new_group = path_set.groups.combine_agents(a, b);
            info!("solving agents: {:?}", new_group.agent_ids());
            let paths = {
                let mut id_problem = IdProblem::new(
                    &self.map,
                    &new_group,
                    self.enable_sorting,
                    self.use_assignment,
                );
                id_problem.solve(Some(&path_set.cat), UNBOUNDED, enable_cat, deadline, stats)?
            };
            path_set.update(paths);
        }

        Some(Solution::from_paths(path_set.into_paths()))
    }
}

/// Stored paths at the matching-ID granularity: one slot per agent, the color
/// teams as outer groups, and the outer CAT the inner solves tie-break on.
struct GroupPathSet {
    groups: Groups,
    paths: Vec<Option<AgentPath>>,
    cat: Cat,
}

impl GroupPathSet {
    fn new(
        num_agents: usize,
        width: usize,
        height: usize,
        teams: Vec<Group>,
        enable_cat: bool,
    ) -> Self {
        let mut set = GroupPathSet {
            groups: Groups::new(teams),
            paths: vec![None; num_agents],
            cat: if enable_cat {
                Cat::new(num_agents, width, height)
            } else {
                Cat::empty()
            },
        };
        set.merge_singleton_teams();
        set
    }

    /// Solving a one-agent team in isolation never pays off; fold all
    /// singleton teams into one group up front.
    fn merge_singleton_teams(&mut self) {
        let singles: Vec<usize> = self
            .groups
            .iter()
            .filter(|group| group.len() == 1)
            .map(|group| group.agent_ids()[0])
            .collect();
        if singles.len() > 1 {
            for &other in &singles[1..] {
                self.groups.combine_agents(singles[0], other);
            }
        }
    }

    fn update(&mut self, new_paths: Vec<AgentPath>) {
        for path in new_paths {
            let id = path.agent_id;
            if let Some(old) = &self.paths[id] {
                self.cat.remove_path(old);
            }
            self.cat.add_path(&path);
            self.paths[id] = Some(path);
        }
    }

    fn find_conflict(&self) -> Option<(usize, usize)> {
        for i in 0..self.paths.len() {
            for j in (i + 1)..self.paths.len() {
                let (Some(a), Some(b)) = (&self.paths[i], &self.paths[j]) else {
                    continue;
                };
                if a.conflicts(b) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    fn into_paths(self) -> Vec<AgentPath> {
        self.paths
            .into_iter()
            .map(|path| path.expect("every team was solved"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Coord, MarkedCell};

    fn problem(
        width: usize,
        height: usize,
        walls: &[(usize, usize)],
        starts: &[(usize, usize, usize)],
        goals: &[(usize, usize, usize)],
    ) -> Problem {
        let mut grid = vec![vec![0; width]; height];
        for &(x, y) in walls {
            grid[y][x] = 1;
        }
        Problem {
            width,
            height,
            grid,
            starts: starts
                .iter()
                .map(|&(x, y, color)| MarkedCell { x, y, color })
                .collect(),
            goals: goals
                .iter()
                .map(|&(x, y, color)| MarkedCell { x, y, color })
                .collect(),
        }
    }

    fn solve(problem: &Problem, mode: HeuristicMode) -> Option<Solution> {
        MatchingSolver::new(problem, mode, false, false, false).solve(
            true,
            UNBOUNDED,
            &Deadline::new(),
            &mut Stats::default(),
        )
    }

    fn assert_valid(problem: &Problem, solution: &Solution) {
        // Equal lengths, correct starts, same-color goals, no conflicts.
        let length = solution.paths[0].len();
        for (id, path) in solution.paths.iter().enumerate() {
            assert_eq!(path.len(), length);
            assert_eq!(path[0], problem.starts[id].coord());
            let last = *path.last().unwrap();
            assert!(problem
                .goals
                .iter()
                .any(|goal| goal.coord() == last && goal.color == problem.starts[id].color));
        }
        for i in 0..solution.paths.len() {
            for j in (i + 1)..solution.paths.len() {
                for t in 1..length {
                    assert_ne!(
                        solution.paths[i][t], solution.paths[j][t],
                        "vertex conflict between {i} and {j} at time {t}"
                    );
                    assert!(
                        !(solution.paths[i][t - 1] == solution.paths[j][t]
                            && solution.paths[i][t] == solution.paths[j][t - 1]),
                        "edge conflict between {i} and {j} at time {t}"
                    );
                }
            }
        }
        // Every goal is covered by exactly one agent at the end.
        let mut finals: Vec<Coord> = solution.paths.iter().map(|p| *p.last().unwrap()).collect();
        finals.sort_unstable();
        finals.dedup();
        assert_eq!(finals.len(), solution.paths.len());
    }

    #[test]
    fn test_single_agent_open_grid() {
        let instance = problem(3, 3, &[], &[(0, 0, 0)], &[(2, 2, 0)]);
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            let solution = solve(&instance, mode).unwrap();
            assert_eq!(solution.paths[0].len(), 5);
            assert_eq!(solution.total_cost(), 4);
            assert_valid(&instance, &solution);
        }
    }

    #[test]
    fn test_corridor_swap_unsolvable_in_both_modes() {
        let instance = problem(
            3,
            1,
            &[],
            &[(0, 0, 0), (2, 0, 1)],
            &[(2, 0, 0), (0, 0, 1)],
        );
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            assert!(solve(&instance, mode).is_none());
        }
    }

    #[test]
    fn test_corridor_same_color_needs_no_moves() {
        let instance = problem(
            3,
            1,
            &[],
            &[(0, 0, 0), (2, 0, 0)],
            &[(2, 0, 0), (0, 0, 0)],
        );
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            let solution = solve(&instance, mode).unwrap();
            assert_eq!(solution.total_cost(), 0);
            assert_valid(&instance, &solution);
        }
    }

    #[test]
    fn test_two_matchings_straight_beats_crossing() {
        let instance = problem(
            3,
            3,
            &[],
            &[(0, 0, 0), (0, 2, 0)],
            &[(2, 0, 0), (2, 2, 0)],
        );
        let solution = solve(&instance, HeuristicMode::Exhaustive).unwrap();
        assert_eq!(solution.total_cost(), 4);
        assert_valid(&instance, &solution);
    }

    #[test]
    fn test_four_corners_around_center_wall() {
        // Four colors, each agent heading to the opposite corner; the center
        // wall leaves the corner-to-corner distance at 8.
        let instance = problem(
            5,
            5,
            &[(2, 2)],
            &[(0, 0, 0), (4, 4, 1), (0, 4, 2), (4, 0, 3)],
            &[(4, 4, 0), (0, 0, 1), (4, 0, 2), (0, 4, 3)],
        );
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            let solution = solve(&instance, mode).unwrap();
            assert_valid(&instance, &solution);
            assert_eq!(solution.total_cost(), 4 * 8);
        }
    }

    #[test]
    fn test_five_red_agents_color_equals_exhaustive() {
        let instance = problem(
            10,
            10,
            &[],
            &[(0, 0, 0), (2, 0, 0), (4, 0, 0), (6, 0, 0), (8, 0, 0)],
            &[(0, 9, 0), (2, 9, 0), (4, 9, 0), (6, 9, 0), (8, 9, 0)],
        );
        let color = solve(&instance, HeuristicMode::Color).unwrap();
        let exhaustive = solve(&instance, HeuristicMode::Exhaustive).unwrap();
        assert_valid(&instance, &color);
        assert_valid(&instance, &exhaustive);
        assert_eq!(color.total_cost(), exhaustive.total_cost());
        assert_eq!(color.total_cost(), 5 * 9);
    }

    #[test]
    fn test_waiting_for_a_crossing_agent_is_charged_once() {
        // Agent 1 crosses agent 0's goal cell at time 1; the optimum has
        // agent 0 wait one step and arrive behind it.
        let instance = problem(
            3,
            3,
            &[],
            &[(0, 1, 0), (1, 0, 1)],
            &[(1, 1, 0), (1, 2, 1)],
        );
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            let solution = solve(&instance, mode).unwrap();
            assert_valid(&instance, &solution);
            assert_eq!(solution.total_cost(), 4);
        }
    }

    #[test]
    fn test_early_arrival_keeps_trailing_rest_free() {
        // Agent 0 parks on its goal after one move while agent 1 is still
        // walking; the padded rest costs nothing.
        let instance = problem(
            5,
            2,
            &[],
            &[(0, 0, 0), (0, 1, 1)],
            &[(1, 0, 0), (4, 1, 1)],
        );
        for mode in [HeuristicMode::Color, HeuristicMode::Exhaustive] {
            let solution = solve(&instance, mode).unwrap();
            assert_valid(&instance, &solution);
            assert_eq!(solution.total_cost(), 1 + 4);
        }
    }

    #[test]
    fn test_matching_id_matches_plain_result() {
        let instance = problem(
            5,
            5,
            &[(2, 2)],
            &[(0, 0, 0), (4, 4, 1), (0, 4, 2), (4, 0, 3)],
            &[(4, 4, 0), (0, 0, 1), (4, 0, 2), (0, 4, 3)],
        );
        let plain = solve(&instance, HeuristicMode::Exhaustive).unwrap();
        let with_id = MatchingSolver::new(&instance, HeuristicMode::Exhaustive, false, true, false)
            .solve(true, UNBOUNDED, &Deadline::new(), &mut Stats::default())
            .unwrap();
        assert_valid(&instance, &with_id);
        assert_eq!(plain.total_cost(), with_id.total_cost());
    }

    #[test]
    fn test_matching_id_merges_singleton_teams() {
        let set = GroupPathSet::new(
            3,
            4,
            4,
            vec![
                Group::new(vec![0]),
                Group::new(vec![1]),
                Group::new(vec![2]),
            ],
            true,
        );
        let groups: Vec<&Group> = set.groups.iter().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].agent_ids(), &[0, 1, 2]);
    }

    #[test]
    fn test_solving_twice_gives_same_cost() {
        let instance = problem(
            4,
            4,
            &[(1, 1)],
            &[(0, 0, 0), (3, 3, 0)],
            &[(3, 0, 0), (0, 3, 0)],
        );
        let first = solve(&instance, HeuristicMode::Exhaustive).unwrap();
        let second = solve(&instance, HeuristicMode::Exhaustive).unwrap();
        assert_eq!(first.total_cost(), second.total_cost());
    }

    #[test]
    fn test_cancelled_solve_returns_none() {
        let instance = problem(3, 3, &[], &[(0, 0, 0)], &[(2, 2, 0)]);
        let deadline = Deadline::new();
        deadline.cancel();
        let result = MatchingSolver::new(&instance, HeuristicMode::Exhaustive, false, false, false)
            .solve(true, UNBOUNDED, &deadline, &mut Stats::default());
        assert!(result.is_none());
    }

    #[test]
    fn test_assignment_heuristic_same_answer() {
        let instance = problem(
            4,
            4,
            &[],
            &[(0, 0, 0), (0, 3, 0), (3, 0, 1)],
            &[(3, 3, 0), (1, 1, 0), (3, 2, 1)],
        );
        let plain = solve(&instance, HeuristicMode::Color).unwrap();
        let hungarian = MatchingSolver::new(&instance, HeuristicMode::Color, false, false, true)
            .solve(true, UNBOUNDED, &Deadline::new(), &mut Stats::default())
            .unwrap();
        assert_valid(&instance, &hungarian);
        assert_eq!(plain.total_cost(), hungarian.total_cost());
    }

    #[test]
    fn test_max_cost_bound_respected() {
        let instance = problem(3, 3, &[], &[(0, 0, 0)], &[(2, 2, 0)]);
        let solver = MatchingSolver::new(&instance, HeuristicMode::Exhaustive, false, false, false);
        assert!(solver
            .solve(true, 4, &Deadline::new(), &mut Stats::default())
            .is_some());
        assert!(solver
            .solve(true, 3, &Deadline::new(), &mut Stats::default())
            .is_none());
    }
}
