use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::rc::Rc;

use tracing::debug;

use crate::algorithm::{OdProblem, OdState};
use crate::common::{AgentPath, Coord, Deadline};
use crate::stat::Stats;

struct OdNode {
    state: OdState,
    cost: usize,
    heuristic: usize,
    conflicts: usize,
    parent: Option<Rc<OdNode>>,
}

/// Frontier handle ordered on (f, conflicts, h), smaller first. The conflict
/// count is the CAT tie-breaker and never affects which costs are reachable.
struct OpenNode(Rc<OdNode>);

impl OpenNode {
    fn key(&self) -> (usize, usize, usize) {
        (
            self.0.cost + self.0.heuristic,
            self.0.conflicts,
            self.0.heuristic,
        )
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Best-first search with operator decomposition over a single group.
/// Cost-bounded: solutions above `max_cost` are never returned, and any
/// generated node whose lower bound exceeds it is discarded.
pub(crate) struct OdSolver<'a> {
    problem: OdProblem<'a>,
    max_cost: usize,
}

impl<'a> OdSolver<'a> {
    pub fn new(problem: OdProblem<'a>, max_cost: usize) -> Self {
        OdSolver { problem, max_cost }
    }

    /// Returns conflict-free paths of minimum total cost within the bound,
    /// or None when the frontier runs dry or the deadline trips.
    pub fn solve(&self, deadline: &Deadline, stats: &mut Stats) -> Option<Vec<AgentPath>> {
        let (initial_state, initial_cost) = self.problem.initial_state();
        let initial_heuristic = self.problem.heuristic(&initial_state);
        if initial_cost.saturating_add(initial_heuristic) > self.max_cost {
            return None;
        }

        let mut expanded: HashSet<OdState> = HashSet::new();
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse(OpenNode(Rc::new(OdNode {
            state: initial_state,
            cost: initial_cost,
            heuristic: initial_heuristic,
            conflicts: 0,
            parent: None,
        }))));

        let mut popped: usize = 0;
        while let Some(Reverse(OpenNode(current))) = frontier.pop() {
            if deadline.is_expired() {
                debug!("solve cancelled after {popped} popped nodes");
                return None;
            }
            popped += 1;
            stats.od_popped_nodes += 1;
            if popped % 100_000 == 0 {
                debug!(
                    "count: {popped}, heuristic: {}, cost: {}, f: {}, frontier size: {}, max: {}",
                    current.heuristic,
                    current.cost,
                    current.cost + current.heuristic,
                    frontier.len(),
                    self.max_cost
                );
            }

            if self.problem.is_final(&current.state) {
                return Some(reconstruct_paths(&current));
            }
            // Only standard states close; intermediate prefixes may reach the
            // same standard state along different orders.
            if current.state.is_standard() && !expanded.insert(current.state.clone()) {
                continue;
            }

            for (state, cost_increase, conflicts) in self.problem.expand(&current.state) {
                if expanded.contains(&state) {
                    continue;
                }
                let cost = current.cost + cost_increase;
                let heuristic = self.problem.heuristic(&state);
                if cost.saturating_add(heuristic) <= self.max_cost {
                    stats.od_generated_nodes += 1;
                    frontier.push(Reverse(OpenNode(Rc::new(OdNode {
                        state,
                        cost,
                        heuristic,
                        conflicts: current.conflicts + conflicts,
                        parent: Some(Rc::clone(&current)),
                    }))));
                }
            }
        }
        None
    }
}

/// Walks the parent chain, keeps the standard states, and splits the joint
/// positions back into one path per agent.
fn reconstruct_paths(node: &Rc<OdNode>) -> Vec<AgentPath> {
    let mut state_path: Vec<&OdState> = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        if n.state.is_standard() {
            state_path.push(&n.state);
        }
        current = n.parent.as_ref();
    }
    state_path.reverse();

    let first = state_path.first().expect("the root state is standard");
    let mut paths: Vec<Vec<Coord>> = vec![Vec::new(); first.agents.len()];
    for state in &state_path {
        for (index, agent) in state.agents.iter().enumerate() {
            paths[index].push(agent.coord);
        }
    }
    paths
        .into_iter()
        .zip(first.agents.iter())
        .map(|(coords, agent)| AgentPath::new(agent.id, agent.color, coords))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::OdProblem;
    use crate::common::{Coord, Group, MarkedCell};
    use crate::map::{HeuristicMode, Map};
    use crate::scenario::Problem;
    use crate::solver::UNBOUNDED;

    fn open_map(width: usize, height: usize, starts: &[(usize, usize, usize)], goals: &[(usize, usize, usize)]) -> Map {
        let problem = Problem {
            width,
            height,
            grid: vec![vec![0; width]; height],
            starts: starts
                .iter()
                .map(|&(x, y, color)| MarkedCell { x, y, color })
                .collect(),
            goals: goals
                .iter()
                .map(|&(x, y, color)| MarkedCell { x, y, color })
                .collect(),
        };
        Map::new(&problem, HeuristicMode::Color, false)
    }

    fn solve(map: &Map, group: Group, max_cost: usize) -> Option<Vec<AgentPath>> {
        let problem = OdProblem::new(map, &group, vec![], vec![], None, false);
        OdSolver::new(problem, max_cost).solve(&Deadline::new(), &mut Stats::default())
    }

    #[test]
    fn test_single_agent_diagonal() {
        let map = open_map(3, 3, &[(0, 0, 0)], &[(2, 2, 0)]);
        let paths = solve(&map, Group::new(vec![0]), UNBOUNDED).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 5);
        assert_eq!(paths[0].cost(), 4);
        assert_eq!(paths[0].at(0), Coord::new(0, 0));
        assert_eq!(paths[0].at(4), Coord::new(2, 2));
    }

    #[test]
    fn test_bound_is_non_strict() {
        let map = open_map(3, 3, &[(0, 0, 0)], &[(2, 2, 0)]);
        assert!(solve(&map, Group::new(vec![0]), 4).is_some());
        assert!(solve(&map, Group::new(vec![0]), 3).is_none());
    }

    #[test]
    fn test_two_agents_cross_without_conflict() {
        // Head-on in a corridor with a passing bay above.
        let map = open_map(
            3,
            2,
            &[(0, 0, 0), (2, 0, 1)],
            &[(2, 0, 0), (0, 0, 1)],
        );
        let paths = solve(&map, Group::new(vec![0, 1]), UNBOUNDED).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(!paths[0].conflicts(&paths[1]));
        let total: usize = paths.iter().map(|path| path.cost()).sum();
        // One agent detours through the bay: 2 + 4.
        assert_eq!(total, 6);
    }

    #[test]
    fn test_early_arrival_rests_free() {
        // Agent 0 is one step from its goal; agent 1 needs four steps.
        let map = open_map(
            5,
            2,
            &[(0, 0, 0), (0, 1, 1)],
            &[(1, 0, 0), (4, 1, 1)],
        );
        let paths = solve(&map, Group::new(vec![0, 1]), UNBOUNDED).unwrap();
        let total: usize = paths.iter().map(|path| path.cost()).sum();
        assert_eq!(total, 1 + 4);
    }

    #[test]
    fn test_forced_wait_is_charged() {
        // Agent 1 crosses agent 0's goal cell (1, 1) at time 1, so agent 0
        // waits once before stepping on.
        let map = open_map(
            3,
            3,
            &[(0, 1, 0), (1, 0, 1)],
            &[(1, 1, 0), (1, 2, 1)],
        );
        let paths = solve(&map, Group::new(vec![0, 1]), UNBOUNDED).unwrap();
        assert!(!paths[0].conflicts(&paths[1]));
        let total: usize = paths.iter().map(|path| path.cost()).sum();
        assert_eq!(total, 2 + 2);
    }

    #[test]
    fn test_corridor_swap_has_no_solution() {
        let map = open_map(3, 1, &[(0, 0, 0), (2, 0, 1)], &[(2, 0, 0), (0, 0, 1)]);
        assert!(solve(&map, Group::new(vec![0, 1]), UNBOUNDED).is_none());
    }

    #[test]
    fn test_cancelled_solver_returns_none() {
        let map = open_map(3, 3, &[(0, 0, 0)], &[(2, 2, 0)]);
        let problem = OdProblem::new(&map, &Group::new(vec![0]), vec![], vec![], None, false);
        let deadline = Deadline::new();
        deadline.cancel();
        let result = OdSolver::new(problem, UNBOUNDED).solve(&deadline, &mut Stats::default());
        assert!(result.is_none());
    }
}
