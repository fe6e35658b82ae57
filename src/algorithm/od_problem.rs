use std::collections::HashMap;

use super::{min_cost_assignment, OdState};
use crate::common::{Agent, AgentPath, Cat, Coord, Group, DIRECTIONS};
use crate::map::{Map, UNREACHABLE};

/// A single-group search problem for the OD solver: expansion, cost
/// accounting, goal predicates and heuristics, all under an optional pinned
/// matching and an optional set of externally fixed ("illegal") paths whose
/// agents are locked into every state.
pub(crate) struct OdProblem<'a> {
    map: &'a Map,
    agent_ids: Vec<usize>,
    assigned_goals: Option<&'a HashMap<usize, usize>>,
    illegal_moves: Vec<AgentPath>,
    cats: Vec<&'a Cat>,
    use_assignment: bool,
    initial: OdState,
    initial_cost: usize,
}

impl<'a> OdProblem<'a> {
    pub fn new(
        map: &'a Map,
        group: &Group,
        cats: Vec<&'a Cat>,
        illegal_moves: Vec<AgentPath>,
        assigned_goals: Option<&'a HashMap<usize, usize>>,
        use_assignment: bool,
    ) -> Self {
        // Locked agents come first so the prefix checks in OdState cover them.
        let mut agents = Vec::with_capacity(illegal_moves.len() + group.len());
        for moves in &illegal_moves {
            agents.push(Agent::new(moves.agent_id, moves.at(0), moves.color));
        }
        for &id in group.agent_ids() {
            let start = map.starts[id];
            agents.push(Agent::new(id, start.coord(), start.color));
        }

        let mut problem = OdProblem {
            map,
            agent_ids: group.agent_ids().to_vec(),
            assigned_goals,
            illegal_moves,
            cats,
            use_assignment,
            initial: OdState::root(Vec::new(), 0),
            initial_cost: 0,
        };
        let mut initial = OdState::root(agents, problem.illegal_moves.len());
        problem.initial_cost = problem.prefill(&mut initial);
        problem.initial = initial;
        problem
    }

    /// The initial state and its cost: the locked prefix's contribution to
    /// the first time step.
    pub fn initial_state(&self) -> (OdState, usize) {
        (self.initial.clone(), self.initial_cost)
    }

    /// Generates the next intermediate states: the four moves plus standing
    /// still for the next agent without a move. Returns (state, added cost,
    /// conflict count) triples.
    pub fn expand(&self, parent: &OdState) -> Vec<(OdState, usize, usize)> {
        let (agent, acc) = parent.next_agent();
        let child_time = parent.time_step + 1;
        let mut result = Vec::with_capacity(5);

        for &(dx, dy) in &DIRECTIONS {
            let coord = match agent.coord.shifted(dx, dy) {
                Some(coord) if self.map.is_walkable(coord) => coord,
                _ => continue,
            };
            let moved = agent.moved_to(coord);
            if !parent.valid_next(&moved) {
                continue;
            }
            // Moving makes any rest spent on the goal count after all.
            let (child, locked_cost) = self.make_child(parent, moved, 0);
            result.push((child, acc + 1 + locked_cost, self.cat_count(coord, child_time)));
        }

        if parent.valid_next(&agent) {
            if self.on_goal(&agent) {
                // Possibly free wait: charged later only if the agent moves.
                let (child, locked_cost) = self.make_child(parent, agent, acc + 1);
                result.push((child, locked_cost, self.cat_count(agent.coord, child_time)));
            } else {
                let (child, locked_cost) = self.make_child(parent, agent, 0);
                result.push((child, 1 + locked_cost, self.cat_count(agent.coord, child_time)));
            }
        }
        result
    }

    fn make_child(&self, parent: &OdState, agent: Agent, acc_cost: usize) -> (OdState, usize) {
        let mut child = parent.move_with_agent(agent, acc_cost);
        let locked_cost = if child.needs_prefill() {
            self.prefill(&mut child)
        } else {
            0
        };
        (child, locked_cost)
    }

    /// Fills the locked prefix of a freshly promoted (or root) state with the
    /// positions its fixed paths dictate for the next time step, and returns
    /// their cost contribution for that step.
    fn prefill(&self, state: &mut OdState) -> usize {
        let next_time = state.time_step + 1;
        let mut added = 0;
        for i in 0..self.illegal_moves.len() {
            let agent = state.agents[i];
            let acc = state.accumulated_cost[i];
            let target = self.illegal_moves[i].at(next_time);
            if target != agent.coord {
                added += acc + 1;
                state.push_locked(agent.moved_to(target), 0);
            } else if self.on_goal(&agent) {
                state.push_locked(agent, acc + 1);
            } else {
                added += 1;
                state.push_locked(agent, 0);
            }
        }
        state.construction_cost = added;
        added
    }

    /// A standard state is final when every agent, locked ones included,
    /// stands on its goal under the active matching.
    pub fn is_final(&self, state: &OdState) -> bool {
        state.is_standard() && state.agents.iter().all(|agent| self.on_goal(agent))
    }

    /// The goal predicate under the active matching: the assigned goal when
    /// one is pinned, any goal of the agent's color otherwise.
    fn on_goal(&self, agent: &Agent) -> bool {
        match self.assigned_goals {
            Some(assigned) => self.map.goals[assigned[&agent.id]].coord() == agent.coord,
            None => self.map.on_color_goal(agent),
        }
    }

    /// Admissible remaining-cost estimate over post-move positions where
    /// chosen and pre-move positions elsewhere. Saturating so a pinned but
    /// unreachable goal reads as an unmeetable bound instead of wrapping.
    pub fn heuristic(&self, state: &OdState) -> usize {
        if self.use_assignment && self.assigned_goals.is_none() {
            return self.assignment_heuristic(state);
        }
        let mut h: usize = 0;
        for agent in &state.new_agents {
            h = h.saturating_add(self.distance_to_goal(agent));
        }
        for agent in &state.agents[state.new_agents.len()..] {
            h = h.saturating_add(self.distance_to_goal(agent));
        }
        h
    }

    fn distance_to_goal(&self, agent: &Agent) -> usize {
        match self.assigned_goals {
            Some(assigned) => self.map.goal_heuristic(agent.coord, assigned[&agent.id]),
            None => self.map.color_heuristic(agent.coord, agent.color),
        }
    }

    /// Minimum over all color-consistent matchings of the summed distances;
    /// tighter than the per-agent nearest-goal sum and still a lower bound.
    fn assignment_heuristic(&self, state: &OdState) -> usize {
        let positions: Vec<&Agent> = state
            .new_agents
            .iter()
            .chain(state.agents[state.new_agents.len()..].iter())
            .collect();
        let costs: Vec<Vec<usize>> = positions
            .iter()
            .map(|agent| {
                self.map
                    .goals
                    .iter()
                    .enumerate()
                    .map(|(j, goal)| {
                        if goal.color == agent.color {
                            self.map.goal_heuristic(agent.coord, j)
                        } else {
                            UNREACHABLE
                        }
                    })
                    .collect()
            })
            .collect();
        min_cost_assignment(&costs).unwrap_or_else(|| {
            positions
                .iter()
                .map(|agent| self.map.color_heuristic(agent.coord, agent.color))
                .sum()
        })
    }

    fn cat_count(&self, coord: Coord, time: usize) -> usize {
        self.cats
            .iter()
            .map(|cat| cat.count(&self.agent_ids, coord, time))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MarkedCell;
    use crate::map::HeuristicMode;
    use crate::scenario::Problem;

    fn corridor_map() -> Map {
        // 4x1 corridor, one red agent at x=0 with its goal at x=1.
        let problem = Problem {
            width: 4,
            height: 1,
            grid: vec![vec![0; 4]],
            starts: vec![MarkedCell { x: 0, y: 0, color: 0 }],
            goals: vec![MarkedCell { x: 1, y: 0, color: 0 }],
        };
        Map::new(&problem, HeuristicMode::Color, false)
    }

    fn find_child(
        children: &[(OdState, usize, usize)],
        coord: Coord,
    ) -> (OdState, usize) {
        let (state, cost, _) = children
            .iter()
            .find(|(state, _, _)| state.agents[state.agents.len() - 1].coord == coord)
            .expect("expected a child on that cell");
        (state.clone(), *cost)
    }

    #[test]
    fn test_wait_on_goal_is_free_until_leaving() {
        let map = corridor_map();
        let problem = OdProblem::new(&map, &Group::new(vec![0]), vec![], vec![], None, false);
        let (root, initial_cost) = problem.initial_state();
        assert_eq!(initial_cost, 0);

        // Step onto the goal: one move, cost 1.
        let (on_goal, move_cost) = find_child(&problem.expand(&root), Coord::new(1, 0));
        assert_eq!(move_cost, 1);
        assert!(problem.is_final(&on_goal));

        // Resting on the goal accumulates but costs nothing now.
        let (resting, rest_cost) = find_child(&problem.expand(&on_goal), Coord::new(1, 0));
        assert_eq!(rest_cost, 0);
        assert_eq!(resting.accumulated_cost[0], 1);

        // Leaving the goal charges the deferred rest plus the move.
        let (_, leave_cost) = find_child(&problem.expand(&resting), Coord::new(2, 0));
        assert_eq!(leave_cost, 2);
    }

    #[test]
    fn test_wait_off_goal_costs_one() {
        let map = corridor_map();
        let problem = OdProblem::new(&map, &Group::new(vec![0]), vec![], vec![], None, false);
        let (root, _) = problem.initial_state();
        let (_, wait_cost) = find_child(&problem.expand(&root), Coord::new(0, 0));
        assert_eq!(wait_cost, 1);
    }

    #[test]
    fn test_locked_path_blocks_and_charges() {
        // Two agents; agent 1's path is fixed to cross the corridor.
        let instance = Problem {
            width: 4,
            height: 1,
            grid: vec![vec![0; 4]],
            starts: vec![
                MarkedCell { x: 0, y: 0, color: 0 },
                MarkedCell { x: 2, y: 0, color: 1 },
            ],
            goals: vec![
                MarkedCell { x: 1, y: 0, color: 0 },
                MarkedCell { x: 3, y: 0, color: 1 },
            ],
        };
        let map = Map::new(&instance, HeuristicMode::Color, false);
        let fixed = AgentPath::new(1, 1, vec![Coord::new(2, 0), Coord::new(3, 0)]);
        let problem = OdProblem::new(
            &map,
            &Group::new(vec![0]),
            vec![],
            vec![fixed],
            None,
            false,
        );

        // The locked move (2,0) -> (3,0) is charged up front.
        let (root, initial_cost) = problem.initial_state();
        assert_eq!(initial_cost, 1);
        assert!(root.is_standard());
        assert_eq!(root.illegal_size, 1);
        assert_eq!(root.new_agents[0].coord, Coord::new(3, 0));

        // Once the locked path has ended, resting on its goal is free.
        let children = problem.expand(&root);
        let (next, cost) = find_child(&children, Coord::new(1, 0));
        assert_eq!(cost, 1);
        assert_eq!(next.construction_cost, 0);
        assert!(problem.is_final(&next));
    }

    #[test]
    fn test_locked_cell_rejected_for_group_agent() {
        // Agent 1 stays locked on (1,0); agent 0 may not step there.
        let instance = Problem {
            width: 3,
            height: 1,
            grid: vec![vec![0; 3]],
            starts: vec![
                MarkedCell { x: 0, y: 0, color: 0 },
                MarkedCell { x: 1, y: 0, color: 1 },
            ],
            goals: vec![
                MarkedCell { x: 2, y: 0, color: 0 },
                MarkedCell { x: 1, y: 0, color: 1 },
            ],
        };
        let map = Map::new(&instance, HeuristicMode::Color, false);
        let fixed = AgentPath::new(1, 1, vec![Coord::new(1, 0)]);
        let problem = OdProblem::new(
            &map,
            &Group::new(vec![0]),
            vec![],
            vec![fixed],
            None,
            false,
        );
        let (root, _) = problem.initial_state();
        let children = problem.expand(&root);
        for (state, _, _) in &children {
            let group_agent = state.agents.last().expect("state has agents");
            assert_ne!(group_agent.coord, Coord::new(1, 0));
        }
        // Only waiting at the start remains.
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_pinned_matching_changes_goal_predicate() {
        let instance = Problem {
            width: 3,
            height: 1,
            grid: vec![vec![0; 3]],
            starts: vec![
                MarkedCell { x: 0, y: 0, color: 0 },
                MarkedCell { x: 2, y: 0, color: 0 },
            ],
            goals: vec![
                MarkedCell { x: 0, y: 0, color: 0 },
                MarkedCell { x: 2, y: 0, color: 0 },
            ],
        };
        let map = Map::new(&instance, HeuristicMode::Exhaustive, false);
        let crossed: HashMap<usize, usize> = [(0, 1), (1, 0)].into_iter().collect();
        let problem = OdProblem::new(
            &map,
            &Group::new(vec![0, 1]),
            vec![],
            vec![],
            Some(&crossed),
            false,
        );
        let (root, _) = problem.initial_state();
        // Both agents stand on same-color goals, but not their assigned ones.
        assert!(!problem.is_final(&root));
        assert_eq!(problem.heuristic(&root), 4);
    }
}
