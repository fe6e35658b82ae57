use std::hash::{Hash, Hasher};

use crate::common::Agent;

/// Joint state of one group under operator decomposition. `agents` holds the
/// pre-move positions at time `time_step`; `new_agents` is the prefix of
/// post-move positions already chosen for the next step. The first
/// `illegal_size` entries of both are locked to externally fixed paths.
///
/// Equality and hashing use (agents, new_agents) only; the cost bookkeeping
/// fields never distinguish states.
#[derive(Debug, Clone)]
pub(crate) struct OdState {
    pub agents: Vec<Agent>,
    pub new_agents: Vec<Agent>,
    pub accumulated_cost: Vec<usize>,
    pub new_accumulated_cost: Vec<usize>,
    pub illegal_size: usize,
    pub construction_cost: usize,
    pub time_step: usize,
}

impl OdState {
    /// A bare state at time 0 with no moves chosen. The problem prefills the
    /// locked prefix right after construction.
    pub fn root(agents: Vec<Agent>, illegal_size: usize) -> Self {
        let count = agents.len();
        OdState {
            agents,
            new_agents: Vec::with_capacity(count),
            accumulated_cost: vec![0; count],
            new_accumulated_cost: Vec::with_capacity(count),
            illegal_size,
            construction_cost: 0,
            time_step: 0,
        }
    }

    /// A state is standard when every unlocked agent still awaits its move,
    /// i.e. the chosen prefix is exactly the locked one.
    pub fn is_standard(&self) -> bool {
        self.new_agents.len() == self.illegal_size
    }

    /// The next agent without a move, with its accumulated rest count.
    pub fn next_agent(&self) -> (Agent, usize) {
        let i = self.new_agents.len();
        (self.agents[i], self.accumulated_cost[i])
    }

    /// Whether placing the next agent on `new_agent`'s cell avoids vertex and
    /// swap conflicts with the prefix chosen so far. Locked agents sit in the
    /// prefix, so these checks cover them as well.
    pub fn valid_next(&self, new_agent: &Agent) -> bool {
        let moving = &self.agents[self.new_agents.len()];
        for (i, agent) in self.new_agents.iter().enumerate() {
            if agent.coord == new_agent.coord {
                return false;
            }
            if agent.coord == moving.coord && new_agent.coord == self.agents[i].coord {
                return false;
            }
        }
        true
    }

    /// Appends the post-move agent to the prefix. When the prefix completes,
    /// the state promotes: post-move positions become the pre-move positions
    /// of time_step + 1 and the prefix empties. The caller prefills the
    /// locked prefix of a freshly promoted state.
    pub fn move_with_agent(&self, agent: Agent, acc_cost: usize) -> OdState {
        let mut new_agents = self.new_agents.clone();
        new_agents.push(agent);
        let mut new_accumulated_cost = self.new_accumulated_cost.clone();
        new_accumulated_cost.push(acc_cost);

        if new_agents.len() == self.agents.len() {
            return OdState {
                agents: new_agents,
                new_agents: Vec::with_capacity(self.agents.len()),
                accumulated_cost: new_accumulated_cost,
                new_accumulated_cost: Vec::with_capacity(self.agents.len()),
                illegal_size: self.illegal_size,
                construction_cost: 0,
                time_step: self.time_step + 1,
            };
        }
        OdState {
            agents: self.agents.clone(),
            new_agents,
            accumulated_cost: self.accumulated_cost.clone(),
            new_accumulated_cost,
            illegal_size: self.illegal_size,
            construction_cost: 0,
            time_step: self.time_step,
        }
    }

    /// True right after a promotion, before the locked prefix is refilled.
    pub fn needs_prefill(&self) -> bool {
        self.new_agents.is_empty() && self.illegal_size > 0
    }

    /// Appends a locked agent's next position without promotion checks; only
    /// used while refilling the prefix of a promoted state.
    pub fn push_locked(&mut self, agent: Agent, acc_cost: usize) {
        debug_assert!(self.new_agents.len() < self.illegal_size);
        self.new_agents.push(agent);
        self.new_accumulated_cost.push(acc_cost);
    }
}

impl PartialEq for OdState {
    fn eq(&self, other: &Self) -> bool {
        self.agents == other.agents && self.new_agents == other.new_agents
    }
}

impl Eq for OdState {}

impl Hash for OdState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.agents.hash(state);
        self.new_agents.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Coord;
    use std::collections::HashSet;

    fn agent(id: usize, x: usize, y: usize) -> Agent {
        Agent::new(id, Coord::new(x, y), 0)
    }

    #[test]
    fn test_promotion_on_full_prefix() {
        let state = OdState::root(vec![agent(0, 0, 0), agent(1, 2, 0)], 0);
        assert!(state.is_standard());
        assert_eq!(state.time_step, 0);

        let mid = state.move_with_agent(agent(0, 1, 0), 0);
        assert!(!mid.is_standard());
        assert_eq!(mid.time_step, 0);
        assert_eq!(mid.next_agent().0, agent(1, 2, 0));

        let full = mid.move_with_agent(agent(1, 2, 1), 0);
        assert!(full.is_standard());
        assert_eq!(full.time_step, 1);
        assert_eq!(full.agents, vec![agent(0, 1, 0), agent(1, 2, 1)]);
        assert!(full.new_agents.is_empty());
    }

    #[test]
    fn test_valid_next_vertex_conflict() {
        let state = OdState::root(vec![agent(0, 0, 0), agent(1, 2, 0)], 0);
        let mid = state.move_with_agent(agent(0, 1, 0), 0);
        assert!(!mid.valid_next(&agent(1, 1, 0)));
        assert!(mid.valid_next(&agent(1, 2, 1)));
    }

    #[test]
    fn test_valid_next_swap_conflict() {
        let state = OdState::root(vec![agent(0, 0, 0), agent(1, 1, 0)], 0);
        // Agent 0 steps onto agent 1's cell; agent 1 may not step back.
        let mid = state.move_with_agent(agent(0, 1, 0), 0);
        assert!(!mid.valid_next(&agent(1, 0, 0)));
        assert!(mid.valid_next(&agent(1, 2, 0)));
    }

    #[test]
    fn test_equality_ignores_cost_bookkeeping() {
        let a = OdState {
            agents: vec![agent(0, 0, 0)],
            new_agents: Vec::new(),
            accumulated_cost: vec![3],
            new_accumulated_cost: Vec::new(),
            illegal_size: 0,
            construction_cost: 5,
            time_step: 9,
        };
        let b = OdState::root(vec![agent(0, 0, 0)], 0);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
