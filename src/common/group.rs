/// An immutable set of agent ids, kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    agent_ids: Vec<usize>,
}

impl Group {
    pub fn new(mut agent_ids: Vec<usize>) -> Self {
        agent_ids.sort_unstable();
        Group { agent_ids }
    }

    pub fn agent_ids(&self) -> &[usize] {
        &self.agent_ids
    }

    pub fn len(&self) -> usize {
        self.agent_ids.len()
    }

    pub fn contains(&self, agent_id: usize) -> bool {
        self.agent_ids.binary_search(&agent_id).is_ok()
    }

    /// Sorted-union merge of two disjoint groups.
    pub fn combine(&self, other: &Group) -> Group {
        let mut new_ids = Vec::with_capacity(self.agent_ids.len() + other.agent_ids.len());
        let mut i = 0;
        let mut j = 0;
        while i < self.agent_ids.len() && j < other.agent_ids.len() {
            if self.agent_ids[i] < other.agent_ids[j] {
                new_ids.push(self.agent_ids[i]);
                i += 1;
            } else {
                new_ids.push(other.agent_ids[j]);
                j += 1;
            }
        }
        new_ids.extend_from_slice(&self.agent_ids[i..]);
        new_ids.extend_from_slice(&other.agent_ids[j..]);
        Group { agent_ids: new_ids }
    }
}

/// A partition of all agent ids into disjoint groups, with lookup from an
/// agent to the group it belongs to.
#[derive(Debug, Clone)]
pub struct Groups {
    groups: Vec<Group>,
}

impl Groups {
    pub fn new(groups: Vec<Group>) -> Self {
        Groups { groups }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn group_of(&self, agent_id: usize) -> &Group {
        self.groups
            .iter()
            .find(|group| group.contains(agent_id))
            .expect("every agent belongs to a group")
    }

    /// Merges the groups containing the two agents and returns the union.
    /// The partition invariant is preserved: the two old groups are removed
    /// and their union appended.
    pub fn combine_agents(&mut self, a: usize, b: usize) -> Group {
        let pos_a = self
            .groups
            .iter()
            .position(|group| group.contains(a))
            .expect("every agent belongs to a group");
        let pos_b = self
            .groups
            .iter()
            .position(|group| group.contains(b))
            .expect("every agent belongs to a group");
        assert_ne!(pos_a, pos_b, "agents already share a group");
        let combined = self.groups[pos_a].combine(&self.groups[pos_b]);
        self.groups.remove(pos_a.max(pos_b));
        self.groups.remove(pos_a.min(pos_b));
        self.groups.push(combined.clone());
        combined
    }
}
