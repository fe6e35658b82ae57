use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::algorithm::OdProblem;
use crate::common::{AgentPath, Cat, Deadline, Group, Groups};
use crate::map::{HeuristicMode, Map, UNREACHABLE};
use crate::solver::{OdSolver, UNBOUNDED};
use crate::stat::Stats;

/// Bound on the matching priority queue when sorted enumeration is enabled.
const MATCHING_HEAP_SIZE: usize = 100;

/// The stored paths of one independence-detection run, with the collision
/// avoidance table kept consistent through every replacement.
struct PathSet<'a> {
    map: &'a Map,
    agent_ids: Vec<usize>,
    mapping: HashMap<usize, usize>,
    assigned_goals: Option<&'a HashMap<usize, usize>>,
    paths: Vec<Option<AgentPath>>,
    costs: Vec<Option<usize>>,
    cat: Cat,
}

impl<'a> PathSet<'a> {
    fn new(
        map: &'a Map,
        agent_ids: &[usize],
        assigned_goals: Option<&'a HashMap<usize, usize>>,
        enable_cat: bool,
    ) -> Self {
        let mapping = agent_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();
        PathSet {
            map,
            agent_ids: agent_ids.to_vec(),
            mapping,
            assigned_goals,
            paths: vec![None; agent_ids.len()],
            costs: vec![None; agent_ids.len()],
            cat: if enable_cat {
                Cat::new(map.starts.len(), map.width, map.height)
            } else {
                Cat::empty()
            },
        }
    }

    fn update(&mut self, new_paths: Vec<AgentPath>) {
        for path in new_paths {
            let index = self.mapping[&path.agent_id];
            if let Some(old) = &self.paths[index] {
                self.cat.remove_path(old);
            }
            self.cat.add_path(&path);
            self.costs[index] = Some(path.cost());
            self.paths[index] = Some(path);
        }
    }

    /// Stored cost of the agent's path, or an admissible lower bound from the
    /// heuristic tables before one exists.
    fn cost_of(&self, agent_id: usize) -> usize {
        let index = self.mapping[&agent_id];
        if let Some(cost) = self.costs[index] {
            return cost;
        }
        let start = self.map.starts[agent_id];
        match self.assigned_goals {
            Some(assigned) => self.map.goal_heuristic(start.coord(), assigned[&agent_id]),
            None => self.map.color_heuristic(start.coord(), start.color),
        }
    }

    /// Budget left for the given agents: the bound minus what every other
    /// agent already spends. None when the others alone exceed the bound.
    fn remaining_cost(&self, group_ids: &[usize], max_cost: usize) -> Option<usize> {
        if max_cost == UNBOUNDED {
            return Some(UNBOUNDED);
        }
        let others: usize = self
            .agent_ids
            .iter()
            .filter(|id| !group_ids.contains(id))
            .map(|&id| self.cost_of(id))
            .sum();
        max_cost.checked_sub(others)
    }

    /// First conflicting pair in agent order.
    fn find_conflict(&self) -> Option<(usize, usize)> {
        for i in 0..self.agent_ids.len() {
            for j in (i + 1)..self.agent_ids.len() {
                let (Some(a), Some(b)) = (&self.paths[i], &self.paths[j]) else {
                    continue;
                };
                if a.conflicts(b) {
                    return Some((self.agent_ids[i], self.agent_ids[j]));
                }
            }
        }
        None
    }

    fn path(&self, agent_id: usize) -> &AgentPath {
        self.paths[self.mapping[&agent_id]]
            .as_ref()
            .expect("path requested before it was solved")
    }

    fn into_paths(self) -> Vec<AgentPath> {
        self.paths
            .into_iter()
            .map(|path| path.expect("every agent was solved"))
            .collect()
    }
}

/// Odometer over the per-agent candidate goal lists, yielding only tuples
/// with pairwise distinct goals. Rightmost agent advances fastest, so tuples
/// appear in nearest-first order per agent.
struct MatchingGen {
    lists: Vec<Vec<usize>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl MatchingGen {
    fn new(lists: Vec<Vec<usize>>) -> Self {
        let exhausted = lists.iter().any(|list| list.is_empty());
        let indices = vec![0; lists.len()];
        MatchingGen {
            lists,
            indices,
            exhausted,
        }
    }

    fn next_tuple(&mut self) -> Option<Vec<usize>> {
        while !self.exhausted {
            let tuple: Vec<usize> = self
                .indices
                .iter()
                .zip(&self.lists)
                .map(|(&index, list)| list[index])
                .collect();
            self.advance();
            let mut seen = tuple.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() == tuple.len() {
                return Some(tuple);
            }
        }
        None
    }

    fn advance(&mut self) {
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.lists[pos].len() {
                return;
            }
            self.indices[pos] = 0;
        }
        self.exhausted = true;
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Matching {
    cost: usize,
    goals: Vec<usize>,
}

/// One independence-detection problem: solve a group of agents by splitting
/// them into singleton subgroups, replanning around conflicts where a budget
/// allows it and merging subgroups where it does not. In exhaustive mode an
/// outer loop enumerates goal matchings and keeps the cheapest full solution.
pub(crate) struct IdProblem<'a> {
    map: &'a Map,
    agent_ids: Vec<usize>,
    enable_sorting: bool,
    use_assignment: bool,
    gen: Option<MatchingGen>,
    heap: BinaryHeap<Reverse<Matching>>,
}

fn initial_matching_heuristic(map: &Map, agent_ids: &[usize], goals: &[usize]) -> usize {
    agent_ids
        .iter()
        .zip(goals)
        .map(|(&id, &goal)| map.goal_heuristic(map.starts[id].coord(), goal))
        .fold(0usize, |sum, dist| sum.saturating_add(dist))
}

impl<'a> IdProblem<'a> {
    pub fn new(map: &'a Map, group: &Group, enable_sorting: bool, use_assignment: bool) -> Self {
        let gen = (map.mode == HeuristicMode::Exhaustive).then(|| {
            let lists = group
                .agent_ids()
                .iter()
                .map(|&id| {
                    let start = map.starts[id];
                    // Goals this agent cannot reach would only seed dead
                    // matchings; leave them out up front.
                    let mut goal_ids: Vec<usize> = map
                        .goals
                        .iter()
                        .enumerate()
                        .filter(|(index, goal)| {
                            goal.color == start.color
                                && map.goal_heuristic(start.coord(), *index) != UNREACHABLE
                        })
                        .map(|(index, _)| index)
                        .collect();
                    goal_ids.sort_by_key(|&index| map.goal_heuristic(start.coord(), index));
                    goal_ids
                })
                .collect();
            MatchingGen::new(lists)
        });
        IdProblem {
            map,
            agent_ids: group.agent_ids().to_vec(),
            enable_sorting,
            use_assignment,
            gen,
            heap: BinaryHeap::new(),
        }
    }

    /// The next matching to evaluate: straight from the generator, or drawn
    /// through the bounded heap when sorted enumeration is on. The heap keeps
    /// only candidates below the best known cost and resets once its head
    /// reaches it.
    fn next_matching(&mut self, maximum: usize) -> Option<Vec<usize>> {
        let gen = self.gen.as_mut().expect("matchings only exist in exhaustive mode");
        if !self.enable_sorting {
            return gen.next_tuple();
        }
        loop {
            while self.heap.len() < MATCHING_HEAP_SIZE {
                let Some(goals) = gen.next_tuple() else { break };
                let cost = initial_matching_heuristic(self.map, &self.agent_ids, &goals);
                if cost < maximum {
                    self.heap.push(Reverse(Matching { cost, goals }));
                }
            }
            let Reverse(next) = self.heap.pop()?;
            if next.cost >= maximum {
                self.heap.clear();
                continue;
            }
            return Some(next.goals);
        }
    }

    /// Solves the group. Color mode runs one ID pass with the implicit
    /// matching; exhaustive mode loops over matchings, each pruned by the
    /// best total found so far, and returns the cheapest solution.
    pub fn solve(
        &mut self,
        outer_cat: Option<&Cat>,
        upper_bound: usize,
        enable_cat: bool,
        deadline: &Deadline,
        stats: &mut Stats,
    ) -> Option<Vec<AgentPath>> {
        if self.map.mode == HeuristicMode::Color {
            return self.solve_matching(outer_cat, upper_bound, None, enable_cat, deadline, stats);
        }

        // Start one above the caller's bound so an exactly-equal solution is
        // still accepted.
        let mut best = upper_bound.saturating_add(1);
        let mut best_solution = None;
        while let Some(goals) = self.next_matching(best) {
            if deadline.is_expired() {
                return None;
            }
            stats.matchings_tried += 1;
            debug!("trying goal assignment {goals:?} with maximum cost {best}");
            let assigned: HashMap<usize, usize> =
                self.agent_ids.iter().copied().zip(goals).collect();
            if let Some(solution) =
                self.solve_matching(outer_cat, best, Some(&assigned), enable_cat, deadline, stats)
            {
                let cost: usize = solution.iter().map(|path| path.cost()).sum();
                if cost < best {
                    best = cost;
                    best_solution = Some(solution);
                }
            }
        }
        best_solution
    }

    /// One ID pass under a fixed (or implicit) matching.
    fn solve_matching(
        &self,
        outer_cat: Option<&Cat>,
        maximum: usize,
        assigned_goals: Option<&HashMap<usize, usize>>,
        enable_cat: bool,
        deadline: &Deadline,
        stats: &mut Stats,
    ) -> Option<Vec<AgentPath>> {
        let mut paths = PathSet::new(self.map, &self.agent_ids, assigned_goals, enable_cat);
        let mut groups = Groups::new(
            self.agent_ids
                .iter()
                .map(|&id| Group::new(vec![id]))
                .collect(),
        );

        // Initial independent solves, each under the budget the others leave.
        for group in self.agent_ids.iter().map(|&id| Group::new(vec![id])) {
            let solution = {
                let budget = paths.remaining_cost(group.agent_ids(), maximum)?;
                let problem = OdProblem::new(
                    self.map,
                    &group,
                    gather_cats(outer_cat, &paths.cat),
                    Vec::new(),
                    assigned_goals,
                    self.use_assignment,
                );
                OdSolver::new(problem, budget).solve(deadline, stats)?
            };
            paths.update(solution);
        }

        let mut avoided: HashSet<(Vec<usize>, Vec<usize>)> = HashSet::new();
        while let Some((a, b)) = paths.find_conflict() {
            if deadline.is_expired() {
                return None;
            }
            let a_group = groups.group_of(a).clone();
            let b_group = groups.group_of(b).clone();
            let mut combine = true;

            let combo = (
                a_group.agent_ids().to_vec(),
                b_group.agent_ids().to_vec(),
            );
            if avoided.insert(combo) {
                // Replan one side around the other's paths; optimal as long
                // as the budget equals both sides' current spend.
                stats.id_avoidances += 1;
                if let Some(solution) = self.solve_avoidance(
                    &a_group,
                    &b_group,
                    &paths,
                    outer_cat,
                    assigned_goals,
                    deadline,
                    stats,
                ) {
                    paths.update(solution);
                    combine = false;
                } else if let Some(solution) = self.solve_avoidance(
                    &b_group,
                    &a_group,
                    &paths,
                    outer_cat,
                    assigned_goals,
                    deadline,
                    stats,
                ) {
                    paths.update(solution);
                    combine = false;
                }
            }

            if combine {
                let group = groups.combine_agents(a, b);
                stats.id_merges += 1;
                debug!(
                    "combining agents from groups of {a} and {b} into {:?}",
                    group.agent_ids()
                );
                let solution = {
                    let budget = paths.remaining_cost(group.agent_ids(), maximum)?;
                    let problem = OdProblem::new(
                        self.map,
                        &group,
                        gather_cats(outer_cat, &paths.cat),
                        Vec::new(),
                        assigned_goals,
                        self.use_assignment,
                    );
                    OdSolver::new(problem, budget).solve(deadline, stats)?
                };
                paths.update(solution);
            }
        }
        Some(paths.into_paths())
    }

    fn solve_avoidance(
        &self,
        replan: &Group,
        fixed: &Group,
        paths: &PathSet,
        outer_cat: Option<&Cat>,
        assigned_goals: Option<&HashMap<usize, usize>>,
        deadline: &Deadline,
        stats: &mut Stats,
    ) -> Option<Vec<AgentPath>> {
        let budget: usize = replan
            .agent_ids()
            .iter()
            .chain(fixed.agent_ids())
            .map(|&id| paths.cost_of(id))
            .sum();
        let illegal_moves: Vec<AgentPath> = fixed
            .agent_ids()
            .iter()
            .map(|&id| paths.path(id).clone())
            .collect();
        let problem = OdProblem::new(
            self.map,
            replan,
            gather_cats(outer_cat, &paths.cat),
            illegal_moves,
            assigned_goals,
            self.use_assignment,
        );
        OdSolver::new(problem, budget).solve(deadline, stats)
    }
}

fn gather_cats<'c>(outer_cat: Option<&'c Cat>, own: &'c Cat) -> Vec<&'c Cat> {
    let mut cats = Vec::with_capacity(2);
    if let Some(cat) = outer_cat {
        cats.push(cat);
    }
    cats.push(own);
    cats
}
