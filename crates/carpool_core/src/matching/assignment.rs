//! Binary set-partitioning assignment IP: picks the cost-minimizing
//! disjoint selection of feasible groups covering the active requests.
//!
//! Solved as a hand-written exact branch-and-bound search over group
//! selection rather than via an external ILP solver: the number of
//! feasible groups per matching round is bounded by driver count times a
//! handful of cluster subsets, which keeps exact search tractable without
//! a solver dependency. A node budget caps the search; exceeding it is
//! treated as non-optimal termination and yields an empty assignment.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::matching::group_enum::FeasibleGroup;

#[derive(Debug, Clone, Copy, Resource)]
pub struct AssignmentConfig {
    pub capacity: u32,
    /// `C_cap = capacity_penalty_weight * max_g cost_g`.
    pub capacity_penalty_weight: f64,
    /// Upper bound on branch-and-bound nodes explored before giving up
    /// and returning an empty (non-optimal) assignment.
    pub max_search_nodes: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        AssignmentConfig {
            capacity: 3,
            capacity_penalty_weight: 3.0,
            max_search_nodes: 200_000,
        }
    }
}

/// Chosen groups for this matching round, or empty if the round was
/// infeasible or the search did not terminate with a proven optimum.
pub struct Assignment {
    pub selected_groups: Vec<usize>,
}

struct Instance<'a> {
    groups: &'a [FeasibleGroup],
    group_weight: Vec<f64>,
    group_requests: Vec<Vec<usize>>,
    group_driver: Vec<usize>,
    num_requests: usize,
}

/// Solves the set-partitioning IP over the feasible groups produced by
/// `GroupEnumerator`. `all_requests` is every active
/// request under consideration this round (including those with zero
/// feasible groups, which are forced `y_r = 0`).
pub fn solve_assignment_ip(
    groups: &[FeasibleGroup],
    all_requests: &[Entity],
    config: &AssignmentConfig,
) -> Assignment {
    if groups.is_empty() {
        return Assignment { selected_groups: vec![] };
    }

    let max_group_cost = groups.iter().map(|g| g.total_cost).fold(0.0, f64::max);
    let quit_penalty = (10.0 * max_group_cost).max(1_000_000.0);
    let capacity_penalty = config.capacity_penalty_weight * max_group_cost;

    let request_index: HashMap<Entity, usize> = all_requests
        .iter()
        .enumerate()
        .map(|(i, e)| (*e, i))
        .collect();

    let mut driver_ids: Vec<Entity> = groups.iter().map(|g| g.driver).collect();
    driver_ids.sort();
    driver_ids.dedup();
    let driver_index: HashMap<Entity, usize> = driver_ids.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let group_requests: Vec<Vec<usize>> = groups
        .iter()
        .map(|g| g.requests.iter().filter_map(|r| request_index.get(r).copied()).collect())
        .collect();

    let group_driver: Vec<usize> = groups.iter().map(|g| driver_index[&g.driver]).collect();

    // Weight per group = cost_g + C_cap * (capacity - |g|) - |g| * C_quit.
    // The "-|g| * quit_penalty" term makes selecting a group of size |g|
    // equivalent, in the objective's constant-adjusted form, to covering
    // |g| requests that would otherwise each pay the quit penalty; this
    // lets branch-and-bound work with a single per-group weight instead of
    // tracking y_r separately (the two formulations have the same argmin
    // because y_r is driven entirely by group selection: y_r=1 iff some
    // selected group contains r).
    let group_weight: Vec<f64> = groups
        .iter()
        .map(|g| {
            let size = g.requests.len() as f64;
            g.total_cost + capacity_penalty * (config.capacity as f64 - size) - size * quit_penalty
        })
        .collect();

    let instance = Instance {
        groups,
        group_weight,
        group_requests,
        group_driver,
        num_requests: all_requests.len(),
    };

    let baseline_cost = quit_penalty * all_requests.len() as f64;

    let mut best_cost = baseline_cost;
    let mut best_selection: Vec<usize> = vec![];

    let order = sort_groups_by_weight(&instance);

    let mut nodes_explored = 0usize;
    let mut used_requests = vec![false; instance.num_requests];
    let mut used_drivers = vec![false; driver_ids.len()];
    let mut current_selection = Vec::new();

    let budget_exceeded = !branch(
        &instance,
        &order,
        0,
        0.0,
        &mut used_requests,
        &mut used_drivers,
        &mut current_selection,
        &mut best_cost,
        &mut best_selection,
        &mut nodes_explored,
        config.max_search_nodes,
    );

    if budget_exceeded {
        return Assignment { selected_groups: vec![] };
    }

    Assignment {
        selected_groups: best_selection,
    }
}

fn sort_groups_by_weight(instance: &Instance) -> Vec<usize> {
    let mut order: Vec<usize> = (0..instance.groups.len()).collect();
    order.sort_by(|a, b| instance.group_weight[*a].partial_cmp(&instance.group_weight[*b]).unwrap());
    order
}

/// Depth-first branch-and-bound: at each group (in ascending-weight
/// order) either include it (if request/driver capacity allows) or
/// exclude it. Returns `false` if the node budget was exhausted before
/// the search concluded.
#[allow(clippy::too_many_arguments)]
fn branch(
    instance: &Instance,
    order: &[usize],
    pos: usize,
    running_cost: f64,
    used_requests: &mut [bool],
    used_drivers: &mut [bool],
    current_selection: &mut Vec<usize>,
    best_cost: &mut f64,
    best_selection: &mut Vec<usize>,
    nodes_explored: &mut usize,
    max_nodes: usize,
) -> bool {
    *nodes_explored += 1;
    if *nodes_explored > max_nodes {
        return false;
    }

    if pos == order.len() {
        if running_cost < *best_cost - 1e-9 {
            *best_cost = running_cost;
            *best_selection = current_selection.clone();
        }
        return true;
    }

    // Lower bound: remaining groups can only add non-negative weight past
    // this point is not guaranteed (weights can be negative), so we
    // conservatively continue the search rather than prune on bound alone,
    // relying on the node budget for termination on pathological inputs.
    let g = order[pos];

    // Branch: exclude group g.
    if !branch(
        instance,
        order,
        pos + 1,
        running_cost,
        used_requests,
        used_drivers,
        current_selection,
        best_cost,
        best_selection,
        nodes_explored,
        max_nodes,
    ) {
        return false;
    }

    // Branch: include group g, if its driver and requests are free.
    let driver = instance.group_driver[g];
    let requests = &instance.group_requests[g];
    let driver_free = !used_drivers[driver];
    let requests_free = requests.iter().all(|r| !used_requests[*r]);

    if driver_free && requests_free {
        used_drivers[driver] = true;
        for r in requests {
            used_requests[*r] = true;
        }
        current_selection.push(g);

        let ok = branch(
            instance,
            order,
            pos + 1,
            running_cost + instance.group_weight[g],
            used_requests,
            used_drivers,
            current_selection,
            best_cost,
            best_selection,
            nodes_explored,
            max_nodes,
        );

        current_selection.pop();
        used_drivers[driver] = false;
        for r in requests {
            used_requests[*r] = false;
        }

        if !ok {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    fn solo_group(driver: Entity, request: Entity, cost: f64) -> FeasibleGroup {
        FeasibleGroup {
            driver,
            requests: vec![request],
            route: vec![],
            pickup_leg_cost: 0.0,
            route_cost: cost,
            total_cost: cost,
            cost_by_request: {
                let mut m = StdHashMap::new();
                m.insert(request, cost);
                m
            },
            detour_by_request: {
                let mut m = StdHashMap::new();
                m.insert(request, 1.0);
                m
            },
        }
    }

    #[test]
    fn single_feasible_group_is_selected() {
        let groups = vec![solo_group(e(1), e(10), 50.0)];
        let config = AssignmentConfig::default();
        let assignment = solve_assignment_ip(&groups, &[e(10)], &config);
        assert_eq!(assignment.selected_groups.len(), 1);
    }

    #[test]
    fn two_drivers_both_requests_covered() {
        let groups = vec![solo_group(e(1), e(10), 50.0), solo_group(e(2), e(11), 60.0)];
        let config = AssignmentConfig::default();
        let assignment = solve_assignment_ip(&groups, &[e(10), e(11)], &config);
        assert_eq!(assignment.selected_groups.len(), 2);
    }

    #[test]
    fn one_driver_two_competing_groups_picks_cheaper() {
        let pool_group = FeasibleGroup {
            driver: e(1),
            requests: vec![e(10), e(11)],
            route: vec![],
            pickup_leg_cost: 0.0,
            route_cost: 80.0,
            total_cost: 80.0,
            cost_by_request: StdHashMap::new(),
            detour_by_request: StdHashMap::new(),
        };
        let groups = vec![solo_group(e(1), e(10), 50.0), pool_group];
        let config = AssignmentConfig::default();
        let assignment = solve_assignment_ip(&groups, &[e(10), e(11)], &config);
        // Covering both requests (group index 1) strictly dominates leaving
        // request 11 to quit, since the quit penalty swamps any cost saving.
        assert_eq!(assignment.selected_groups, vec![1]);
    }

    #[test]
    fn empty_groups_yields_empty_assignment() {
        let config = AssignmentConfig::default();
        let assignment = solve_assignment_ip(&[], &[e(10)], &config);
        assert!(assignment.selected_groups.is_empty());
    }
}
