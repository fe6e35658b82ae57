use crate::map::UNREACHABLE;

const FORBIDDEN: i64 = i64::MAX / 4;

/// Minimum-cost assignment of every row to a distinct column, for rectangular
/// matrices with rows <= columns. `UNREACHABLE` entries mark forbidden pairs.
/// Returns the summed cost of the cheapest complete assignment, or None when
/// no complete assignment avoids forbidden pairs.
///
/// Shortest-augmenting-path formulation with row/column potentials; one
/// augmentation per row.
pub(crate) fn min_cost_assignment(costs: &[Vec<usize>]) -> Option<usize> {
    let rows = costs.len();
    if rows == 0 {
        return Some(0);
    }
    let cols = costs[0].len();
    if rows > cols {
        return None;
    }
    let cost = |i: usize, j: usize| -> i64 {
        if costs[i][j] == UNREACHABLE {
            FORBIDDEN
        } else {
            costs[i][j] as i64
        }
    };

    // 1-indexed; matched_row[j] is the row assigned to column j, 0 for none.
    let mut row_potential = vec![0i64; rows + 1];
    let mut col_potential = vec![0i64; cols + 1];
    let mut matched_row = vec![0usize; cols + 1];
    let mut previous_col = vec![0usize; cols + 1];

    for i in 1..=rows {
        matched_row[0] = i;
        let mut j0 = 0;
        let mut min_slack = vec![FORBIDDEN; cols + 1];
        let mut visited = vec![false; cols + 1];
        loop {
            visited[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = FORBIDDEN;
            let mut j1 = 0;
            for j in 1..=cols {
                if visited[j] {
                    continue;
                }
                let slack = cost(i0 - 1, j - 1) - row_potential[i0] - col_potential[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    previous_col[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }
            if delta >= FORBIDDEN {
                return None;
            }
            for j in 0..=cols {
                if visited[j] {
                    row_potential[matched_row[j]] += delta;
                    col_potential[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }
            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }
        // Walk the augmenting path back, flipping the matching.
        while j0 != 0 {
            let j1 = previous_col[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
        }
    }

    let mut total = 0usize;
    for j in 1..=cols {
        let i = matched_row[j];
        if i != 0 {
            if costs[i - 1][j - 1] == UNREACHABLE {
                return None;
            }
            total += costs[i - 1][j - 1];
        }
    }
    Some(total)
}
