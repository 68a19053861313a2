//! Visiting-order solvers.
//!
//! Both solvers work purely on prefetched [`CostTables`]; they never touch
//! a collaborator. The first service point is always the one nearest to
//! the origin by access duration.
//!
//! - [`ExactSearch`]: memoized search over (visited mask, last position)
//!   states. Zone choice is folded into each transition, so the state space
//!   is `2^n x (zones + 1)` rather than growing with zones per vehicle.
//! - [`solve_greedy`]: nearest-next heuristic for instances above the exact limit.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::SolverKind;
use crate::tables::{CostTables, Position};

/// Masks are `u32`; keep well inside that and inside a sane runtime.
pub const MAX_EXACT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Largest candidate count (start included) solved exactly.
    pub exact_limit: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self { exact_limit: 8 }
    }
}

impl SolveOptions {
    pub fn effective_exact_limit(&self) -> usize {
        if self.exact_limit > MAX_EXACT_LIMIT {
            warn!(
                requested = self.exact_limit,
                max = MAX_EXACT_LIMIT,
                "exact limit capped"
            );
        }
        self.exact_limit.min(MAX_EXACT_LIMIT)
    }
}

/// One serviced candidate in a solved order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    pub candidate: usize,
    /// Global zone index.
    pub zone: usize,
    /// Access + transfer duration of this step.
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolvedOrder {
    pub visits: Vec<Visit>,
    pub total_cost: f64,
    pub solver: SolverKind,
}

impl SolvedOrder {
    /// Candidates that did not make it into the order.
    pub fn missing(&self, candidate_count: usize) -> Vec<usize> {
        (0..candidate_count)
            .filter(|c| !self.visits.iter().any(|v| v.candidate == *c))
            .collect()
    }
}

/// Candidate with the cheapest access from the origin; ties go to the first.
pub fn nearest_start(tables: &CostTables) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for candidate in 0..tables.candidate_count() {
        let Some(cost) = tables.access(Position::Origin, candidate) else {
            continue;
        };
        if best.is_none_or(|(_, best_cost)| cost < best_cost) {
            best = Some((candidate, cost));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Pick the solver by instance size and run it from the nearest start.
pub fn solve(tables: &CostTables, options: &SolveOptions) -> Option<SolvedOrder> {
    let start = nearest_start(tables)?;
    if tables.candidate_count() <= options.effective_exact_limit() {
        ExactSearch::new(tables).solve_from(start)
    } else {
        Some(solve_greedy(tables, start))
    }
}

/// Search state: which candidates are done and where the traveller stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchState {
    pub mask: u32,
    pub last: Position,
}

/// Cheapest completion from a state.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Completion {
    cost: f64,
    /// Next (candidate, zone) on the optimal completion; `None` when done
    /// or infeasible.
    next: Option<(usize, usize)>,
}

/// Exact memoized subset search. The memo table lives as long as the
/// search value, i.e. one solve call.
pub struct ExactSearch<'a> {
    tables: &'a CostTables,
    full_mask: u32,
    memo: HashMap<SearchState, Completion>,
}

impl<'a> ExactSearch<'a> {
    pub fn new(tables: &'a CostTables) -> Self {
        let n = tables.candidate_count().min(MAX_EXACT_LIMIT);
        Self {
            tables,
            full_mask: ((1u64 << n) - 1) as u32,
            memo: HashMap::new(),
        }
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    /// Optimal order that services `start` first.
    ///
    /// Returns `None` when no complete order has finite cost.
    pub fn solve_from(&mut self, start: usize) -> Option<SolvedOrder> {
        let tables = self.tables;
        if start >= tables.candidate_count() || tables.candidate_count() > MAX_EXACT_LIMIT {
            return None;
        }
        let start_mask = 1u32 << start;

        let mut best: Option<(usize, f64)> = None;
        for &zone in tables.zones_of(start) {
            let Some(step) = tables.step_cost(Position::Origin, zone) else {
                continue;
            };
            let rest = self.complete(SearchState {
                mask: start_mask,
                last: Position::Zone(zone),
            });
            let total = step + rest.cost;
            if total.is_finite() && best.is_none_or(|(_, cost)| total < cost) {
                best = Some((zone, total));
            }
        }
        let (first_zone, total_cost) = best?;

        let mut visits = vec![Visit {
            candidate: start,
            zone: first_zone,
            cost: tables.step_cost(Position::Origin, first_zone)?,
        }];
        let mut state = SearchState {
            mask: start_mask,
            last: Position::Zone(first_zone),
        };
        while let Some((candidate, zone)) = self.memo.get(&state).and_then(|c| c.next) {
            visits.push(Visit {
                candidate,
                zone,
                cost: tables.step_cost(state.last, zone)?,
            });
            state = SearchState {
                mask: state.mask | (1 << candidate),
                last: Position::Zone(zone),
            };
        }

        debug!(
            states = self.memo.len(),
            total_cost, "exact search finished"
        );
        Some(SolvedOrder {
            visits,
            total_cost,
            solver: SolverKind::Exact,
        })
    }

    fn complete(&mut self, state: SearchState) -> Completion {
        if let Some(done) = self.memo.get(&state) {
            return *done;
        }
        if state.mask == self.full_mask {
            let done = Completion {
                cost: 0.0,
                next: None,
            };
            self.memo.insert(state, done);
            return done;
        }

        let tables = self.tables;
        let mut best = Completion {
            cost: f64::INFINITY,
            next: None,
        };
        for candidate in 0..tables.candidate_count() {
            if state.mask & (1 << candidate) != 0 {
                continue;
            }
            for &zone in tables.zones_of(candidate) {
                let Some(step) = tables.step_cost(state.last, zone) else {
                    continue;
                };
                let rest = self.complete(SearchState {
                    mask: state.mask | (1 << candidate),
                    last: Position::Zone(zone),
                });
                let total = step + rest.cost;
                if total < best.cost {
                    best = Completion {
                        cost: total,
                        next: Some((candidate, zone)),
                    };
                }
            }
        }

        self.memo.insert(state, best);
        best
    }
}

/// Nearest-next heuristic starting at `start`.
///
/// At every step the cheapest remaining (candidate, zone) pair is taken;
/// ties go to the first in candidate then zone order. Candidates that
/// become unreachable are left out of the order (see [`SolvedOrder::missing`]).
pub fn solve_greedy(tables: &CostTables, start: usize) -> SolvedOrder {
    let n = tables.candidate_count();
    let mut done = vec![false; n];
    let mut visits = Vec::with_capacity(n);
    let mut position = Position::Origin;

    let cheapest_zone = |from: Position, candidate: usize| -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for &zone in tables.zones_of(candidate) {
            if let Some(cost) = tables.step_cost(from, zone) {
                if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                    best = Some((zone, cost));
                }
            }
        }
        best
    };

    if let Some(first) = done.get_mut(start) {
        *first = true;
        if let Some((zone, cost)) = cheapest_zone(position, start) {
            visits.push(Visit {
                candidate: start,
                zone,
                cost,
            });
            position = Position::Zone(zone);
        }
    }

    while visits.len() < n {
        let mut best: Option<(usize, usize, f64)> = None;
        for candidate in (0..n).filter(|&c| !done[c]) {
            if let Some((zone, cost)) = cheapest_zone(position, candidate) {
                if best.is_none_or(|(_, _, best_cost)| cost < best_cost) {
                    best = Some((candidate, zone, cost));
                }
            }
        }
        let Some((candidate, zone, cost)) = best else {
            break;
        };
        done[candidate] = true;
        visits.push(Visit {
            candidate,
            zone,
            cost,
        });
        position = Position::Zone(zone);
    }

    let total_cost = visits.iter().map(|v| v.cost).sum();
    debug!(visited = visits.len(), total_cost, "greedy search finished");
    SolvedOrder {
        visits,
        total_cost,
        solver: SolverKind::Greedy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two vehicles with one zone each.
    ///
    /// Rows: origin, zone0 (of V0), zone1 (of V1). Columns: V0, V1.
    fn two_vehicles() -> CostTables {
        CostTables::from_parts(
            vec![
                vec![Some(100.0), Some(120.0)],
                vec![Some(0.0), Some(50.0)],
                vec![Some(80.0), Some(0.0)],
            ],
            vec![vec![Some(200.0)], vec![Some(300.0)]],
        )
    }

    #[test]
    fn nearest_start_prefers_cheapest_access() {
        assert_eq!(nearest_start(&two_vehicles()), Some(0));
    }

    #[test]
    fn nearest_start_ties_go_to_first() {
        let tables = CostTables::from_parts(
            vec![vec![Some(10.0), Some(10.0)], vec![None, None], vec![None, None]],
            vec![vec![Some(1.0)], vec![Some(1.0)]],
        );
        assert_eq!(nearest_start(&tables), Some(0));
    }

    #[test]
    fn nearest_start_skips_missing_access() {
        let tables = CostTables::from_parts(
            vec![vec![None, Some(500.0)], vec![None, None], vec![None, None]],
            vec![vec![Some(1.0)], vec![Some(1.0)]],
        );
        assert_eq!(nearest_start(&tables), Some(1));
    }

    #[test]
    fn exact_matches_hand_computation() {
        let tables = two_vehicles();
        let order = ExactSearch::new(&tables).solve_from(0).unwrap();
        // 100 + 200, then 50 + 300
        assert_eq!(order.total_cost, 650.0);
        assert_eq!(
            order.visits.iter().map(|v| (v.candidate, v.zone)).collect::<Vec<_>>(),
            vec![(0, 0), (1, 1)]
        );
        assert_eq!(order.visits[0].cost, 300.0);
        assert_eq!(order.visits[1].cost, 350.0);
    }

    #[test]
    fn exact_picks_the_cheaper_zone() {
        // V0 has two zones; the far one is cheaper to drive to but makes
        // reaching V1 expensive.
        let tables = CostTables::from_parts(
            vec![
                vec![Some(10.0), Some(10.0)],
                vec![Some(0.0), Some(20.0)],
                vec![Some(0.0), Some(500.0)],
                vec![Some(0.0), Some(0.0)],
            ],
            vec![vec![Some(100.0), Some(60.0)], vec![Some(10.0)]],
        );
        let order = ExactSearch::new(&tables).solve_from(0).unwrap();
        assert_eq!(order.visits[0].zone, 0);
        assert_eq!(order.total_cost, 10.0 + 100.0 + 20.0 + 10.0);

        let greedy = solve_greedy(&tables, 0);
        assert_eq!(greedy.visits[0].zone, 1);
        assert!(order.total_cost <= greedy.total_cost);
    }

    #[test]
    fn exact_skips_infinite_transitions() {
        // V1 is only reachable from its own zone, so no full order exists.
        let tables = CostTables::from_parts(
            vec![vec![Some(10.0), None], vec![Some(0.0), None], vec![Some(0.0), Some(0.0)]],
            vec![vec![Some(10.0)], vec![Some(10.0)]],
        );
        assert!(ExactSearch::new(&tables).solve_from(0).is_none());
    }

    #[test]
    fn exact_memo_is_bounded_by_state_space() {
        let n = 6;
        let zones_per = 2;
        let rows = 1 + n * zones_per;
        let access = (0..rows)
            .map(|r| (0..n).map(|c| Some(((r * 7 + c * 13) % 17) as f64 + 1.0)).collect())
            .collect();
        let transfer = (0..n)
            .map(|c| (0..zones_per).map(|z| Some(((c * 5 + z * 3) % 11) as f64 + 1.0)).collect())
            .collect();
        let tables = CostTables::from_parts(access, transfer);
        let mut search = ExactSearch::new(&tables);
        let order = search.solve_from(0).unwrap();
        assert_eq!(order.visits.len(), n);
        assert!(search.memo_len() <= (1 << n) * (1 + n * zones_per));
    }

    #[test]
    fn greedy_takes_cheapest_next_step() {
        let tables = CostTables::from_parts(
            vec![
                vec![Some(10.0), Some(50.0), Some(50.0)],
                vec![Some(0.0), Some(30.0), Some(5.0)],
                vec![Some(0.0), Some(0.0), Some(40.0)],
                vec![Some(0.0), Some(40.0), Some(0.0)],
            ],
            vec![vec![Some(10.0)], vec![Some(10.0)], vec![Some(10.0)]],
        );
        let order = solve_greedy(&tables, 0);
        assert_eq!(
            order.visits.iter().map(|v| v.candidate).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );
        assert_eq!(order.total_cost, 20.0 + 15.0 + 50.0);
    }

    #[test]
    fn greedy_leaves_out_unreachable() {
        let tables = CostTables::from_parts(
            vec![vec![Some(10.0), None], vec![Some(0.0), None]],
            vec![vec![Some(10.0)], vec![Some(10.0)]],
        );
        let order = solve_greedy(&tables, 0);
        assert_eq!(order.visits.len(), 1);
        assert_eq!(order.missing(2), vec![1]);
    }

    #[test]
    fn solve_switches_to_greedy_above_limit() {
        let tables = two_vehicles();
        let exact = solve(&tables, &SolveOptions::default()).unwrap();
        assert_eq!(exact.solver, SolverKind::Exact);
        let greedy = solve(&tables, &SolveOptions { exact_limit: 1 }).unwrap();
        assert_eq!(greedy.solver, SolverKind::Greedy);
    }

    #[test]
    fn exact_limit_is_capped() {
        let options = SolveOptions { exact_limit: 64 };
        assert_eq!(options.effective_exact_limit(), MAX_EXACT_LIMIT);
    }
}
