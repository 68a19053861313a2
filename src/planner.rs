//! Planning entry point.
//!
//! [`RoutePlanner::plan_route`] runs the whole pipeline for one request:
//! normalize candidates, prefetch cost tables, drop unreachable service
//! points, search an order, resolve the chosen legs and assemble the
//! itinerary. Nothing is kept between calls except the shared, read-only
//! transit graph.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::PlannerConfig;
use crate::itinerary::{ResolvedStep, assemble};
use crate::model::{
    Candidate, Coordinate, DestinationZone, Diagnostic, Itinerary, ServicePointId,
};
use crate::resolver::{LegCostResolver, LegError};
use crate::solver::{SolveOptions, SolvedOrder, nearest_start, solve, solve_greedy};
use crate::tables::CostTables;
use crate::traits::{CostProvider, ElevationProvider};
use crate::transit::TransitGraph;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningFailure {
    /// No service point has a pending destination zone.
    #[error("no service point has a pending destination zone")]
    NoCandidates,

    #[error("origin position is not available")]
    MissingOrigin,

    #[error("no feasible visiting order")]
    NoFeasiblePlan { diagnostics: Vec<Diagnostic> },

    #[error("planning cancelled")]
    Cancelled,
}

pub struct RoutePlanner {
    provider: Arc<dyn CostProvider>,
    elevation: Option<Arc<dyn ElevationProvider>>,
    transit: Option<Arc<TransitGraph>>,
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(provider: Arc<dyn CostProvider>, config: PlannerConfig) -> Self {
        Self {
            provider,
            elevation: None,
            transit: None,
            config,
        }
    }

    pub fn with_elevation(mut self, elevation: Arc<dyn ElevationProvider>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Share a transit graph; without one, access legs only walk.
    pub fn with_transit(mut self, graph: Arc<TransitGraph>) -> Self {
        self.transit = Some(graph);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan_route(
        &self,
        origin: Option<Coordinate>,
        candidates: &[Candidate],
    ) -> Result<Itinerary, PlanningFailure> {
        self.plan_route_with_cancel(origin, candidates, &CancelToken::new())
    }

    /// Like [`plan_route`](Self::plan_route), stopping early once `cancel`
    /// fires. A cancelled run returns [`PlanningFailure::Cancelled`] and
    /// nothing else.
    pub fn plan_route_with_cancel(
        &self,
        origin: Option<Coordinate>,
        candidates: &[Candidate],
        cancel: &CancelToken,
    ) -> Result<Itinerary, PlanningFailure> {
        let mut diagnostics = Vec::new();
        let usable = normalize(candidates, &mut diagnostics);
        if usable.is_empty() {
            return Err(PlanningFailure::NoCandidates);
        }
        let origin = origin
            .filter(Coordinate::is_finite)
            .ok_or(PlanningFailure::MissingOrigin)?;

        let mut resolver = LegCostResolver::new(self.provider.as_ref(), &self.config.resolver)
            .with_elevation(self.elevation.as_deref())
            .with_transit(self.transit.as_deref())
            .with_cancel(cancel.clone());

        let tables = CostTables::prefetch(&resolver, origin, &usable)
            .map_err(|e| leg_failure(e, &diagnostics))?;

        let reachable: Vec<usize> = (0..usable.len())
            .filter(|&c| {
                let ok = tables.is_reachable(c);
                if !ok {
                    warn!(service_point = %usable[c].id(), "service point unreachable, dropped");
                    diagnostics.push(Diagnostic::Unreachable {
                        service_point: usable[c].id().clone(),
                    });
                }
                ok
            })
            .collect();
        if reachable.is_empty() {
            return Err(PlanningFailure::NoFeasiblePlan { diagnostics });
        }
        let tables = tables.retain_candidates(&reachable);
        let usable: Vec<&Candidate> = reachable.iter().map(|&c| &usable[c]).collect();

        let order = search(&tables, &self.config.solve, &usable, &mut diagnostics)?;
        if cancel.is_cancelled() {
            return Err(PlanningFailure::Cancelled);
        }

        let mut position = origin;
        let mut steps = Vec::with_capacity(order.visits.len());
        for visit in &order.visits {
            let candidate = usable[visit.candidate];
            let zone = &candidate.zones[tables.zone(visit.zone).slot];
            let access_leg = resolver
                .resolve_access_leg(position, candidate.service_point.position)
                .map_err(|e| leg_failure(e, &diagnostics))?;
            let transfer_leg = resolver
                .resolve_transfer_leg(candidate.service_point.position, zone.position)
                .map_err(|e| leg_failure(e, &diagnostics))?;
            position = zone.position;
            steps.push(ResolvedStep {
                service_point: candidate.service_point.clone(),
                zone: zone.clone(),
                access_leg,
                transfer_leg,
            });
        }
        if cancel.is_cancelled() {
            return Err(PlanningFailure::Cancelled);
        }

        let itinerary = assemble(steps, order.solver, diagnostics);
        info!(
            solver = ?itinerary.solver,
            service_points = itinerary.steps.len(),
            total_s = itinerary.total_duration_s,
            cached_legs = resolver.cached_legs(),
            "route planned"
        );
        Ok(itinerary)
    }
}

/// Keep candidates with at least one zone they actually own.
///
/// Repeated service point ids collapse into the first occurrence, which
/// takes over the zones of the later ones.
fn normalize(candidates: &[Candidate], diagnostics: &mut Vec<Diagnostic>) -> Vec<Candidate> {
    let mut usable: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut slots: HashMap<&ServicePointId, usize> = HashMap::new();
    for candidate in candidates {
        let zones = owned_zones(candidate);
        match slots.get(candidate.id()) {
            Some(&slot) => {
                warn!(
                    service_point = %candidate.id(),
                    zones = zones.len(),
                    "duplicate service point, merging its zones"
                );
                usable[slot].zones.extend(zones);
            }
            None => {
                slots.insert(candidate.id(), usable.len());
                usable.push(Candidate::new(candidate.service_point.clone(), zones));
            }
        }
    }

    usable.retain(|candidate| {
        if candidate.zones.is_empty() {
            debug!(service_point = %candidate.id(), "no zones, skipped");
            diagnostics.push(Diagnostic::NoZones {
                service_point: candidate.id().clone(),
            });
        }
        !candidate.zones.is_empty()
    });
    usable
}

fn owned_zones(candidate: &Candidate) -> Vec<DestinationZone> {
    let zones: Vec<DestinationZone> = candidate
        .zones
        .iter()
        .filter(|zone| zone.owner == *candidate.id())
        .cloned()
        .collect();
    if zones.len() < candidate.zones.len() {
        warn!(
            service_point = %candidate.id(),
            dropped = candidate.zones.len() - zones.len(),
            "ignoring zones owned by another service point"
        );
    }
    zones
}

/// Solve, falling back to the greedy order when no complete order exists.
/// Service points the order leaves out are reported as unreachable.
fn search(
    tables: &CostTables,
    options: &SolveOptions,
    candidates: &[&Candidate],
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<SolvedOrder, PlanningFailure> {
    let order = match solve(tables, options) {
        Some(order) => order,
        None => {
            let start = nearest_start(tables).ok_or_else(|| PlanningFailure::NoFeasiblePlan {
                diagnostics: diagnostics.clone(),
            })?;
            warn!("no complete order, keeping the greedy partial order");
            solve_greedy(tables, start)
        }
    };
    if order.visits.is_empty() {
        return Err(PlanningFailure::NoFeasiblePlan {
            diagnostics: diagnostics.clone(),
        });
    }
    for missing in order.missing(tables.candidate_count()) {
        warn!(service_point = %candidates[missing].id(), "service point left out of the order");
        diagnostics.push(Diagnostic::Unreachable {
            service_point: candidates[missing].id().clone(),
        });
    }
    Ok(order)
}

fn leg_failure(err: LegError, diagnostics: &[Diagnostic]) -> PlanningFailure {
    match err {
        LegError::Cancelled => PlanningFailure::Cancelled,
        LegError::Unobtainable { from, to } => {
            warn!(%from, %to, "chosen leg became unobtainable");
            PlanningFailure::NoFeasiblePlan {
                diagnostics: diagnostics.to_vec(),
            }
        }
    }
}
