//! Leg cost resolution.
//!
//! Access legs (current position to a vehicle) walk by default and may be
//! replaced by a transit path when it is clearly faster. Transfer legs
//! (vehicle to zone) always drive. Each leg is costed by an ordered list of
//! strategies: the cost provider first, then a straight-line estimate, so a
//! provider outage never fails a plan on its own.
//!
//! A resolver lives for exactly one planning run; its cache is dropped with it.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::elevation::ascent_descent;
use crate::haversine::{HaversineProvider, haversine_m, seconds_at};
use crate::model::{Coordinate, LegCost, LegMode};
use crate::polyline::Polyline;
use crate::traits::{CostProvider, ElevationProvider, TravelMode};
use crate::transit::{DEFAULT_MAX_WALK_ACCESS_M, TransitGraph};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Closed-form walking speed, also the transit comparison baseline.
    pub walk_speed_kmh: f64,
    /// Closed-form driving speed.
    pub drive_speed_kmh: f64,
    pub transit_enabled: bool,
    /// Transit replaces walking only below `transit_margin` x baseline walk time.
    pub transit_margin: f64,
    pub max_walk_access_m: f64,
    pub elevation_enabled: bool,
    pub elevation_max_samples: usize,
    /// Decimal places of the coordinate cache key.
    pub cache_precision: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            walk_speed_kmh: 5.0,
            drive_speed_kmh: 20.0,
            transit_enabled: true,
            transit_margin: 0.90,
            max_walk_access_m: DEFAULT_MAX_WALK_ACCESS_M,
            elevation_enabled: true,
            elevation_max_samples: 50,
            cache_precision: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LegError {
    #[error("planning cancelled")]
    Cancelled,

    #[error("no cost obtainable from {from} to {to}")]
    Unobtainable { from: Coordinate, to: Coordinate },
}

/// Transit wins only when strictly below `margin` times the walking baseline.
pub fn prefer_transit(transit_s: f64, baseline_walk_s: f64, margin: f64) -> bool {
    transit_s.is_finite() && transit_s < margin * baseline_walk_s
}

/// Ways to cost a routed leg, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Provider,
    StraightLine,
}

const LEG_STRATEGIES: [Strategy; 2] = [Strategy::Provider, Strategy::StraightLine];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LegKind {
    Access,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LegKey {
    kind: LegKind,
    from: (i64, i64),
    to: (i64, i64),
}

pub struct LegCostResolver<'a> {
    provider: &'a dyn CostProvider,
    elevation: Option<&'a dyn ElevationProvider>,
    transit: Option<&'a TransitGraph>,
    config: &'a ResolverConfig,
    estimator: HaversineProvider,
    cache: HashMap<LegKey, LegCost>,
    cancel: CancelToken,
}

impl<'a> LegCostResolver<'a> {
    pub fn new(provider: &'a dyn CostProvider, config: &'a ResolverConfig) -> Self {
        Self {
            provider,
            elevation: None,
            transit: None,
            config,
            estimator: HaversineProvider::new(config.walk_speed_kmh, config.drive_speed_kmh),
            cache: HashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_elevation(mut self, elevation: Option<&'a dyn ElevationProvider>) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_transit(mut self, transit: Option<&'a TransitGraph>) -> Self {
        self.transit = transit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        self.config
    }

    pub fn provider(&self) -> &'a dyn CostProvider {
        self.provider
    }

    /// Closed-form estimator used when the provider has no answer.
    pub fn estimator(&self) -> &HaversineProvider {
        &self.estimator
    }

    /// The transit graph, if present and enabled.
    pub fn transit(&self) -> Option<&'a TransitGraph> {
        self.transit.filter(|_| self.config.transit_enabled)
    }

    pub fn check_cancelled(&self) -> Result<(), LegError> {
        if self.cancel.is_cancelled() {
            Err(LegError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn cached_legs(&self) -> usize {
        self.cache.len()
    }

    /// Straight-line walking time, the yardstick transit is measured against.
    pub fn baseline_walk_s(&self, from: Coordinate, to: Coordinate) -> f64 {
        seconds_at(haversine_m(from, to), self.config.walk_speed_kmh)
    }

    /// Transit leg for this pair if the substitution rule selects it.
    pub fn transit_alternative(&self, from: Coordinate, to: Coordinate) -> Option<LegCost> {
        let graph = self.transit()?;
        let plan = graph.shortest_path(from, to, self.config.max_walk_access_m)?;
        let baseline = self.baseline_walk_s(from, to);
        if !prefer_transit(plan.total_duration_s, baseline, self.config.transit_margin) {
            return None;
        }
        debug!(
            transit_s = plan.total_duration_s,
            baseline_s = baseline,
            "transit replaces walking"
        );
        Some(plan.into_leg_cost())
    }

    /// Leg from the current position to a vehicle.
    pub fn resolve_access_leg(
        &mut self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<LegCost, LegError> {
        self.check_cancelled()?;
        let key = self.key(LegKind::Access, from, to);
        if let Some(leg) = self.cache.get(&key) {
            return Ok(leg.clone());
        }

        let leg = match self.transit_alternative(from, to) {
            Some(transit) => transit,
            None => {
                let mut walk = self.routed(TravelMode::Walk, from, to)?;
                self.annotate_elevation(&mut walk);
                walk
            }
        };

        self.cache.insert(key, leg.clone());
        Ok(leg)
    }

    /// Leg from a vehicle to one of its zones.
    pub fn resolve_transfer_leg(
        &mut self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<LegCost, LegError> {
        self.check_cancelled()?;
        let key = self.key(LegKind::Transfer, from, to);
        if let Some(leg) = self.cache.get(&key) {
            return Ok(leg.clone());
        }

        let leg = self.routed(TravelMode::Drive, from, to)?;
        self.cache.insert(key, leg.clone());
        Ok(leg)
    }

    fn key(&self, kind: LegKind, from: Coordinate, to: Coordinate) -> LegKey {
        LegKey {
            kind,
            from: from.rounded_key(self.config.cache_precision),
            to: to.rounded_key(self.config.cache_precision),
        }
    }

    fn routed(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<LegCost, LegError> {
        let leg_mode = match mode {
            TravelMode::Walk => LegMode::Walk,
            TravelMode::Drive => LegMode::Drive,
        };

        for strategy in LEG_STRATEGIES {
            self.check_cancelled()?;
            let attempt = match strategy {
                Strategy::Provider => self
                    .provider
                    .route_query(mode, from, to)
                    .map_err(|err| {
                        debug!(?mode, error = %err, "routing failed, trying next strategy")
                    })
                    .ok()
                    .filter(|route| route.duration_s.is_finite() && route.duration_s >= 0.0)
                    .map(|route| {
                        LegCost::new(
                            leg_mode,
                            route.duration_s,
                            route.distance_m.filter(|d| d.is_finite()),
                            route.geometry.anchored(from, to),
                        )
                    }),
                Strategy::StraightLine => self
                    .estimator
                    .estimate(mode, from, to)
                    .map(|(duration_s, distance_m)| {
                        LegCost::new(
                            leg_mode,
                            duration_s,
                            Some(distance_m),
                            Polyline::straight(from, to),
                        )
                    }),
            };
            if let Some(leg) = attempt {
                return Ok(leg);
            }
        }

        Err(LegError::Unobtainable { from, to })
    }

    fn annotate_elevation(&self, leg: &mut LegCost) {
        if !self.config.elevation_enabled || leg.mode != LegMode::Walk {
            return;
        }
        let Some(elevation) = self.elevation else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        let samples = leg.geometry.sample(self.config.elevation_max_samples);
        if samples.len() < 2 {
            return;
        }
        match elevation.elevation_profile(&samples) {
            Ok(profile) => {
                if let Some((gain, loss)) = ascent_descent(&profile) {
                    leg.elevation_gain_m = Some(gain);
                    leg.elevation_loss_m = Some(loss);
                }
            }
            Err(err) => debug!(error = %err, "elevation lookup failed"),
        }
    }
}
