//! Planning data model.
//!
//! These are the strict types the planner core works with. Loosely-typed
//! vehicle feeds are normalized into them before they reach the optimizer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::polyline::Polyline;
use crate::transit::TransitSummary;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Fixed-precision key used to deduplicate and cache by position.
    pub fn rounded_key(&self, decimals: u32) -> (i64, i64) {
        let scale = 10f64.powi(decimals as i32);
        (
            (self.lat * scale).round() as i64,
            (self.lng * scale).round() as i64,
        )
    }

    /// True when both coordinates agree within `tolerance` degrees.
    pub fn approx_eq(&self, other: &Coordinate, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance && (self.lng - other.lng).abs() <= tolerance
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Identifier of a service point (a vehicle in the carsharing feed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServicePointId(pub String);

impl ServicePointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServicePointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ServicePointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A position that must be visited exactly once per plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePoint {
    pub id: ServicePointId,
    /// Rider-facing label, e.g. a licence plate.
    pub label: String,
    pub position: Coordinate,
}

impl ServicePoint {
    pub fn new(id: impl Into<String>, label: impl Into<String>, position: Coordinate) -> Self {
        Self {
            id: ServicePointId::new(id),
            label: label.into(),
            position,
        }
    }
}

/// Allowed destination-zone radius range in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusBounds {
    pub min_m: f64,
    pub max_m: f64,
    /// Radius used when the requested value is not a number.
    pub default_m: f64,
}

impl Default for RadiusBounds {
    fn default() -> Self {
        Self {
            min_m: 300.0,
            max_m: 400.0,
            default_m: 360.0,
        }
    }
}

impl RadiusBounds {
    pub fn new(min_m: f64, max_m: f64, default_m: f64) -> Self {
        Self {
            min_m,
            max_m,
            default_m,
        }
    }

    /// Clamp a requested radius into `[min_m, max_m]`.
    pub fn clamp(&self, requested_m: f64) -> f64 {
        let (lo, hi) = if self.min_m <= self.max_m {
            (self.min_m, self.max_m)
        } else {
            (self.max_m, self.min_m)
        };
        let value = if requested_m.is_nan() {
            self.default_m
        } else {
            requested_m
        };
        value.clamp(lo, hi)
    }
}

/// A candidate target location for a service point. Only one zone per
/// service point is serviced in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationZone {
    pub owner: ServicePointId,
    /// 1-based, stable per owner across additions.
    pub sequence_index: u32,
    pub position: Coordinate,
    pub radius_m: f64,
    pub created_at: DateTime<Utc>,
}

/// Input to a planning run: one service point with its pending zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub service_point: ServicePoint,
    pub zones: Vec<DestinationZone>,
}

impl Candidate {
    pub fn new(service_point: ServicePoint, zones: Vec<DestinationZone>) -> Self {
        Self {
            service_point,
            zones,
        }
    }

    pub fn id(&self) -> &ServicePointId {
        &self.service_point.id
    }
}

/// How a leg is travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegMode {
    Walk,
    Drive,
    Transit,
}

/// Resolved cost of a single access or transfer leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegCost {
    pub mode: LegMode,
    pub duration_s: f64,
    pub distance_m: Option<f64>,
    /// Ordered geometry, first/last point equal the leg's endpoints.
    pub geometry: Polyline,
    pub elevation_gain_m: Option<f64>,
    pub elevation_loss_m: Option<f64>,
    /// Present only for transit legs.
    pub transit: Option<TransitSummary>,
}

impl LegCost {
    pub fn new(
        mode: LegMode,
        duration_s: f64,
        distance_m: Option<f64>,
        geometry: Polyline,
    ) -> Self {
        Self {
            mode,
            duration_s: duration_s.max(0.0),
            distance_m: distance_m.map(|m| m.max(0.0)),
            geometry,
            elevation_gain_m: None,
            elevation_loss_m: None,
            transit: None,
        }
    }
}

/// One serviced vehicle in an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based position in the itinerary.
    pub order_index: usize,
    pub service_point: ServicePoint,
    pub zone: DestinationZone,
    pub access_leg: LegCost,
    pub transfer_leg: LegCost,
}

/// Which algorithm produced the visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Exact,
    Greedy,
}

/// Non-fatal findings surfaced alongside a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The service point has no destination zone and was skipped.
    NoZones { service_point: ServicePointId },
    /// No access or transfer cost could be obtained; the service point was dropped.
    Unreachable { service_point: ServicePointId },
}

/// Final ordered plan with aggregated costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub steps: Vec<PlanStep>,
    pub total_duration_s: f64,
    pub total_access_duration_s: f64,
    pub total_transfer_duration_s: f64,
    /// Service points in visiting order; each appears in exactly one step.
    pub service_points_used: Vec<ServicePointId>,
    pub solver: SolverKind,
    pub diagnostics: Vec<Diagnostic>,
}
