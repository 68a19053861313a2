//! Collaborator seams for the planner.
//!
//! The planner never talks to a routing engine or an elevation service
//! directly. Concrete adapters (OSRM, OpenTopoData, test stubs) implement
//! these traits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Coordinate;
use crate::polyline::Polyline;

/// Travel mode understood by a cost provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Walk,
    Drive,
}

/// Duration/distance matrix indexed `[origin][destination]`.
///
/// `None` cells are pairs the provider could not answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTable {
    pub durations: Vec<Vec<Option<f64>>>,
    pub distances: Vec<Vec<Option<f64>>>,
}

impl CostTable {
    pub fn empty(origins: usize, destinations: usize) -> Self {
        Self {
            durations: vec![vec![None; destinations]; origins],
            distances: vec![vec![None; destinations]; origins],
        }
    }

    pub fn duration(&self, origin: usize, destination: usize) -> Option<f64> {
        self.durations
            .get(origin)
            .and_then(|row| row.get(destination))
            .copied()
            .flatten()
            .filter(|d| d.is_finite() && *d >= 0.0)
    }

    pub fn distance(&self, origin: usize, destination: usize) -> Option<f64> {
        self.distances
            .get(origin)
            .and_then(|row| row.get(destination))
            .copied()
            .flatten()
            .filter(|d| d.is_finite() && *d >= 0.0)
    }
}

/// A single routed point-to-point answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub duration_s: f64,
    pub distance_m: Option<f64>,
    pub geometry: Polyline,
}

/// Failure of an external collaborator call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned code {code}: {message}")]
    Api { code: String, message: String },

    #[error("no route between the requested points")]
    NoRoute,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("estimate is not finite")]
    NonFinite,

    #[error("request cancelled")]
    Cancelled,

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Provides travel durations, distances and geometries.
///
/// Implementations must be `Send + Sync`: the planner prefetches tables for
/// independent service points concurrently.
pub trait CostProvider: Send + Sync {
    /// Durations (seconds) and distances (metres) from every origin to every destination.
    fn table_query(
        &self,
        mode: TravelMode,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<CostTable, ProviderError>;

    /// Routed geometry, duration and distance for one pair.
    fn route_query(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<RouteResponse, ProviderError>;
}

/// Provides terrain elevations for a list of points.
pub trait ElevationProvider: Send + Sync {
    /// One entry per input point; `None` where the dataset has no value.
    fn elevation_profile(&self, points: &[Coordinate]) -> Result<Vec<Option<f64>>, ProviderError>;
}
