//! Haversine cost provider (fallback when OSRM is unavailable).
//!
//! Uses great-circle distance and an assumed speed per travel mode.
//! Less accurate than OSRM (ignores streets) but always available.

use crate::model::Coordinate;
use crate::polyline::Polyline;
use crate::traits::{CostProvider, CostTable, ProviderError, RouteResponse, TravelMode};

/// Assumed walking speed for closed-form estimates.
pub const DEFAULT_WALK_SPEED_KMH: f64 = 5.0;

/// Assumed city driving speed for closed-form estimates.
pub const DEFAULT_DRIVE_SPEED_KMH: f64 = 20.0;

/// Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in metres.
pub fn haversine_m(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Travel time in seconds for `distance_m` at `speed_kmh`.
pub fn seconds_at(distance_m: f64, speed_kmh: f64) -> f64 {
    (distance_m / 1000.0) / speed_kmh * 3600.0
}

/// Haversine-based cost provider.
///
/// Every query succeeds with a straight-line estimate; non-finite inputs
/// produce `None` cells rather than errors.
#[derive(Debug, Clone)]
pub struct HaversineProvider {
    pub walk_speed_kmh: f64,
    pub drive_speed_kmh: f64,
}

impl Default for HaversineProvider {
    fn default() -> Self {
        Self {
            walk_speed_kmh: DEFAULT_WALK_SPEED_KMH,
            drive_speed_kmh: DEFAULT_DRIVE_SPEED_KMH,
        }
    }
}

impl HaversineProvider {
    pub fn new(walk_speed_kmh: f64, drive_speed_kmh: f64) -> Self {
        Self {
            walk_speed_kmh,
            drive_speed_kmh,
        }
    }

    pub fn speed_kmh(&self, mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Walk => self.walk_speed_kmh,
            TravelMode::Drive => self.drive_speed_kmh,
        }
    }

    /// Straight-line `(duration_s, distance_m)`; `None` when not finite.
    pub fn estimate(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Option<(f64, f64)> {
        let distance = haversine_m(from, to);
        let duration = seconds_at(distance, self.speed_kmh(mode));
        (distance.is_finite() && duration.is_finite() && duration >= 0.0)
            .then_some((duration, distance))
    }
}

impl CostProvider for HaversineProvider {
    fn table_query(
        &self,
        mode: TravelMode,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<CostTable, ProviderError> {
        let mut table = CostTable::empty(origins.len(), destinations.len());
        for (i, from) in origins.iter().enumerate() {
            for (j, to) in destinations.iter().enumerate() {
                if let Some((duration, distance)) = self.estimate(mode, *from, *to) {
                    table.durations[i][j] = Some(duration);
                    table.distances[i][j] = Some(distance);
                }
            }
        }
        Ok(table)
    }

    fn route_query(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<RouteResponse, ProviderError> {
        let (duration_s, distance_m) = self
            .estimate(mode, from, to)
            .ok_or(ProviderError::NonFinite)?;
        Ok(RouteResponse {
            duration_s,
            distance_m: Some(distance_m),
            geometry: Polyline::straight(from, to),
        })
    }
}
