//! OSRM HTTP adapter for duration tables and routed legs.
//!
//! Every request walks the configured endpoint list once, in order. The
//! first successful answer wins; if all endpoints fail the last error is
//! returned and the caller falls back to a closed-form estimate.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::Coordinate;
use crate::polyline::Polyline;
use crate::traits::{CostProvider, CostTable, ProviderError, RouteResponse, TravelMode};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    /// Base URLs tried in order: primary first, then fallbacks.
    pub endpoints: Vec<String>,
    pub walk_profile: String,
    pub drive_profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://router.project-osrm.org".to_string(),
                "https://routing.openstreetmap.de".to_string(),
            ],
            walk_profile: "foot".to_string(),
            drive_profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

impl OsrmConfig {
    /// Single local endpoint, as used by the docker-backed tests.
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            endpoints: vec![base_url.into()],
            ..Self::default()
        }
    }

    pub fn profile(&self, mode: TravelMode) -> &str {
        match mode {
            TravelMode::Walk => &self.walk_profile,
            TravelMode::Drive => &self.drive_profile,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OsrmConfig {
        &self.config
    }

    fn table_path(
        &self,
        mode: TravelMode,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> String {
        let coords = origins
            .iter()
            .chain(destinations)
            .map(osrm_coordinate)
            .collect::<Vec<_>>()
            .join(";");
        let sources = (0..origins.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let targets = (origins.len()..origins.len() + destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "/table/v1/{}/{}?sources={}&destinations={}&annotations=duration,distance",
            self.config.profile(mode),
            coords,
            sources,
            targets
        )
    }

    fn route_path(&self, mode: TravelMode, from: Coordinate, to: Coordinate) -> String {
        format!(
            "/route/v1/{}/{};{}?overview=full&geometries=geojson&alternatives=false&steps=false",
            self.config.profile(mode),
            osrm_coordinate(&from),
            osrm_coordinate(&to)
        )
    }

    /// GET `path` against each endpoint in turn and decode the first success.
    fn fetch<T, F>(&self, path: &str, decode: F) -> Result<T, ProviderError>
    where
        F: Fn(reqwest::blocking::Response) -> Result<T, ProviderError>,
    {
        let mut last_error = ProviderError::NoEndpoints;
        for base in &self.config.endpoints {
            let url = format!("{}{}", base.trim_end_matches('/'), path);
            let attempt = self
                .client
                .get(&url)
                .send()
                .and_then(|resp| resp.error_for_status())
                .map_err(ProviderError::from)
                .and_then(&decode);
            match attempt {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(endpoint = %base, error = %err, "OSRM endpoint failed");
                    last_error = err;
                }
            }
        }
        warn!(error = %last_error, "all OSRM endpoints failed");
        Err(last_error)
    }
}

impl CostProvider for OsrmClient {
    fn table_query(
        &self,
        mode: TravelMode,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<CostTable, ProviderError> {
        if origins.is_empty() || destinations.is_empty() {
            return Ok(CostTable::empty(origins.len(), destinations.len()));
        }

        let path = self.table_path(mode, origins, destinations);
        self.fetch(&path, |resp| {
            resp.json::<OsrmTableResponse>()?
                .into_table(origins.len(), destinations.len())
        })
    }

    fn route_query(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<RouteResponse, ProviderError> {
        let path = self.route_path(mode, from, to);
        self.fetch(&path, |resp| resp.json::<OsrmRouteResponse>()?.into_route())
    }
}

fn osrm_coordinate(point: &Coordinate) -> String {
    format!("{:.6},{:.6}", point.lng, point.lat)
}

fn check_code(code: Option<String>, message: Option<String>) -> Result<(), ProviderError> {
    match code {
        Some(code) if code != "Ok" => Err(ProviderError::Api {
            code,
            message: message.unwrap_or_default(),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: Option<String>,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    fn into_table(self, origins: usize, destinations: usize) -> Result<CostTable, ProviderError> {
        check_code(self.code, self.message)?;
        let durations = self
            .durations
            .ok_or_else(|| ProviderError::Malformed("missing durations".to_string()))?;
        if durations.len() != origins || durations.iter().any(|row| row.len() != destinations) {
            return Err(ProviderError::Malformed(format!(
                "expected {}x{} durations",
                origins, destinations
            )));
        }
        let distances = self
            .distances
            .filter(|rows| {
                rows.len() == origins && rows.iter().all(|row| row.len() == destinations)
            })
            .unwrap_or_else(|| vec![vec![None; destinations]; origins]);

        Ok(CostTable {
            durations,
            distances,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    duration: f64,
    distance: Option<f64>,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`.
    coordinates: Vec<[f64; 2]>,
}

impl OsrmRouteResponse {
    fn into_route(self) -> Result<RouteResponse, ProviderError> {
        check_code(self.code, self.message)?;
        let route = self.routes.into_iter().next().ok_or(ProviderError::NoRoute)?;
        let points = route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinate::new(lat, lng))
            .collect();

        Ok(RouteResponse {
            duration_s: route.duration,
            distance_m: route.distance,
            geometry: Polyline::new(points),
        })
    }
}
