//! Elevation lookups for walking legs.
//!
//! Ascent/descent is a rider convenience; any failure here leaves the
//! leg's elevation fields unset.

use serde::Deserialize;

use crate::model::Coordinate;
use crate::traits::{ElevationProvider, ProviderError};

#[derive(Debug, Clone)]
pub struct ElevationConfig {
    pub base_url: String,
    /// Dataset name, e.g. `aster30m` or `srtm90m`.
    pub dataset: String,
    pub timeout_secs: u64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opentopodata.org".to_string(),
            dataset: "aster30m".to_string(),
            timeout_secs: 10,
        }
    }
}

/// OpenTopoData HTTP adapter.
#[derive(Debug, Clone)]
pub struct OpenTopoDataClient {
    config: ElevationConfig,
    client: reqwest::blocking::Client,
}

impl OpenTopoDataClient {
    pub fn new(config: ElevationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn lookup_url(&self, points: &[Coordinate]) -> String {
        let locations = points
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lat, p.lng))
            .collect::<Vec<_>>()
            .join("|");
        format!(
            "{}/v1/{}?locations={}",
            self.config.base_url, self.config.dataset, locations
        )
    }
}

impl ElevationProvider for OpenTopoDataClient {
    fn elevation_profile(&self, points: &[Coordinate]) -> Result<Vec<Option<f64>>, ProviderError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let body = self
            .client
            .get(self.lookup_url(points))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<ElevationResponse>())?;

        body.into_elevations()
    }
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: Option<String>,
    error: Option<String>,
    results: Option<Vec<ElevationResult>>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: Option<f64>,
}

impl ElevationResponse {
    fn into_elevations(self) -> Result<Vec<Option<f64>>, ProviderError> {
        if let Some(status) = self.status.filter(|s| s != "OK") {
            return Err(ProviderError::Api {
                code: status,
                message: self.error.unwrap_or_default(),
            });
        }
        let results = self
            .results
            .ok_or_else(|| ProviderError::Malformed("missing results".to_string()))?;
        Ok(results.into_iter().map(|r| r.elevation).collect())
    }
}

/// Total ascent and descent in whole metres.
///
/// Samples without a value are ignored; fewer than two usable samples give `None`.
pub fn ascent_descent(elevations: &[Option<f64>]) -> Option<(f64, f64)> {
    let valid: Vec<f64> = elevations
        .iter()
        .filter_map(|e| e.filter(|v| v.is_finite()))
        .collect();
    if valid.len() < 2 {
        return None;
    }

    let (ascent, descent) = valid.windows(2).fold((0.0, 0.0), |(up, down), pair| {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            (up + delta, down)
        } else {
            (up, down - delta)
        }
    });
    Some((ascent.round(), descent.round()))
}
