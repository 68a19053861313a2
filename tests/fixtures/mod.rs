//! Test fixtures for hotzone-planner.
//!
//! Provides realistic test data:
//! - Real Budapest locations (from OpenStreetMap)
//! - Builders for service points, zones and candidates

#![allow(dead_code)]

pub mod budapest_locations;

pub use budapest_locations::*;

use chrono::{TimeZone, Utc};
use hotzone_planner::model::{Candidate, Coordinate, DestinationZone, ServicePoint, ServicePointId};

/// A service point parked at `at` with one zone per entry of `zones`.
pub fn candidate_at(id: &str, at: &Location, zones: &[&Location]) -> Candidate {
    let owner = ServicePointId::from(id);
    let zones = zones
        .iter()
        .enumerate()
        .map(|(i, loc)| DestinationZone {
            owner: owner.clone(),
            sequence_index: i as u32 + 1,
            position: loc.coordinate(),
            radius_m: 360.0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        })
        .collect();
    Candidate::new(ServicePoint::new(id, format!("{id}-plate"), at.coordinate()), zones)
}

/// Same as [`candidate_at`] for raw coordinates.
pub fn candidate_xy(id: &str, at: (f64, f64), zones: &[(f64, f64)]) -> Candidate {
    let owner = ServicePointId::from(id);
    let zones = zones
        .iter()
        .enumerate()
        .map(|(i, &(lat, lng))| DestinationZone {
            owner: owner.clone(),
            sequence_index: i as u32 + 1,
            position: Coordinate::new(lat, lng),
            radius_m: 360.0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        })
        .collect();
    Candidate::new(ServicePoint::new(id, id, Coordinate::from(at)), zones)
}
