//! Polyline representation for leg geometries.
//!
//! Geometries are stored as decoded coordinate sequences. Provider-specific
//! encodings (OSRM GeoJSON `[lng, lat]` pairs) are converted at the adapter
//! boundary, not within the planner core.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_m;
use crate::model::Coordinate;

/// A leg geometry as an ordered list of coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Two-point straight segment, used when no routed geometry exists.
    pub fn straight(from: Coordinate, to: Coordinate) -> Self {
        Self {
            points: vec![from, to],
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<Coordinate> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }

    /// Force the endpoints to the leg's logical from/to coordinates.
    ///
    /// Routing engines snap to the road network, so their first and last
    /// vertices can sit metres away from the requested points. Geometries
    /// with fewer than two points are replaced by a straight segment.
    pub fn anchored(mut self, from: Coordinate, to: Coordinate) -> Self {
        if self.points.len() < 2 {
            return Self::straight(from, to);
        }
        self.points[0] = from;
        let last = self.points.len() - 1;
        self.points[last] = to;
        self
    }

    /// Sum of great-circle segment lengths in metres.
    pub fn length_m(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_m(pair[0], pair[1]))
            .sum()
    }

    /// Pick at most `max_points` evenly spaced vertices, always keeping the
    /// first and last one.
    pub fn sample(&self, max_points: usize) -> Vec<Coordinate> {
        let len = self.points.len();
        if len < 2 || max_points < 2 {
            return self.points.iter().take(max_points.min(len)).copied().collect();
        }
        let count = max_points.min(len);
        (0..count)
            .map(|i| self.points[i * (len - 1) / (count - 1)])
            .collect()
    }
}
