//! Static transit graph and walking-access shortest paths.
//!
//! The graph is timetable-free: edges carry an estimated ride time in
//! seconds, built offline from GTFS. It answers "what does it cost to walk
//! to a stop near A, ride, and walk from a stop near B", which the leg
//! resolver compares against plain walking.
//!
//! The graph is read-only once built and is shared between planning runs.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::haversine::haversine_m;
use crate::model::{Coordinate, LegCost, LegMode};
use crate::polyline::Polyline;

/// Walking speed used for stop access, ~4.5 km/h.
pub const DEFAULT_WALK_SPEED_MPS: f64 = 1.25;

/// How many nearby stops are considered at each end.
pub const DEFAULT_NEAREST_K: usize = 6;

/// Default walking radius around each endpoint when looking for stops.
pub const DEFAULT_MAX_WALK_ACCESS_M: f64 = 900.0;

#[derive(Debug, Error)]
pub enum TransitGraphError {
    #[error("failed to read transit graph: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse transit graph: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitStop {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub position: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitEdge {
    pub from: usize,
    pub to: usize,
    pub weight_s: f64,
    /// Lines (routes) serving this edge; empty when unknown.
    pub lines: BTreeSet<String>,
}

impl TransitEdge {
    /// Lexicographically first non-empty line label.
    pub fn primary_line(&self) -> Option<&str> {
        self.lines.iter().find(|l| !l.is_empty()).map(String::as_str)
    }
}

/// A stop near a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyStop {
    pub index: usize,
    pub distance_m: f64,
}

/// Consecutive edges ridden on the same primary line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitLegSummary {
    pub line: Option<String>,
    pub from_stop: String,
    pub to_stop: String,
    /// Number of edges ridden on this leg.
    pub stops: usize,
}

/// Rider-facing description of a transit access leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitSummary {
    pub start_stop: String,
    pub end_stop: String,
    pub stop_count: usize,
    /// Every line used, sorted and deduplicated.
    pub lines: Vec<String>,
    pub legs: Vec<TransitLegSummary>,
}

/// Result of [`TransitGraph::shortest_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransitPlan {
    /// Walk to the first stop + ride + walk from the last stop.
    pub total_duration_s: f64,
    /// Stop indices in riding order.
    pub stop_chain: Vec<usize>,
    /// origin, stops..., destination as straight segments.
    pub geometry: Polyline,
    pub summary: TransitSummary,
}

impl TransitPlan {
    pub fn into_leg_cost(self) -> LegCost {
        let mut leg = LegCost::new(LegMode::Transit, self.total_duration_s, None, self.geometry);
        leg.transit = Some(self.summary);
        leg
    }
}

#[derive(Debug, Deserialize)]
struct RawGraph {
    stops: Vec<RawStop>,
    edges: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
struct RawStop {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    name: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    from: i64,
    to: i64,
    #[serde(default, rename = "weightSeconds", alias = "w", alias = "weight_seconds")]
    weight: Option<f64>,
    #[serde(default)]
    lines: Option<Vec<String>>,
    #[serde(default)]
    line: Option<String>,
    #[serde(default)]
    route: Option<String>,
}

impl RawEdge {
    fn labels(self) -> BTreeSet<String> {
        match (self.lines, self.line, self.route) {
            (Some(lines), _, _) => lines.into_iter().filter(|l| !l.is_empty()).collect(),
            (None, Some(line), _) | (None, None, Some(line)) if !line.is_empty() => {
                BTreeSet::from([line])
            }
            _ => BTreeSet::new(),
        }
    }
}

#[derive(Serialize)]
struct GraphFile<'a> {
    stops: Vec<StopRecord<'a>>,
    edges: Vec<EdgeRecord<'a>>,
}

#[derive(Serialize)]
struct StopRecord<'a> {
    id: &'a str,
    name: &'a str,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct EdgeRecord<'a> {
    from: usize,
    to: usize,
    #[serde(rename = "weightSeconds")]
    weight_s: f64,
    lines: &'a BTreeSet<String>,
}

/// Directed stop graph with scalar travel-time weights.
#[derive(Debug, Clone)]
pub struct TransitGraph {
    stops: Vec<TransitStop>,
    adjacency: Vec<Vec<TransitEdge>>,
    walk_speed_mps: f64,
    nearest_k: usize,
}

impl TransitGraph {
    /// Build a graph, skipping edges with out-of-range stops or invalid weights.
    ///
    /// Stops are addressed by their position in `stops`; each stop's `index`
    /// is rewritten to match.
    pub fn new(mut stops: Vec<TransitStop>, edges: Vec<TransitEdge>) -> Self {
        let mut renumbered = 0usize;
        for (slot, stop) in stops.iter_mut().enumerate() {
            if stop.index != slot {
                stop.index = slot;
                renumbered += 1;
            }
        }
        if renumbered > 0 {
            debug!(renumbered, "transit stop indices renumbered to their positions");
        }

        let mut adjacency: Vec<Vec<TransitEdge>> = vec![Vec::new(); stops.len()];
        let mut skipped = 0usize;
        for edge in edges {
            let valid = edge.from < stops.len()
                && edge.to < stops.len()
                && edge.weight_s.is_finite()
                && edge.weight_s >= 0.0;
            if !valid {
                skipped += 1;
                continue;
            }
            adjacency[edge.from].push(edge);
        }
        if skipped > 0 {
            warn!(skipped, "skipped invalid transit edges");
        }

        Self {
            stops,
            adjacency,
            walk_speed_mps: DEFAULT_WALK_SPEED_MPS,
            nearest_k: DEFAULT_NEAREST_K,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, TransitGraphError> {
        let raw: RawGraph = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TransitGraphError> {
        let raw: RawGraph = serde_json::from_reader(reader)?;
        Ok(Self::from_raw(raw))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransitGraphError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    fn from_raw(raw: RawGraph) -> Self {
        let stops = raw
            .stops
            .into_iter()
            .enumerate()
            .map(|(index, stop)| TransitStop {
                index,
                id: match stop.id {
                    Some(serde_json::Value::String(id)) => id,
                    Some(other) => other.to_string(),
                    None => index.to_string(),
                },
                name: stop.name,
                position: Coordinate::new(stop.lat, stop.lon),
            })
            .collect::<Vec<_>>();

        let edges = raw
            .edges
            .into_iter()
            .filter_map(|edge| {
                let from = usize::try_from(edge.from).ok()?;
                let to = usize::try_from(edge.to).ok()?;
                // Missing weights mark edges the preprocessor could not estimate.
                let weight_s = edge.weight.unwrap_or(f64::NAN);
                Some(TransitEdge {
                    from,
                    to,
                    weight_s,
                    lines: edge.labels(),
                })
            })
            .collect();

        Self::new(stops, edges)
    }

    /// Serialize in the format [`TransitGraph::from_json_str`] reads.
    pub fn to_json_string(&self) -> Result<String, TransitGraphError> {
        Ok(serde_json::to_string(&self.file_record())?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TransitGraphError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.file_record())?;
        writer.flush()?;
        Ok(())
    }

    fn file_record(&self) -> GraphFile<'_> {
        GraphFile {
            stops: self
                .stops
                .iter()
                .map(|stop| StopRecord {
                    id: &stop.id,
                    name: &stop.name,
                    lat: stop.position.lat,
                    lon: stop.position.lng,
                })
                .collect(),
            edges: self
                .adjacency
                .iter()
                .flatten()
                .map(|edge| EdgeRecord {
                    from: edge.from,
                    to: edge.to,
                    weight_s: edge.weight_s,
                    lines: &edge.lines,
                })
                .collect(),
        }
    }

    pub fn with_walk_speed(mut self, walk_speed_mps: f64) -> Self {
        self.walk_speed_mps = walk_speed_mps;
        self
    }

    pub fn with_nearest_k(mut self, nearest_k: usize) -> Self {
        self.nearest_k = nearest_k;
        self
    }

    pub fn stops(&self) -> &[TransitStop] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> Option<&TransitStop> {
        self.stops.get(index)
    }

    pub fn outgoing(&self, index: usize) -> &[TransitEdge] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    fn walk_seconds(&self, distance_m: f64) -> f64 {
        distance_m / self.walk_speed_mps
    }

    /// Up to `k` stops within `max_m` of `point`, nearest first.
    pub fn nearest_stops(&self, point: Coordinate, k: usize, max_m: f64) -> Vec<NearbyStop> {
        let mut nearby: Vec<NearbyStop> = self
            .stops
            .iter()
            .filter_map(|stop| {
                let distance_m = haversine_m(point, stop.position);
                (distance_m <= max_m).then_some(NearbyStop {
                    index: stop.index,
                    distance_m,
                })
            })
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.index.cmp(&b.index))
        });
        nearby.truncate(k);
        nearby
    }

    /// Cheapest walk + ride + walk between two points.
    ///
    /// Returns `None` when either end has no stop within
    /// `max_walk_access_m` or no end stop is reachable.
    pub fn shortest_path(
        &self,
        from: Coordinate,
        to: Coordinate,
        max_walk_access_m: f64,
    ) -> Option<TransitPlan> {
        let start_stops = self.nearest_stops(from, self.nearest_k, max_walk_access_m);
        let end_stops = self.nearest_stops(to, self.nearest_k, max_walk_access_m);
        if start_stops.is_empty() || end_stops.is_empty() {
            return None;
        }

        let n = self.stops.len();
        let mut dist = vec![f64::INFINITY; n];
        // prev[v] = (stop, edge position in adjacency[stop]) that reached v.
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut is_end = vec![false; n];
        for end in &end_stops {
            is_end[end.index] = true;
        }

        let mut heap = BinaryHeap::new();
        for start in &start_stops {
            let cost = self.walk_seconds(start.distance_m);
            if cost < dist[start.index] {
                dist[start.index] = cost;
                heap.push(Frontier {
                    cost,
                    stop: start.index,
                });
            }
        }

        let mut reached = None;
        while let Some(Frontier { cost, stop }) = heap.pop() {
            if cost > dist[stop] {
                continue;
            }
            if is_end[stop] {
                reached = Some(stop);
                break;
            }
            for (position, edge) in self.adjacency[stop].iter().enumerate() {
                let next = cost + edge.weight_s;
                if next < dist[edge.to] {
                    dist[edge.to] = next;
                    prev[edge.to] = Some((stop, position));
                    heap.push(Frontier {
                        cost: next,
                        stop: edge.to,
                    });
                }
            }
        }

        let reached = reached?;
        let egress = end_stops
            .iter()
            .filter(|end| end.index == reached)
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))?;
        let total_duration_s = dist[reached] + self.walk_seconds(egress.distance_m);

        let mut chain = vec![reached];
        let mut edges_rev: Vec<&TransitEdge> = Vec::new();
        let mut cursor = reached;
        while let Some((stop, position)) = prev[cursor] {
            edges_rev.push(&self.adjacency[stop][position]);
            chain.push(stop);
            cursor = stop;
        }
        chain.reverse();
        edges_rev.reverse();
        let edges = edges_rev;

        let mut points = Vec::with_capacity(chain.len() + 2);
        points.push(from);
        points.extend(chain.iter().map(|&i| self.stops[i].position));
        points.push(to);

        let summary = self.summarize(&chain, &edges);
        debug!(
            stops = chain.len(),
            duration_s = total_duration_s,
            "transit path found"
        );

        Some(TransitPlan {
            total_duration_s,
            stop_chain: chain,
            geometry: Polyline::new(points),
            summary,
        })
    }

    fn summarize(&self, chain: &[usize], edges: &[&TransitEdge]) -> TransitSummary {
        let lines: BTreeSet<String> = edges
            .iter()
            .flat_map(|edge| edge.lines.iter().filter(|l| !l.is_empty()).cloned())
            .collect();

        let mut legs: Vec<TransitLegSummary> = Vec::new();
        for (i, edge) in edges.iter().enumerate() {
            let line = edge.primary_line().map(str::to_string);
            let from_stop = self.stops[chain[i]].name.clone();
            let to_stop = self.stops[chain[i + 1]].name.clone();
            match legs.last_mut() {
                Some(current) if current.line == line => {
                    current.to_stop = to_stop;
                    current.stops += 1;
                }
                _ => legs.push(TransitLegSummary {
                    line,
                    from_stop,
                    to_stop,
                    stops: 1,
                }),
            }
        }

        // chain is never empty: it always holds at least the reached stop.
        let first = chain.first().copied().unwrap_or_default();
        let last = chain.last().copied().unwrap_or_default();
        TransitSummary {
            start_stop: self.stops[first].name.clone(),
            end_stop: self.stops[last].name.clone(),
            stop_count: chain.len(),
            lines: lines.into_iter().collect(),
            legs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    stop: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we pop the cheapest first.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.stop.cmp(&self.stop))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(index: usize, name: &str, lat: f64, lng: f64) -> TransitStop {
        TransitStop {
            index,
            id: format!("S{}", index),
            name: name.to_string(),
            position: Coordinate::new(lat, lng),
        }
    }

    fn edge(from: usize, to: usize, weight_s: f64, lines: &[&str]) -> TransitEdge {
        TransitEdge {
            from,
            to,
            weight_s,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn nearest_stops_sorted_and_limited() {
        let graph = TransitGraph::new(
            vec![
                stop(0, "far", 47.5100, 19.0),
                stop(1, "near", 47.5010, 19.0),
                stop(2, "mid", 47.5050, 19.0),
            ],
            vec![],
        );
        let nearby = graph.nearest_stops(Coordinate::new(47.5, 19.0), 2, 2000.0);
        assert_eq!(nearby.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 2]);

        let within = graph.nearest_stops(Coordinate::new(47.5, 19.0), 6, 200.0);
        assert_eq!(within.len(), 1);
    }

    #[test]
    fn invalid_edges_are_skipped() {
        let graph = TransitGraph::new(
            vec![stop(0, "a", 47.5, 19.0), stop(1, "b", 47.6, 19.0)],
            vec![
                edge(0, 1, 60.0, &[]),
                edge(0, 5, 60.0, &[]),
                edge(1, 0, -1.0, &[]),
                edge(1, 0, f64::NAN, &[]),
            ],
        );
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn no_stop_in_range_means_no_plan() {
        let graph = TransitGraph::new(
            vec![stop(0, "a", 47.5, 19.0), stop(1, "b", 47.6, 19.0)],
            vec![edge(0, 1, 60.0, &[])],
        );
        let plan = graph.shortest_path(
            Coordinate::new(40.0, 10.0),
            Coordinate::new(47.6, 19.0),
            900.0,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn unreachable_end_stop_means_no_plan() {
        let graph = TransitGraph::new(
            vec![stop(0, "a", 47.5, 19.0), stop(1, "b", 47.6, 19.0)],
            vec![edge(1, 0, 60.0, &[])],
        );
        let plan = graph.shortest_path(
            Coordinate::new(47.5, 19.0),
            Coordinate::new(47.6, 19.0),
            900.0,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn shared_stop_needs_no_ride() {
        let graph = TransitGraph::new(vec![stop(0, "hub", 47.5, 19.0)], vec![]);
        let from = Coordinate::new(47.5, 19.001);
        let to = Coordinate::new(47.5, 18.999);
        let plan = graph.shortest_path(from, to, 900.0).unwrap();
        assert_eq!(plan.stop_chain, vec![0]);
        assert!(plan.summary.legs.is_empty());
        assert_eq!(plan.geometry.len(), 3);
        assert_eq!(plan.geometry.first(), Some(from));
        assert_eq!(plan.geometry.last(), Some(to));
    }

    #[test]
    fn legs_group_by_primary_line() {
        let graph = TransitGraph::new(
            vec![
                stop(0, "A", 47.50, 19.00),
                stop(1, "B", 47.50, 19.05),
                stop(2, "C", 47.50, 19.10),
                stop(3, "D", 47.50, 19.15),
            ],
            vec![
                edge(0, 1, 100.0, &["4", "6"]),
                edge(1, 2, 100.0, &["6", "4"]),
                edge(2, 3, 100.0, &["M2"]),
            ],
        );
        let plan = graph
            .shortest_path(Coordinate::new(47.50, 19.00), Coordinate::new(47.50, 19.15), 900.0)
            .unwrap();
        assert_eq!(plan.stop_chain, vec![0, 1, 2, 3]);
        assert_eq!(plan.summary.lines, vec!["4", "6", "M2"]);
        assert_eq!(plan.summary.legs.len(), 2);
        assert_eq!(plan.summary.legs[0].line.as_deref(), Some("4"));
        assert_eq!(plan.summary.legs[0].from_stop, "A");
        assert_eq!(plan.summary.legs[0].to_stop, "C");
        assert_eq!(plan.summary.legs[0].stops, 2);
        assert_eq!(plan.summary.legs[1].line.as_deref(), Some("M2"));
        assert_eq!(plan.summary.start_stop, "A");
        assert_eq!(plan.summary.end_stop, "D");
    }

    #[test]
    fn parses_compact_json_format() {
        let json = r#"{
            "stops": [
                {"id": "F01", "name": "Deák", "lat": 47.4979, "lon": 19.0544},
                {"id": 17, "name": "Astoria", "lat": 47.4934, "lon": 19.0604}
            ],
            "edges": [
                {"from": 0, "to": 1, "w": 90, "route": "M2"},
                {"from": 1, "to": 0, "weightSeconds": 95, "lines": ["M2", ""]},
                {"from": 1, "to": 9, "w": 10},
                {"from": 0, "to": 1}
            ]
        }"#;
        let graph = TransitGraph::from_json_str(json).unwrap();
        assert_eq!(graph.stops().len(), 2);
        assert_eq!(graph.stop(1).unwrap().id, "17");
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.outgoing(0)[0].primary_line(), Some("M2"));
        assert_eq!(graph.outgoing(1)[0].lines.len(), 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            TransitGraph::from_json_str("{\"stops\": 3}"),
            Err(TransitGraphError::Json(_))
        ));
    }
}
