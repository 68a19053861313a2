//! Transit graph preparation from a GTFS zip.
//!
//! The graph is timetable-free. Consecutive stops of a trip become an edge
//! weighted by straight-line distance at an average ride speed plus a fixed
//! per-stop penalty. Only the cheapest weight per stop pair is kept, and the
//! labels of every line riding it at that weight are merged.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::haversine::haversine_m;
use crate::model::Coordinate;
use crate::transit::{TransitEdge, TransitGraph, TransitStop};

/// Average ride speed, ~21.6 km/h.
pub const DEFAULT_TRANSIT_SPEED_MPS: f64 = 6.0;

pub const DEFAULT_STOP_PENALTY_S: f64 = 20.0;

/// Line label for trips whose route is unknown.
pub const DEFAULT_LINE_LABEL: &str = "BKV";

/// Busy trunk segments are served by many lines; only this many are kept.
pub const DEFAULT_MAX_LINES_PER_EDGE: usize = 8;

/// Weights closer than this count as the same ride.
const SAME_WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("failed to read GTFS feed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid GTFS zip: {0}")]
    Zip(#[from] ZipError),

    #[error("invalid GTFS table: {0}")]
    Csv(#[from] csv::Error),

    #[error("GTFS zip has no {0}")]
    MissingFile(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GtfsGraphOptions {
    pub transit_speed_mps: f64,
    pub stop_penalty_s: f64,
    pub default_line: String,
    pub max_lines_per_edge: usize,
}

impl Default for GtfsGraphOptions {
    fn default() -> Self {
        Self {
            transit_speed_mps: DEFAULT_TRANSIT_SPEED_MPS,
            stop_penalty_s: DEFAULT_STOP_PENALTY_S,
            default_line: DEFAULT_LINE_LABEL.to_string(),
            max_lines_per_edge: DEFAULT_MAX_LINES_PER_EDGE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StopRow {
    #[serde(default)]
    stop_id: Option<String>,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default)]
    stop_lat: Option<String>,
    #[serde(default)]
    stop_lon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    trip_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    #[serde(default)]
    trip_id: Option<String>,
    #[serde(default)]
    stop_id: Option<String>,
    #[serde(default)]
    stop_sequence: Option<String>,
}

/// Best weight and line labels seen for one stop pair.
#[derive(Debug)]
struct EdgeDraft {
    weight_s: f64,
    lines: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct GtfsGraphBuilder {
    options: GtfsGraphOptions,
}

impl GtfsGraphBuilder {
    pub fn new(options: GtfsGraphOptions) -> Self {
        Self { options }
    }

    pub fn build_from_path(&self, path: impl AsRef<Path>) -> Result<TransitGraph, GtfsError> {
        let file = File::open(path)?;
        self.build(BufReader::new(file))
    }

    /// Build a graph from a GTFS zip. `stops.txt` and `stop_times.txt` are
    /// required; without `trips.txt` and `routes.txt` every edge carries the
    /// default line label.
    pub fn build<R: Read + Seek>(&self, reader: R) -> Result<TransitGraph, GtfsError> {
        let mut archive = ZipArchive::new(reader)?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let stops_name =
            find_table(&names, "stops.txt").ok_or(GtfsError::MissingFile("stops.txt"))?;
        let stop_times_name =
            find_table(&names, "stop_times.txt").ok_or(GtfsError::MissingFile("stop_times.txt"))?;

        let stops = read_stops(&read_table(&mut archive, &stops_name)?)?;
        let stop_slots: HashMap<&str, usize> = stops
            .iter()
            .map(|stop| (stop.id.as_str(), stop.index))
            .collect();

        let trip_lines = match (find_table(&names, "trips.txt"), find_table(&names, "routes.txt")) {
            (Some(trips), Some(routes)) => {
                let routes = read_route_labels(&read_table(&mut archive, &routes)?)?;
                read_trip_lines(&read_table(&mut archive, &trips)?, &routes)?
            }
            _ => {
                debug!("no trips or routes table, using the default line label");
                HashMap::new()
            }
        };

        let text = read_table(&mut archive, &stop_times_name)?;
        let mut drafts: BTreeMap<(usize, usize), EdgeDraft> = BTreeMap::new();
        let mut last_by_trip: HashMap<String, (i64, usize)> = HashMap::new();
        for_each_row(&text, "stop_times.txt", |row: StopTimeRow| {
            let (Some(trip), Some(stop), Some(sequence)) = (
                field(&row.trip_id),
                field(&row.stop_id),
                field(&row.stop_sequence),
            ) else {
                return;
            };
            let Some(&to) = stop_slots.get(stop) else {
                return;
            };
            let Ok(sequence) = sequence.parse::<i64>() else {
                return;
            };

            // Rows are expected in stop_sequence order; gaps break the chain.
            let previous = last_by_trip
                .get(trip)
                .filter(|(last_sequence, _)| sequence == last_sequence + 1);
            if let Some(&(_, from)) = previous {
                let line = trip_lines
                    .get(trip)
                    .cloned()
                    .unwrap_or_else(|| self.options.default_line.clone());
                let weight_s = self.ride_seconds(&stops[from], &stops[to]);
                merge_edge(&mut drafts, (from, to), weight_s, line);
            }
            last_by_trip.insert(trip.to_string(), (sequence, to));
        })?;

        let edges: Vec<TransitEdge> = drafts
            .into_iter()
            .map(|((from, to), draft)| TransitEdge {
                from,
                to,
                weight_s: draft.weight_s,
                lines: draft
                    .lines
                    .into_iter()
                    .filter(|line| !line.is_empty())
                    .take(self.options.max_lines_per_edge)
                    .collect(),
            })
            .collect();

        info!(stops = stops.len(), edges = edges.len(), "transit graph built from GTFS");
        Ok(TransitGraph::new(stops, edges))
    }

    fn ride_seconds(&self, from: &TransitStop, to: &TransitStop) -> f64 {
        haversine_m(from.position, to.position) / self.options.transit_speed_mps
            + self.options.stop_penalty_s
    }
}

impl TransitGraph {
    /// Build a graph from a GTFS zip with the default weighting.
    pub fn from_gtfs_zip(path: impl AsRef<Path>) -> Result<Self, GtfsError> {
        GtfsGraphBuilder::default().build_from_path(path)
    }
}

fn merge_edge(
    drafts: &mut BTreeMap<(usize, usize), EdgeDraft>,
    key: (usize, usize),
    weight_s: f64,
    line: String,
) {
    match drafts.get_mut(&key) {
        Some(draft) if weight_s < draft.weight_s - SAME_WEIGHT_EPSILON => {
            draft.weight_s = weight_s;
            draft.lines = BTreeSet::from([line]);
        }
        Some(draft) => {
            if (weight_s - draft.weight_s).abs() < SAME_WEIGHT_EPSILON {
                draft.lines.insert(line);
            }
        }
        None => {
            drafts.insert(
                key,
                EdgeDraft {
                    weight_s,
                    lines: BTreeSet::from([line]),
                },
            );
        }
    }
}

/// Exact name first, then any entry ending in it (feeds zipped inside a folder).
fn find_table(names: &[String], table: &str) -> Option<String> {
    if let Some(name) = names.iter().find(|name| name.as_str() == table) {
        return Some(name.clone());
    }
    let suffix = format!("/{}", table.to_ascii_lowercase());
    names
        .iter()
        .find(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(&suffix) || lower.ends_with(&suffix.replace('/', "\\"))
        })
        .cloned()
}

fn read_table<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, GtfsError> {
    let mut file = archive.by_name(name)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(decode(bytes))
}

/// UTF-8 with an optional BOM; anything else is read as Latin-1.
fn decode(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn for_each_row<T, F>(text: &str, table: &str, mut visit: F) -> Result<(), GtfsError>
where
    T: DeserializeOwned,
    F: FnMut(T),
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut skipped = 0usize;
    for row in reader.deserialize::<T>() {
        match row {
            Ok(row) => visit(row),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(table, skipped, "skipped malformed GTFS rows");
    }
    Ok(())
}

/// Trimmed, non-empty value of an optional column.
fn field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn read_stops(text: &str) -> Result<Vec<TransitStop>, GtfsError> {
    let mut stops = Vec::new();
    for_each_row(text, "stops.txt", |row: StopRow| {
        let Some(id) = field(&row.stop_id) else {
            return;
        };
        let lat = field(&row.stop_lat).and_then(|v| v.parse::<f64>().ok());
        let lon = field(&row.stop_lon).and_then(|v| v.parse::<f64>().ok());
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return;
        };
        let position = Coordinate::new(lat, lon);
        if !position.is_finite() {
            return;
        }
        stops.push(TransitStop {
            index: stops.len(),
            id: id.to_string(),
            name: field(&row.stop_name).unwrap_or_default().to_string(),
            position,
        });
    })?;
    Ok(stops)
}

/// route_id to its short name, long name or id, in that order.
fn read_route_labels(text: &str) -> Result<HashMap<String, String>, GtfsError> {
    let mut labels = HashMap::new();
    for_each_row(text, "routes.txt", |row: RouteRow| {
        let Some(id) = field(&row.route_id) else {
            return;
        };
        let label = field(&row.route_short_name)
            .or_else(|| field(&row.route_long_name))
            .unwrap_or(id);
        labels.insert(id.to_string(), label.to_string());
    })?;
    Ok(labels)
}

fn read_trip_lines(
    text: &str,
    route_labels: &HashMap<String, String>,
) -> Result<HashMap<String, String>, GtfsError> {
    let mut lines = HashMap::new();
    for_each_row(text, "trips.txt", |row: TripRow| {
        let (Some(trip), Some(route)) = (field(&row.trip_id), field(&row.route_id)) else {
            return;
        };
        if let Some(label) = route_labels.get(route) {
            lines.insert(trip.to_string(), label.clone());
        }
    })?;
    Ok(lines)
}
