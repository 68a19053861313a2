//! Real Budapest locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. All of them are routable with
//! the Geofabrik Hungary extract.

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> hotzone_planner::model::Coordinate {
        hotzone_planner::model::Coordinate::new(self.lat, self.lng)
    }
}

// ============================================================================
// Squares and transit hubs (good origins and parking spots)
// ============================================================================

pub const PARLIAMENT: Location = Location::new("Országház", 47.5071, 19.0456);
pub const DEAK_TER: Location = Location::new("Deák Ferenc tér", 47.4979, 19.0544);
pub const KELETI: Location = Location::new("Keleti pályaudvar", 47.5003, 19.0838);
pub const NYUGATI: Location = Location::new("Nyugati pályaudvar", 47.5104, 19.0566);
pub const MORICZ: Location = Location::new("Móricz Zsigmond körtér", 47.4776, 19.0468);
pub const SZELL_KALMAN: Location = Location::new("Széll Kálmán tér", 47.5075, 19.0230);
pub const ASTORIA: Location = Location::new("Astoria", 47.4934, 19.0604);
pub const KALVIN_TER: Location = Location::new("Kálvin tér", 47.4892, 19.0617);
pub const OKTOGON: Location = Location::new("Oktogon", 47.5054, 19.0636);
pub const HOSOK_TERE: Location = Location::new("Hősök tere", 47.5150, 19.0779);
pub const BATTHYANY: Location = Location::new("Batthyány tér", 47.5064, 19.0387);
pub const CORVIN: Location = Location::new("Corvin-negyed", 47.4860, 19.0705);
pub const BLAHA: Location = Location::new("Blaha Lujza tér", 47.4962, 19.0702);

pub const ALL: &[&Location] = &[
    &PARLIAMENT,
    &DEAK_TER,
    &KELETI,
    &NYUGATI,
    &MORICZ,
    &SZELL_KALMAN,
    &ASTORIA,
    &KALVIN_TER,
    &OKTOGON,
    &HOSOK_TERE,
    &BATTHYANY,
    &CORVIN,
    &BLAHA,
];
