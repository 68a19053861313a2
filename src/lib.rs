//! hotzone-planner
//!
//! Plans the visiting order over a set of vehicles, each with candidate
//! destination zones: walk (or ride transit) to a vehicle, drive it to one
//! of its zones, walk on to the next vehicle.
//!
//! Collaborators sit behind the traits in [`traits`]; [`planner::RoutePlanner`]
//! is the entry point.

pub mod cancel;
pub mod config;
pub mod elevation;
pub mod gtfs;
pub mod haversine;
pub mod itinerary;
pub mod model;
pub mod osrm;
pub mod osrm_data;
pub mod planner;
pub mod polyline;
pub mod resolver;
pub mod selector;
pub mod solver;
pub mod tables;
pub mod traits;
pub mod transit;

pub use config::PlannerConfig;
pub use model::{Candidate, Coordinate, Itinerary};
pub use planner::{PlanningFailure, RoutePlanner};
