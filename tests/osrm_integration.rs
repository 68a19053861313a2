//! OSRM-backed tests against local `osrm-routed` containers.
//!
//! Each profile needs its own preprocessed Hungary extract, so the first
//! run downloads and extracts both; later runs reuse the files and the
//! containers. Run with `cargo test -- --ignored`.

mod fixtures;

use std::env;
use std::sync::Arc;

use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, ReuseDirective, TestcontainersError};

use hotzone_planner::config::PlannerConfig;
use hotzone_planner::model::{Coordinate, LegMode};
use hotzone_planner::osrm::{OsrmClient, OsrmConfig};
use hotzone_planner::osrm_data::{GeofabrikRegion, OsrmDataset, OsrmDatasetConfig, OsrmProfile};
use hotzone_planner::planner::RoutePlanner;
use hotzone_planner::traits::{CostProvider, CostTable, ProviderError, RouteResponse, TravelMode};

use fixtures::{
    ASTORIA, BLAHA, CORVIN, DEAK_TER, KALVIN_TER, KELETI, NYUGATI, OKTOGON, candidate_at,
};

// ============================================================================
// OSRM Setup
// ============================================================================

fn osrm_container(
    profile: OsrmProfile,
) -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_root = env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string());
    let region = GeofabrikRegion::new("europe/hungary");
    let config = OsrmDatasetConfig::new(region, data_root, profile);
    let dataset = OsrmDataset::ensure(&config)
        .map_err(|err| TestcontainersError::other(format!("OSRM prep failed: {:?}", err)))?;
    let mtime = std::fs::metadata(dataset.osrm_base.with_extension("osrm.partition"))
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    let container_name = format!("osrm-hungary-{}-mld-{}", profile.name(), mtime);

    let image = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(
            dataset.data_dir.to_string_lossy().to_string(),
            "/data",
        ))
        .with_cmd(vec![
            "osrm-routed".to_string(),
            "--algorithm".to_string(),
            "mld".to_string(),
            format!("/data/{}", dataset.osrm_file_name()),
        ])
        .with_container_name(container_name)
        .with_startup_timeout(std::time::Duration::from_secs(30))
        .with_reuse(ReuseDirective::Always);

    let container = image.start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;
    Ok((container, format!("http://127.0.0.1:{}", port)))
}

/// Routes each travel mode to the server that holds its profile.
struct ProfileRouter {
    walk: OsrmClient,
    drive: OsrmClient,
}

impl ProfileRouter {
    fn client(&self, mode: TravelMode) -> &OsrmClient {
        match mode {
            TravelMode::Walk => &self.walk,
            TravelMode::Drive => &self.drive,
        }
    }
}

impl CostProvider for ProfileRouter {
    fn table_query(
        &self,
        mode: TravelMode,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<CostTable, ProviderError> {
        self.client(mode).table_query(mode, origins, destinations)
    }

    fn route_query(
        &self,
        mode: TravelMode,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<RouteResponse, ProviderError> {
        self.client(mode).route_query(mode, from, to)
    }
}

/// Retry until the freshly started server answers.
fn wait_for_table(client: &OsrmClient, mode: TravelMode, points: &[Coordinate]) -> CostTable {
    let start = std::time::Instant::now();
    loop {
        match client.table_query(mode, points, points) {
            Ok(table) => return table,
            Err(err) if start.elapsed() < std::time::Duration::from_secs(15) => {
                eprintln!("OSRM not ready: {}", err);
                std::thread::sleep(std::time::Duration::from_millis(500));
            }
            Err(err) => panic!("OSRM table failed: {}", err),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
#[ignore = "needs docker and the Geofabrik Hungary extract"]
fn osrm_table_returns_matrix() {
    let (_container, base_url) = osrm_container(OsrmProfile::Car).expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig::local(base_url)).expect("build OSRM client");

    let points = vec![DEAK_TER.coordinate(), KELETI.coordinate(), NYUGATI.coordinate()];
    let table = wait_for_table(&client, TravelMode::Drive, &points);

    assert_eq!(table.durations.len(), points.len());
    assert_eq!(table.durations[0].len(), points.len());
    assert_eq!(table.duration(0, 0), Some(0.0));
    assert!(table.duration(0, 1).unwrap() > 0.0);
    assert!(table.distance(0, 1).unwrap() > 0.0);
}

#[test]
#[ignore = "needs docker and the Geofabrik Hungary extract"]
fn osrm_route_has_road_geometry() {
    let (_container, base_url) = osrm_container(OsrmProfile::Foot).expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig::local(base_url)).expect("build OSRM client");
    wait_for_table(&client, TravelMode::Walk, &[DEAK_TER.coordinate(), ASTORIA.coordinate()]);

    let route = client
        .route_query(TravelMode::Walk, DEAK_TER.coordinate(), KELETI.coordinate())
        .expect("walking route");
    assert!(route.duration_s > 0.0);
    assert!(route.geometry.len() > 2);
    // Road geometry snaps near, not onto, the requested points.
    assert!(route.geometry.first().unwrap().approx_eq(&DEAK_TER.coordinate(), 0.01));
}

#[test]
#[ignore = "needs docker and the Geofabrik Hungary extract"]
fn osrm_secondary_endpoint_takes_over() {
    let (_container, base_url) = osrm_container(OsrmProfile::Car).expect("start OSRM container");
    let config = OsrmConfig {
        endpoints: vec!["http://127.0.0.1:9".to_string(), base_url],
        timeout_secs: 5,
        ..OsrmConfig::default()
    };
    let client = OsrmClient::new(config).expect("build OSRM client");
    let points = [DEAK_TER.coordinate(), KELETI.coordinate()];
    let table = wait_for_table(&client, TravelMode::Drive, &points);
    assert!(table.duration(0, 1).is_some());
}

#[test]
#[ignore = "needs docker and the Geofabrik Hungary extract"]
fn osrm_backed_plan() {
    let (_foot, foot_url) = osrm_container(OsrmProfile::Foot).expect("start foot container");
    let (_car, car_url) = osrm_container(OsrmProfile::Car).expect("start car container");
    let router = ProfileRouter {
        walk: OsrmClient::new(OsrmConfig::local(foot_url)).expect("foot client"),
        drive: OsrmClient::new(OsrmConfig::local(car_url)).expect("car client"),
    };
    wait_for_table(&router.walk, TravelMode::Walk, &[DEAK_TER.coordinate()]);
    wait_for_table(&router.drive, TravelMode::Drive, &[DEAK_TER.coordinate()]);

    let candidates = vec![
        candidate_at("car-astoria", &ASTORIA, &[&KALVIN_TER]),
        candidate_at("car-oktogon", &OKTOGON, &[&KELETI, &NYUGATI]),
        candidate_at("car-blaha", &BLAHA, &[&CORVIN]),
    ];
    let planner = RoutePlanner::new(Arc::new(router), PlannerConfig::default());
    let itinerary = planner
        .plan_route(Some(DEAK_TER.coordinate()), &candidates)
        .expect("plan");

    assert_eq!(itinerary.steps.len(), 3);
    for step in &itinerary.steps {
        println!(
            "{}. {} walk {:.0}s, drive {:.0}s",
            step.order_index,
            step.service_point.label,
            step.access_leg.duration_s,
            step.transfer_leg.duration_s
        );
        assert_eq!(step.access_leg.mode, LegMode::Walk);
        assert_eq!(step.transfer_leg.geometry.last(), Some(step.zone.position));
    }
    assert!(itinerary.total_duration_s < 7200.0);
}
