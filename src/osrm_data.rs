//! OSRM dataset preparation (Geofabrik download + docker preprocessing).
//!
//! Walking and driving legs need separately extracted datasets, one per
//! OSRM Lua profile. Used by the docker-backed integration tests.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::info;

use crate::traits::TravelMode;

#[derive(Debug, Clone)]
pub struct GeofabrikRegion {
    /// Geofabrik region path, e.g. "europe/hungary".
    pub path: String,
}

impl GeofabrikRegion {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn name(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("region")
            .to_string()
    }

    pub fn url(&self) -> String {
        format!("https://download.geofabrik.de/{}-latest.osm.pbf", self.path)
    }
}

/// OSRM Lua profile shipped in the `osrm/osrm-backend` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsrmProfile {
    Foot,
    Car,
}

impl OsrmProfile {
    pub fn for_mode(mode: TravelMode) -> Self {
        match mode {
            TravelMode::Walk => OsrmProfile::Foot,
            TravelMode::Drive => OsrmProfile::Car,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OsrmProfile::Foot => "foot",
            OsrmProfile::Car => "car",
        }
    }

    fn lua_script(&self) -> String {
        format!("/opt/{}.lua", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct OsrmDatasetConfig {
    pub region: GeofabrikRegion,
    pub data_root: PathBuf,
    pub profile: OsrmProfile,
}

impl OsrmDatasetConfig {
    pub fn new(
        region: GeofabrikRegion,
        data_root: impl Into<PathBuf>,
        profile: OsrmProfile,
    ) -> Self {
        Self {
            region,
            data_root: data_root.into(),
            profile,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmDataset {
    /// Directory holding this profile's extracted files.
    pub data_dir: PathBuf,
    pub osrm_base: PathBuf,
    pub pbf_path: PathBuf,
}

impl OsrmDataset {
    /// Name of the `.osrm` file inside `data_dir`.
    pub fn osrm_file_name(&self) -> String {
        file_name(&self.osrm_base)
    }
}

#[derive(Debug, Error)]
pub enum OsrmDataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("preprocessing failed: {0}")]
    ProcessFailure(String),
}

impl OsrmDataset {
    /// Download and preprocess the region for one profile, reusing any
    /// files already on disk. Uses the MLD pipeline
    /// (extract, partition, customize).
    pub fn ensure(config: &OsrmDatasetConfig) -> Result<Self, OsrmDataError> {
        let region_name = config.region.name();
        let data_root = if config.data_root.is_absolute() {
            config.data_root.clone()
        } else {
            std::env::current_dir()?.join(&config.data_root)
        };

        // The PBF is shared; each profile extracts into its own directory
        // because OSRM derives every artifact name from the input file.
        let pbf_path = data_root.join(format!("{}-latest.osm.pbf", region_name));
        fs::create_dir_all(&data_root)?;
        if !pbf_path.exists() {
            info!(url = %config.region.url(), "downloading OSM extract");
            download_pbf(&config.region.url(), &pbf_path)?;
        }

        let data_dir = data_root.join(format!("{}-{}", region_name, config.profile.name()));
        fs::create_dir_all(&data_dir)?;
        let local_pbf = data_dir.join(file_name(&pbf_path));
        if !local_pbf.exists() {
            fs::copy(&pbf_path, &local_pbf)?;
        }

        let osrm_base = data_dir.join(format!("{}-latest.osrm", region_name));
        if !osrm_base.exists() {
            info!(profile = config.profile.name(), "running osrm-extract");
            run_docker(
                &[
                    "osrm-extract",
                    "-p",
                    &config.profile.lua_script(),
                    &format!("/data/{}", file_name(&local_pbf)),
                ],
                &data_dir,
            )?;
        }

        if !mld_ready(&osrm_base) {
            let target = format!("/data/{}", file_name(&osrm_base));
            run_docker(&["osrm-partition", &target], &data_dir)?;
            run_docker(&["osrm-customize", &target], &data_dir)?;
        }

        Ok(Self {
            data_dir,
            osrm_base,
            pbf_path,
        })
    }
}

fn download_pbf(url: &str, dest: &Path) -> Result<(), OsrmDataError> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let tmp_path = dest.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    let bytes = response.bytes()?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    fs::rename(tmp_path, dest)?;
    Ok(())
}

fn mld_ready(osrm_base: &Path) -> bool {
    ["osrm.partition", "osrm.mldgr", "osrm.cells"]
        .iter()
        .all(|ext| osrm_base.with_extension(ext).exists())
        && osrm_base.exists()
}

fn run_docker(args: &[&str], data_dir: &Path) -> Result<(), OsrmDataError> {
    let status = Command::new("docker")
        .arg("run")
        .arg("--rm")
        .arg("-t")
        .arg("-v")
        .arg(format!("{}:/data", data_dir.display()))
        .arg("osrm/osrm-backend")
        .args(args)
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(OsrmDataError::ProcessFailure(format!(
            "docker exited with status {}",
            status
        )))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
