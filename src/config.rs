//! Acquisition settings loaded from TOML and the environment.
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! `VIMBAX_*` environment variables (e.g. `VIMBAX_BUFFER_COUNT=4`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::feature::CommandWait;
use crate::traits::Result;

/// Prefix of environment variables overriding file values.
pub const ENV_PREFIX: &str = "VIMBAX";

/// Settings for opening a camera and running a stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Camera id, extended id or serial. `None` opens the first available.
    pub camera_id: Option<String>,
    /// Number of frame buffers announced to the driver.
    pub buffer_count: usize,
    /// Run `AcquisitionStart` once the buffers are queued.
    pub start_acquisition: bool,
    /// Interval between command completion polls.
    pub command_poll_interval_ms: u64,
    /// Give up waiting for a command after this long. Unbounded when unset.
    pub command_timeout_ms: Option<u64>,
    /// Settings file loaded into the camera right after open.
    pub settings_file: Option<PathBuf>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            camera_id: None,
            buffer_count: 7,
            start_acquisition: true,
            command_poll_interval_ms: 100,
            command_timeout_ms: None,
            settings_file: None,
        }
    }
}

impl AcquisitionConfig {
    /// Parse settings from a TOML document, ignoring the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Layer `path` (when given) and `VIMBAX_*` variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Camera name to pass to session open; empty selects the first camera.
    pub fn camera_name(&self) -> &str {
        self.camera_id.as_deref().unwrap_or_default()
    }

    /// Command wait built from the poll interval and timeout.
    pub fn command_wait(&self) -> CommandWait {
        CommandWait::new(Duration::from_millis(self.command_poll_interval_ms))
            .with_timeout(self.command_timeout_ms.map(Duration::from_millis))
    }
}
