//! Configuration file support and runtime settings
//!
//! Settings come from a TOML file (by default under the user config dir) with
//! command-line overrides merged on top. CLI values always win.
//!
//! ```toml
//! [inpaint]
//! api_url = "http://127.0.0.1:8080/api/v1/inpaint; http://127.0.0.1:8081/api/v1/inpaint"
//! box_padding = 6
//! crop_padding = 128
//! timeout_secs = 120
//!
//! [detection]
//! working_height = 1080
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::geometry::{DEFAULT_HEIGHT_TOLERANCE, DEFAULT_WORKING_HEIGHT};
use crate::inpaint::{ModelParams, DEFAULT_CROP_PADDING, DEFAULT_FEATHER_SIGMA};

// ============================================================
// Constants
// ============================================================

/// Endpoint used when nothing is configured
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/api/v1/inpaint";

/// Default padding around each text box in the mask
pub const DEFAULT_BOX_PADDING: u32 = 6;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// ROIs smaller than this (working pixels) fall back to full-frame detection
pub const DEFAULT_MIN_ROI_SIDE: u32 = 5;

/// Config directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "slide-inpaint";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Endpoint parsing
// ============================================================

/// Parse a delimited endpoint string into an ordered, de-duplicated list
///
/// Newlines, semicolons and commas all separate entries; blanks are dropped and
/// the first occurrence of a repeated URL keeps its position.
pub fn parse_endpoints(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in value.split(['\n', ';', ',']) {
        let url = part.trim();
        if url.is_empty() || out.iter().any(|seen| seen == url) {
            continue;
        }
        out.push(url.to_string());
    }
    out
}

// ============================================================
// File config
// ============================================================

/// `[inpaint]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintSection {
    pub enabled: bool,
    /// One or more endpoint URLs, newline/semicolon/comma separated
    pub api_url: String,
    pub box_padding: u32,
    pub crop_padding: u32,
    pub timeout_secs: u64,
    pub feather_sigma: f32,
    pub model: ModelParams,
}

impl Default for InpaintSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: DEFAULT_ENDPOINT.to_string(),
            box_padding: DEFAULT_BOX_PADDING,
            crop_padding: DEFAULT_CROP_PADDING,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            feather_sigma: DEFAULT_FEATHER_SIGMA,
            model: ModelParams::default(),
        }
    }
}

/// `[detection]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSection {
    pub working_height: u32,
    pub height_tolerance: u32,
    pub min_roi_side: u32,
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            working_height: DEFAULT_WORKING_HEIGHT,
            height_tolerance: DEFAULT_HEIGHT_TOLERANCE,
            min_roi_side: DEFAULT_MIN_ROI_SIDE,
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inpaint: InpaintSection,
    pub detection: DetectionSection,
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub endpoints: Option<String>,
    pub box_padding: Option<u32>,
    pub crop_padding: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub feather_sigma: Option<f32>,
    pub working_height: Option<u32>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            Some(_) => Ok(Self::default()),
            None => Err(ConfigError::NoConfigDir),
        }
    }

    /// Load from an explicit path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolve runtime settings, CLI values taking precedence
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> PipelineSettings {
        let api_url = cli
            .endpoints
            .as_deref()
            .unwrap_or(self.inpaint.api_url.as_str());

        PipelineSettings {
            inpaint_enabled: self.inpaint.enabled,
            endpoints: parse_endpoints(api_url),
            box_padding: cli.box_padding.unwrap_or(self.inpaint.box_padding),
            crop_padding: cli.crop_padding.unwrap_or(self.inpaint.crop_padding),
            timeout: Duration::from_secs(
                cli.timeout_secs
                    .unwrap_or(self.inpaint.timeout_secs)
                    .max(1),
            ),
            feather_sigma: cli.feather_sigma.unwrap_or(self.inpaint.feather_sigma),
            model: self.inpaint.model.clone(),
            working_height: cli
                .working_height
                .unwrap_or(self.detection.working_height),
            height_tolerance: self.detection.height_tolerance,
            min_roi_side: self.detection.min_roi_side,
        }
    }
}

// ============================================================
// Runtime settings
// ============================================================

/// Resolved settings for one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub inpaint_enabled: bool,
    pub endpoints: Vec<String>,
    pub box_padding: u32,
    pub crop_padding: u32,
    /// Per HTTP call, not per task
    pub timeout: Duration,
    pub feather_sigma: f32,
    pub model: ModelParams,
    pub working_height: u32,
    pub height_tolerance: u32,
    pub min_roi_side: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Config::default().merge_with_cli(&CliOverrides::default())
    }
}

impl PipelineSettings {
    /// Create a builder
    pub fn builder() -> PipelineSettingsBuilder {
        PipelineSettingsBuilder::default()
    }
}

/// Builder for PipelineSettings
#[derive(Debug, Default)]
pub struct PipelineSettingsBuilder {
    settings: PipelineSettings,
}

impl PipelineSettingsBuilder {
    /// Set endpoints from a delimited string
    #[must_use]
    pub fn endpoints(mut self, value: &str) -> Self {
        self.settings.endpoints = parse_endpoints(value);
        self
    }

    /// Set endpoints from a list (de-duplicated, order kept)
    #[must_use]
    pub fn endpoint_list<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = urls.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.settings.endpoints = parse_endpoints(&joined.join("\n"));
        self
    }

    #[must_use]
    pub fn inpaint_enabled(mut self, enabled: bool) -> Self {
        self.settings.inpaint_enabled = enabled;
        self
    }

    #[must_use]
    pub fn box_padding(mut self, padding: u32) -> Self {
        self.settings.box_padding = padding;
        self
    }

    #[must_use]
    pub fn crop_padding(mut self, padding: u32) -> Self {
        self.settings.crop_padding = padding;
        self
    }

    /// Set the per-request timeout (at least one second)
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout.max(Duration::from_secs(1));
        self
    }

    /// Set feather sigma (negative values clamp to 0, which disables feathering)
    #[must_use]
    pub fn feather_sigma(mut self, sigma: f32) -> Self {
        self.settings.feather_sigma = sigma.max(0.0);
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelParams) -> Self {
        self.settings.model = model;
        self
    }

    #[must_use]
    pub fn working_height(mut self, height: u32, tolerance: u32) -> Self {
        self.settings.working_height = height;
        self.settings.height_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn min_roi_side(mut self, side: u32) -> Self {
        self.settings.min_roi_side = side;
        self
    }

    /// Build the settings
    #[must_use]
    pub fn build(self) -> PipelineSettings {
        self.settings
    }
}
