//! Versions configuration module.
//!
//! Handles loading, validating, and merging `versions.toml`. User values are
//! layered on top of the stock defaults, so a file only needs the keys it
//! wants to change. Arrays replace wholesale: a file with its own
//! `[[output.versions]]` entries replaces the stock version list entirely.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! # path = "/var/www/img"    # Write every version here instead of next to the source
//! # prefix = "im-"           # File name prefix for every version
//! # quality = 80             # Default quality for versions without their own
//!
//! [[output.versions]]
//! suffix = "-full"
//! max_width = 1920
//! max_height = 1920
//!
//! [[output.versions]]
//! suffix = "-1200"
//! max_width = 1200
//! max_height = 1200
//! aspect = "3:2"            # Centered crop before resizing
//!
//! [engine]
//! program = "convert"       # ImageMagick binary (`magick` on IM7-only installs)
//! timeout_ms = 10000        # Kill the engine after this long
//!
//! [processing]
//! max_processes = 4         # Max parallel images (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{AspectRatio, DEFAULT_PROGRAM};
use crate::types::{Output, VersionSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `versions.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output defaults and the ordered version list.
    pub output: Output,
    /// External engine settings.
    pub engine: EngineConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: Output::new(stock_versions()),
            engine: EngineConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

/// Stock versions: a full-size copy, landscape crops, and two squares.
pub fn stock_versions() -> Vec<VersionSpec> {
    vec![
        VersionSpec::new("-full", 1920, 1920),
        VersionSpec::new("-1200", 1200, 1200).with_aspect("3:2"),
        VersionSpec::new("-800", 800, 800).with_aspect("3:2"),
        VersionSpec::new("-500", 500, 500).with_aspect("3:2"),
        VersionSpec::new("-260", 260, 260).with_aspect("3:2"),
        VersionSpec::new("-150", 150, 150).with_aspect("3:2"),
        VersionSpec::new("-square-200", 200, 200).with_aspect("1:1"),
        VersionSpec::new("-square-50", 50, 50).with_aspect("1:1"),
    ]
}

/// External engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine binary, looked up on `PATH`.
    pub program: String,
    /// Wall-clock limit for one engine run, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of images processed at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

fn check_quality(field: &str, quality: Option<u32>) -> Result<(), ConfigError> {
    match quality {
        Some(q) if !(1..=100).contains(&q) => Err(ConfigError::Validation(format!(
            "{field} must be 1-100, got {q}"
        ))),
        _ => Ok(()),
    }
}

fn validate_version(index: usize, v: &VersionSpec) -> Result<(), ConfigError> {
    let field = |name: &str| format!("output.versions[{index}].{name}");

    if v.max_width == 0 || v.max_height == 0 {
        return Err(ConfigError::Validation(format!(
            "{} and {} must be non-zero",
            field("max_width"),
            field("max_height")
        )));
    }
    check_quality(&field("quality"), v.quality)?;
    if let Some(aspect) = &v.aspect {
        aspect
            .parse::<AspectRatio>()
            .map_err(|e| ConfigError::Validation(format!("{}: {e}", field("aspect"))))?;
    }
    if let Some(format) = &v.format {
        if format.is_empty() || format.starts_with('.') || format.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "{} must be a bare extension like \"png\", got {format:?}",
                field("format")
            )));
        }
    }
    Ok(())
}

impl Config {
    /// Validate config values are within acceptable ranges.
    ///
    /// An empty version list is allowed; it compiles to a decode-only command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let output = &self.output;
        check_quality("output.quality", output.quality)?;
        for (i, v) in output.versions.iter().enumerate() {
            validate_version(i, v)?;
        }
        if self.engine.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "engine.program must not be empty".into(),
            ));
        }
        if self.engine.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock config.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        log::debug!("{} not found, using stock config", path.display());
    }
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `versions.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# magick-versions configuration
# =============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output defaults
# ---------------------------------------------------------------------------
[output]
# Directory for every version (default: next to the source image).
# path = "/var/www/img"

# File name prefix for every version, e.g. "im-" -> im-photo-800.jpg
# prefix = "im-"

# Default quality (1-100) for versions that do not set their own. 80 if unset.
# quality = 80

# ---------------------------------------------------------------------------
# Versions, in pipeline order. The last one is the terminal write.
#
# Per-version keys:
#   suffix      appended to the file stem          ("-800")
#   max_width   bounding box width, required
#   max_height  bounding box height, required
#   quality     1-100, overrides [output].quality
#   aspect      "W:H" centered crop before resize ("3:2")
#   background  colour used with flatten           ("white")
#   flatten     composite transparency onto background
#   format      output extension                   ("jpg")
#   path        output directory override
#   prefix      file name prefix override
# ---------------------------------------------------------------------------
[[output.versions]]
suffix = "-full"
max_width = 1920
max_height = 1920

[[output.versions]]
suffix = "-1200"
max_width = 1200
max_height = 1200
aspect = "3:2"

[[output.versions]]
suffix = "-800"
max_width = 800
max_height = 800
aspect = "3:2"

[[output.versions]]
suffix = "-500"
max_width = 500
max_height = 500
aspect = "3:2"

[[output.versions]]
suffix = "-260"
max_width = 260
max_height = 260
aspect = "3:2"

[[output.versions]]
suffix = "-150"
max_width = 150
max_height = 150
aspect = "3:2"

[[output.versions]]
suffix = "-square-200"
max_width = 200
max_height = 200
aspect = "1:1"

[[output.versions]]
suffix = "-square-50"
max_width = 50
max_height = 50
aspect = "1:1"

# ---------------------------------------------------------------------------
# Engine
# ---------------------------------------------------------------------------
[engine]
# ImageMagick binary. Use "magick" on installs without the legacy "convert".
program = "convert"

# Kill the engine and report a timeout after this many milliseconds.
timeout_ms = 10000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum images processed in parallel (one engine process each).
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
