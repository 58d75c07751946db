//! Shared types for the compile → invoke flow.
//!
//! These types are deserialized from `versions.toml` and serialized back as
//! the `run --json` result, so field names are part of the file format.

use crate::imaging::Quality;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A source image with its known (already oriented) dimensions.
///
/// Owned by the caller; the compiler only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl ImageDescriptor {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }
}

/// One requested derivative of a source image.
///
/// `resolved_path` is an output field: the compiler fills it in for every
/// version it emits a stage for. Recompiling the same version with the same
/// image and defaults always produces the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionSpec {
    /// Appended to the source file stem (`-800` → `photo-800.jpg`).
    #[serde(default)]
    pub suffix: String,
    pub max_width: u32,
    pub max_height: u32,
    /// Encoding quality 1–100. Falls back to the output default, then 80.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    /// Centered crop ratio applied before resizing, e.g. `"3:2"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    /// Background colour, used when flattening transparency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub flatten: bool,
    /// Output format extension without the dot (`"png"`); keeps the source extension when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Output directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
}

impl VersionSpec {
    /// A version with only a suffix and size bounds set.
    pub fn new(suffix: impl Into<String>, max_width: u32, max_height: u32) -> Self {
        Self {
            suffix: suffix.into(),
            max_width,
            max_height,
            quality: None,
            aspect: None,
            background: None,
            flatten: false,
            format: None,
            path: None,
            prefix: None,
            resolved_path: None,
        }
    }

    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspect = Some(aspect.into());
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Version quality, else the pipeline default, else 80.
    pub fn effective_quality(&self, defaults: &PipelineDefaults<'_>) -> Quality {
        self.quality
            .map(Quality::new)
            .or(defaults.quality)
            .unwrap_or_default()
    }
}

/// Output-level settings applied to versions that do not set their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineDefaults<'a> {
    pub directory: Option<&'a Path>,
    pub prefix: Option<&'a str>,
    pub quality: Option<Quality>,
}

/// The invoker's input: output defaults plus the ordered version list.
///
/// ```toml
/// [output]
/// path = "/var/www/img"   # optional directory for every version
/// prefix = "im-"          # optional file name prefix
/// quality = 85            # optional default quality
///
/// [[output.versions]]
/// suffix = "-800"
/// max_width = 800
/// max_height = 800
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    pub versions: Vec<VersionSpec>,
}

impl Output {
    pub fn new(versions: Vec<VersionSpec>) -> Self {
        Self {
            versions,
            ..Self::default()
        }
    }

    /// Borrow the defaults and the version list at the same time.
    pub fn split(&mut self) -> (PipelineDefaults<'_>, &mut [VersionSpec]) {
        let defaults = PipelineDefaults {
            directory: self.path.as_deref(),
            prefix: self.prefix.as_deref(),
            quality: self.quality.map(Quality::new),
        };
        (defaults, &mut self.versions)
    }

    /// Clear every `resolved_path` so the list can be compiled afresh.
    pub fn reset(&mut self) {
        for v in &mut self.versions {
            v.resolved_path = None;
        }
    }
}
