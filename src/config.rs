//! Compression options and configuration files.
//!
//! Options are layered: stock defaults, then the process-wide defaults set
//! with [`set_defaults`], then a `pixpress.toml` file, then per-call
//! overrides ([`PartialOptions`], e.g. from CLI flags). Each layer is a
//! sparse TOML table merged over the previous one with [`merge_toml`]; the
//! result is deserialized once and validated. A resolved [`CompressOptions`]
//! is never mutated afterwards.
//!
//! ## Configuration file
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [compress]
//! strict = true              # Keep the original if the output is not smaller
//! check_orientation = true   # Apply and reset the Exif orientation (JPEG only)
//! retain_exif = false        # Copy Exif segments into JPEG output
//! # max_width = 1920         # Upper bounds (omit for unbounded)
//! # max_height = 1080
//! min_width = 0.0
//! min_height = 0.0
//! # width = 800              # Requested size
//! # height = 600
//! resize = "none"            # none | contain | cover
//! quality = 0.8              # Lossy quality, 0.0-1.0
//! mime_type = "auto"         # Output type, "auto" keeps the input type
//! convert_types = ["image/png"]
//! convert_size = 5000000     # Bytes; larger inputs of convert_types become JPEG
//!
//! [processing]
//! # max_concurrent = 4       # Parallel pipelines (omit for CPU cores)
//! ```
//!
//! Unknown keys are rejected.

use crate::imaging::{Quality, ResizeMode, SizeConstraints, is_image_type};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{LazyLock, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Options for one compression run.
///
/// All fields have defaults matching [`CompressOptions::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressOptions {
    /// Keep the original bytes when the output is not smaller.
    pub strict: bool,
    /// Read and reset the Exif orientation of JPEG input.
    pub check_orientation: bool,
    /// Carry APP1 segments over into JPEG output.
    pub retain_exif: bool,
    /// `None` or a non-positive value means unbounded.
    pub max_width: Option<f64>,
    pub max_height: Option<f64>,
    pub min_width: f64,
    pub min_height: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub resize: ResizeMode,
    pub quality: Quality,
    /// Output mime type. Anything that is not `image/*` (`"auto"`) keeps the
    /// input's type.
    pub mime_type: String,
    /// Input types converted to JPEG once they exceed `convert_size`.
    pub convert_types: Vec<String>,
    pub convert_size: u64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            strict: true,
            check_orientation: true,
            retain_exif: false,
            max_width: None,
            max_height: None,
            min_width: 0.0,
            min_height: 0.0,
            width: None,
            height: None,
            resize: ResizeMode::None,
            quality: Quality::default(),
            mime_type: "auto".to_string(),
            convert_types: vec!["image/png".to_string()],
            convert_size: 5_000_000,
        }
    }
}

fn check_size(name: &str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ConfigError::Validation(format!(
            "{name} must be a non-negative number, got {v}"
        ))),
        _ => Ok(()),
    }
}

impl CompressOptions {
    /// Validate option values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_size("max_width", self.max_width)?;
        check_size("max_height", self.max_height)?;
        check_size("min_width", Some(self.min_width))?;
        check_size("min_height", Some(self.min_height))?;
        check_size("width", self.width)?;
        check_size("height", self.height)?;

        let quality = self.quality.value();
        if !(0.0..=1.0).contains(&quality) {
            return Err(ConfigError::Validation(format!(
                "quality must be 0.0-1.0, got {quality}"
            )));
        }
        if self.mime_type != "auto" && !is_image_type(&self.mime_type) {
            return Err(ConfigError::Validation(format!(
                "mime_type must be \"auto\" or an image type, got {:?}",
                self.mime_type
            )));
        }
        if let Some(bad) = self.convert_types.iter().find(|t| !is_image_type(t)) {
            return Err(ConfigError::Validation(format!(
                "convert_types entries must be image types, got {bad:?}"
            )));
        }
        Ok(())
    }

    /// Sizing constraints for the geometry planner.
    pub fn constraints(&self) -> SizeConstraints {
        SizeConstraints {
            max_width: self.max_width.unwrap_or(f64::INFINITY),
            max_height: self.max_height.unwrap_or(f64::INFINITY),
            min_width: self.min_width,
            min_height: self.min_height,
            width: self.width,
            height: self.height,
            resize: self.resize,
        }
    }
}

// =========================================================================
// Process-wide defaults
// =========================================================================

static DEFAULTS: LazyLock<RwLock<CompressOptions>> =
    LazyLock::new(|| RwLock::new(CompressOptions::default()));

/// Current process-wide default options.
pub fn defaults() -> CompressOptions {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide default options.
///
/// Runs already holding resolved options are unaffected.
pub fn set_defaults(options: CompressOptions) -> Result<(), ConfigError> {
    options.validate()?;
    log::debug!("process-wide defaults replaced");
    *DEFAULTS.write().unwrap_or_else(PoisonError::into_inner) = options;
    Ok(())
}

/// Restore the stock defaults.
pub fn reset_defaults() {
    *DEFAULTS.write().unwrap_or_else(PoisonError::into_inner) = CompressOptions::default();
}

// =========================================================================
// Overrides
// =========================================================================

/// Sparse per-call overrides; `None` keeps the underlying value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_orientation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_exif: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_size: Option<u64>,
}

impl PartialOptions {
    /// Merge these overrides over `base`, then validate.
    pub fn merge_over(&self, base: &CompressOptions) -> Result<CompressOptions, ConfigError> {
        let base = toml::Value::try_from(base)?;
        let overlay = toml::Value::try_from(self)?;
        resolve_options(base, Some(overlay))
    }

    /// Merge these overrides over the process-wide defaults.
    pub fn resolve(&self) -> Result<CompressOptions, ConfigError> {
        self.merge_over(&defaults())
    }
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

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_options(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CompressOptions, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let options: CompressOptions = merged.try_into()?;
    options.validate()?;
    Ok(options)
}

// =========================================================================
// Configuration file
// =========================================================================

/// Parallelism settings for the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pipelines running at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_concurrent: Option<usize>,
}

/// Resolve the effective pipeline concurrency.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least 1
pub fn effective_concurrency(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_concurrent
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Contents of a `pixpress.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub compress: CompressOptions,
    pub processing: ProcessingConfig,
}

/// The process-wide defaults as a `toml::Value::Table`, shaped like a
/// config file. Base layer for [`load_config`].
pub fn defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(FileConfig {
        compress: defaults(),
        processing: ProcessingConfig::default(),
    })?)
}

/// Load a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load `path` and merge it over the process-wide defaults.
///
/// Rejects unknown keys and validates the result.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let merged = merge_toml(defaults_value()?, load_raw_config(path)?);
    let config: FileConfig = merged.try_into()?;
    config.compress.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `pixpress.toml` with all keys.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixpress configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.
#
# Command-line flags override values from this file.

# ---------------------------------------------------------------------------
# Compression
# ---------------------------------------------------------------------------
[compress]
# Keep the original file when the compressed output is not smaller.
strict = true

# Read the Exif orientation of JPEG input, draw the image upright and
# reset the tag to 1.
check_orientation = true

# Copy the input's Exif (APP1) segments into JPEG output.
retain_exif = false

# Upper bounds on the output size in pixels. Omit for unbounded.
# max_width = 1920
# max_height = 1080

# Lower bounds on the output size in pixels.
min_width = 0.0
min_height = 0.0

# Requested output size. With only one side set the other follows the
# aspect ratio.
# width = 800
# height = 600

# How width and height combine when both are set:
#   "none"    - treat them as bounds on the natural aspect ratio
#   "contain" - output is exactly width x height, image letterboxed inside
#   "cover"   - output is exactly width x height, overflow cropped
resize = "none"

# Lossy encoding quality (0.0 = worst, 1.0 = best).
quality = 0.8

# Output type, e.g. "image/webp". "auto" keeps the input type.
mime_type = "auto"

# Inputs of these types larger than convert_size (bytes) are written as JPEG.
convert_types = ["image/png"]
convert_size = 5000000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of images compressed at once.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_concurrent = 4
"##
}
