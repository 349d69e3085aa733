//! Engine configuration.
//!
//! `EngineConfig` is loaded from TOML with per-field defaults, so a partial file
//! (or none at all) yields a usable configuration. String-keyed overrides let
//! callers adjust single fields without building a whole struct.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use strum::{AsRefStr, EnumString};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "TSUZUKI_CONFIG";

/// Lower and upper bound for the continuation retry budget.
pub const MIN_RETRIES: usize = 1;
pub const MAX_RETRIES: usize = 5;

/// Early-return from `set_field` for simple config fields.
///
/// Parses `$value` into the field's type and assigns it, returning `Ok(())`.
/// Falls through for fields not listed (handled by the caller's match block).
macro_rules! config_set_field {
    ($self:expr, $path:expr, $value:expr,
     $(bool: $($b_field:ident),* ;)?
     $(usize: $($u_field:ident),* ;)?
     $(string: $($s_field:ident),* ;)?
    ) => {
        match $path {
            $($( stringify!($b_field) => {
                $self.$b_field = $value.parse::<bool>()
                    .map_err(|_| format!("invalid bool for '{}': {}", $path, $value))?;
                return Ok(());
            }, )*)?
            $($( stringify!($u_field) => {
                $self.$u_field = $value.parse::<usize>()
                    .map_err(|_| format!("invalid usize for '{}': {}", $path, $value))?;
                return Ok(());
            }, )*)?
            $($( stringify!($s_field) => {
                $self.$s_field = $value.to_string();
                return Ok(());
            }, )*)?
            _ => {} // fall through to caller's match
        }
    };
}

/// Which truncation checks to run on each generated output.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DetectionMode {
    /// Tag balance only.
    Html,
    /// Sentence completion only.
    Sentence,
    #[default]
    Both,
}

impl DetectionMode {
    pub fn checks_html(self) -> bool {
        matches!(self, DetectionMode::Html | DetectionMode::Both)
    }

    pub fn checks_sentence(self) -> bool {
        matches!(self, DetectionMode::Sentence | DetectionMode::Both)
    }
}

/// Tunables for seam deduplication.
///
/// These are empirical values; they are exposed so callers can adjust them
/// per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OverlapConfig {
    /// Shortest normalized overlap accepted as a real duplicate.
    #[serde(default = "default_min_overlap")]
    pub min_overlap: usize,
    /// Number of leading characters of the new text considered.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Number of trailing characters of the existing text considered.
    #[serde(default = "default_existing_tail")]
    pub existing_tail: usize,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            min_overlap: default_min_overlap(),
            window: default_window(),
            existing_tail: default_existing_tail(),
        }
    }
}

// Default value functions for serde
fn default_min_overlap() -> usize {
    10
}
fn default_window() -> usize {
    80
}
fn default_existing_tail() -> usize {
    100
}
fn default_streaming_enabled() -> bool {
    true
}
fn default_max_retries() -> usize {
    3
}
fn default_seam_marker() -> String {
    "<!-- continued -->".to_string()
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Consume responses as a token stream instead of a single payload.
    #[serde(default = "default_streaming_enabled")]
    pub streaming_enabled: bool,
    /// Continuation budget per generation. Clamped to 1..=5 when read.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default)]
    pub detection_mode: DetectionMode,
    /// Insert `seam_marker` between merged continuation segments.
    #[serde(default)]
    pub show_continuation_indicator: bool,
    #[serde(default = "default_seam_marker")]
    pub seam_marker: String,
    #[serde(default)]
    pub overlap: OverlapConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            streaming_enabled: default_streaming_enabled(),
            max_retries: default_max_retries(),
            detection_mode: DetectionMode::default(),
            show_continuation_indicator: false,
            seam_marker: default_seam_marker(),
            overlap: OverlapConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `$TSUZUKI_CONFIG` if set, defaults otherwise.
    pub fn load_from_env() -> io::Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> io::Result<Self> {
        toml::from_str(content).map_err(|e| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("Failed to parse config: {}", e),
            )
        })
    }

    /// Set a field by dotted path from its string form.
    pub fn set_field(&mut self, path: &str, value: &str) -> Result<(), String> {
        config_set_field!(self, path, value,
            bool: streaming_enabled, show_continuation_indicator;
            usize: max_retries;
            string: seam_marker;
        );
        config_set_field!(self.overlap, path.strip_prefix("overlap.").unwrap_or(""), value,
            usize: min_overlap, window, existing_tail;
        );

        match path {
            "detection_mode" => {
                self.detection_mode = value
                    .parse::<DetectionMode>()
                    .map_err(|_| format!("invalid detection mode: {}", value))?;
                Ok(())
            }
            _ => Err(format!("unknown config field: {}", path)),
        }
    }

    /// Apply `(path, value)` pairs in order, stopping at the first error.
    pub fn apply_overrides_from_pairs(&mut self, pairs: &[(String, String)]) -> Result<(), String> {
        for (path, value) in pairs {
            self.set_field(path, value)?;
        }
        Ok(())
    }
}

/// Read-only view of the settings the engine consults on each generation.
pub trait ConfigProvider {
    fn streaming_enabled(&self) -> bool;

    /// Retry budget, always within `MIN_RETRIES..=MAX_RETRIES`.
    fn max_retries(&self) -> usize;

    fn detection_mode(&self) -> DetectionMode;

    fn show_continuation_indicator(&self) -> bool;

    fn seam_marker(&self) -> &str;

    fn overlap(&self) -> OverlapConfig;
}

impl ConfigProvider for EngineConfig {
    fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    fn max_retries(&self) -> usize {
        self.max_retries.clamp(MIN_RETRIES, MAX_RETRIES)
    }

    fn detection_mode(&self) -> DetectionMode {
        self.detection_mode
    }

    fn show_continuation_indicator(&self) -> bool {
        self.show_continuation_indicator
    }

    fn seam_marker(&self) -> &str {
        &self.seam_marker
    }

    fn overlap(&self) -> OverlapConfig {
        self.overlap
    }
}
