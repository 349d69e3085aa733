use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::Deserialize;
use tsuzuki_core::{EngineConfig, PromptInputs};

/// Environment variable consulted when `api_key` is not given.
pub const API_KEY_ENV: &str = "TSUZUKI_API_KEY";

fn default_endpoint() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// JSON-mode input -- read from stdin, stateless per invocation.
///
/// Config priority (highest → lowest):
/// `overrides` > `config` > `$TSUZUKI_CONFIG` file > defaults
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JsonInput {
    /// Prompt and sampling parameters
    #[serde(flatten)]
    pub prompt: PromptInputs,
    /// OpenAI-compatible chat completions URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token; falls back to `$TSUZUKI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout, covering the whole response body
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Typed engine config (replaces the config file when present)
    #[serde(default)]
    pub config: Option<EngineConfig>,
    /// String-keyed overrides (highest priority, freeform escape hatch)
    #[serde(default)]
    pub overrides: Option<BTreeMap<String, String>>,
    /// Also append engine events to this JSONL file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl JsonInput {
    pub fn parse(json: &str) -> io::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            io::Error::new(ErrorKind::InvalidInput, format!("Invalid JSON input: {}", e))
        })
    }

    /// Build the effective engine config.
    pub fn resolve_config(&self) -> io::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(config) => config.clone(),
            None => EngineConfig::load_from_env()?,
        };
        if let Some(overrides) = &self.overrides {
            let pairs: Vec<(String, String)> = overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            config
                .apply_overrides_from_pairs(&pairs)
                .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        }
        Ok(config)
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }
}
