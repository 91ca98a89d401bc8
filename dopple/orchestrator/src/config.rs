use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use dopple_connectome::{AnalyticsThresholds, ConnectomeLimits, NodeType};
use dopple_memory_data::MemoryConfig;
use dopple_nlp::AnalyzerConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoppleConfig {
    /// Strength and weight bounds.
    pub connectome: ConnectomeLimits,
    /// Clustering and insight thresholds.
    pub analytics: AnalyticsThresholds,
    /// Lexicon analyzer scaling.
    pub analyzer: AnalyzerConfig,
    /// Compaction policy.
    pub memory: MemoryConfig,
    /// Generation backend settings.
    pub generation: GenerationConfig,
    /// Persona frame composition.
    pub persona: PersonaConfig,
    /// Log and event sinks.
    pub logging: LoggingConfig,
}

impl DoppleConfig {
    /// Loads and validates a TOML document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading dopple config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.logging.resolve_relative(&source_dir);
        Ok(config)
    }

    /// Parses and validates a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let limits = self.connectome;
        if !(limits.max_strength.is_finite() && limits.max_strength > 0.0) {
            bail!("connectome.max_strength must be positive");
        }
        if !(limits.max_edge_weight.is_finite() && limits.max_edge_weight > 0.0) {
            bail!("connectome.max_edge_weight must be positive");
        }
        if self.analyzer.entity_scale < 0.0 || self.analyzer.edge_scale < 0.0 {
            bail!("analyzer scales must be non-negative");
        }
        self.memory.validate().context("invalid [memory] section")?;
        self.generation.validate()?;
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

/// Generation backend settings. Without an endpoint the offline loopback
/// backend is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// HTTP endpoint accepting `{prompt, max_tokens, temperature, top_p}`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the `x-api-key` value.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub bearer_token_env: Option<String>,
    /// Deadline of one generation call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Completion length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling mass.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            bearer_token_env: None,
            timeout_ms: default_timeout_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

impl GenerationConfig {
    /// Deadline as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("generation.timeout_ms must be at least 1");
        }
        if self.max_tokens == 0 {
            bail!("generation.max_tokens must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("generation.temperature must be within [0, 2], got {}", self.temperature);
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            bail!("generation.top_p must be within (0, 1], got {}", self.top_p);
        }
        Ok(())
    }
}

/// How many top nodes per type feed the persona frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Traits listed.
    pub traits: usize,
    /// Interests listed.
    pub interests: usize,
    /// Emotions listed.
    pub emotions: usize,
    /// Values listed.
    pub values: usize,
    /// Topic suggestions appended to the frame.
    pub recommended_topics: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            traits: 3,
            interests: 3,
            emotions: 3,
            values: 2,
            recommended_topics: 2,
        }
    }
}

impl PersonaConfig {
    /// Top-k for one node type.
    #[must_use]
    pub const fn k(&self, node_type: NodeType) -> usize {
        match node_type {
            NodeType::Trait => self.traits,
            NodeType::Interest => self.interests,
            NodeType::Emotion => self.emotions,
            NodeType::Value => self.values,
        }
    }
}

/// JSON-lines sinks. Relative paths resolve against the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Structured log file.
    pub log_path: Option<PathBuf>,
    /// Event log file.
    pub event_log_path: Option<PathBuf>,
}

impl LoggingConfig {
    fn resolve_relative(&mut self, base: &Path) {
        for path in [&mut self.log_path, &mut self.event_log_path]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
