use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

fn default_max_context_size() -> usize {
    4000
}

fn default_recent_messages_count() -> usize {
    4
}

fn default_summary_interval() -> usize {
    10
}

fn default_compression_ratio() -> f64 {
    0.7
}

fn default_decay_rate() -> f64 {
    0.95
}

fn default_prune_below() -> f64 {
    0.5
}

fn default_min_strength() -> f64 {
    1.0
}

/// Optional per-message decay of the connectome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Multiplier applied to every strength and weight after each message.
    #[serde(default = "default_decay_rate")]
    pub rate: f64,
    /// Edges whose |weight| falls below this are pruned.
    #[serde(default = "default_prune_below")]
    pub prune_below: f64,
    /// Strength floor; decay never takes a node below it.
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            rate: default_decay_rate(),
            prune_below: default_prune_below(),
            min_strength: default_min_strength(),
        }
    }
}

/// Compaction policy of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget of the generation context.
    #[serde(default = "default_max_context_size")]
    pub max_context_size: usize,
    /// Trailing raw messages never folded into a summary.
    #[serde(default = "default_recent_messages_count")]
    pub recent_messages_count: usize,
    /// Messages between compactions.
    #[serde(default = "default_summary_interval")]
    pub summary_interval: usize,
    /// Target summary/input length ratio.
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: f64,
    /// Connectome decay; disabled when absent.
    #[serde(default)]
    pub decay: Option<DecayConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_size: default_max_context_size(),
            recent_messages_count: default_recent_messages_count(),
            summary_interval: default_summary_interval(),
            compression_ratio: default_compression_ratio(),
            decay: None,
        }
    }
}

impl MemoryConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let invalid = |msg: String| Err(MemoryError::InvalidConfig(msg));
        if self.summary_interval == 0 {
            return invalid("summary_interval must be at least 1".into());
        }
        if self.max_context_size == 0 {
            return invalid("max_context_size must be at least 1".into());
        }
        let ratio = self.compression_ratio;
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return invalid(format!("compression_ratio must be in (0, 1], got {ratio}"));
        }
        if let Some(decay) = self.decay {
            if !(decay.rate.is_finite() && decay.rate > 0.0 && decay.rate <= 1.0) {
                return invalid(format!("decay.rate must be in (0, 1], got {}", decay.rate));
            }
            if !(decay.prune_below.is_finite() && decay.prune_below >= 0.0) {
                return invalid(format!(
                    "decay.prune_below must be non-negative, got {}",
                    decay.prune_below
                ));
            }
            if !(decay.min_strength.is_finite() && decay.min_strength >= 0.0) {
                return invalid(format!(
                    "decay.min_strength must be non-negative, got {}",
                    decay.min_strength
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_context_size, 4000);
        assert_eq!(config.recent_messages_count, 4);
        assert_eq!(config.summary_interval, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_interval = MemoryConfig {
            summary_interval: 0,
            ..MemoryConfig::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(MemoryError::InvalidConfig(_))
        ));
        let bad_ratio = MemoryConfig {
            compression_ratio: 0.0,
            ..MemoryConfig::default()
        };
        assert!(bad_ratio.validate().is_err());
        let bad_decay = MemoryConfig {
            decay: Some(DecayConfig {
                rate: 1.2,
                ..DecayConfig::default()
            }),
            ..MemoryConfig::default()
        };
        assert!(bad_decay.validate().is_err());
    }
}
