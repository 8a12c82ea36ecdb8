//! Noise filter configuration and the shared, hot-swappable snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be within 0.0..=1.0, got {0}")]
    ThresholdOutOfRange(f32),
}

/// Noise suppression settings. Suppression is opt-in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoiseFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Voice activity threshold (0.0-1.0) handed to the engine per frame
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Reserved for stronger suppression. Carried, not applied yet.
    #[serde(default)]
    pub aggressive: bool,
    /// Keep partial frames buffered for the next packet instead of
    /// flushing them unprocessed at the end of each payload.
    #[serde(default)]
    pub carry_remainder: bool,
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            aggressive: false,
            carry_remainder: false,
        }
    }
}

impl NoiseFilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        Ok(())
    }
}

/// Process-wide configuration. Readers take an immutable snapshot once per
/// stream bind; writers publish a replacement that only future binds see.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<NoiseFilterConfig>>>,
}

impl SharedConfig {
    pub fn new(config: NoiseFilterConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<NoiseFilterConfig> {
        self.inner.read().clone()
    }

    pub fn publish(&self, config: NoiseFilterConfig) {
        *self.inner.write() = Arc::new(config);
    }
}
