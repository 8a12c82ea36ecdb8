use anyhow::{Context, Result};
use directories::ProjectDirs;
use rtpdenoise_core::constants::BYTES_PER_SAMPLE;
use rtpdenoise_core::NoiseFilterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the replay tool, persisted as JSON.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub noise_filter: NoiseFilterConfig,
    /// PCM bytes carried by each generated RTP packet
    #[serde(default = "default_packet_bytes")]
    pub packet_bytes: usize,
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,
    #[serde(default = "default_ssrc")]
    pub ssrc: u32,
}

fn default_packet_bytes() -> usize {
    1920 // 20ms of 48kHz mono s16le
}

fn default_payload_type() -> u8 {
    111 // Dynamic audio payload type most SDPs negotiate
}

fn default_ssrc() -> u32 {
    0x5eed_0001
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            noise_filter: NoiseFilterConfig::default(),
            packet_bytes: default_packet_bytes(),
            payload_type: default_payload_type(),
            ssrc: default_ssrc(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, or from the default location when no
    /// path is given. A missing default file yields the defaults; an explicit
    /// path must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Self::read(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };
        cfg.noise_filter
            .validate()
            .context("Invalid noise filter configuration")?;
        Ok(cfg)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Saves configuration in JSON format and returns where it went.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_path().context("Could not determine config directory")?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(path)
    }

    /// Payload bytes per packet, rounded down to whole samples.
    pub fn payload_bytes(&self) -> usize {
        (self.packet_bytes & !1).max(BYTES_PER_SAMPLE)
    }
}

pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "rtpdenoise", "rtpdenoise")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rtpdenoise-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert!(!config.noise_filter.enabled);
        assert_eq!(config.packet_bytes, 1920);
        assert_eq!(config.payload_type, 111);
        assert_eq!(config.payload_bytes(), 1920);
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let json = r#"{"noise_filter":{"enabled":true}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert!(config.noise_filter.enabled);
        assert_eq!(config.noise_filter.threshold, 0.5);
        assert_eq!(config.packet_bytes, 1920);
    }

    #[test]
    fn test_payload_bytes_is_sample_aligned() {
        let odd = AppConfig {
            packet_bytes: 1001,
            ..Default::default()
        };
        assert_eq!(odd.payload_bytes(), 1000);

        let empty = AppConfig {
            packet_bytes: 0,
            ..Default::default()
        };
        assert_eq!(empty.payload_bytes(), 2);
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let path = temp_path("roundtrip.json");
        let original = AppConfig {
            noise_filter: NoiseFilterConfig {
                enabled: true,
                threshold: 0.3,
                aggressive: true,
                carry_remainder: true,
            },
            packet_bytes: 960,
            payload_type: 96,
            ssrc: 42,
        };

        let written = original.save(Some(&path)).unwrap();
        let restored = AppConfig::load(Some(&written)).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(original, restored);
    }

    #[test]
    fn test_load_rejects_invalid_threshold() {
        let path = temp_path("invalid.json");
        fs::write(&path, r#"{"noise_filter":{"threshold":2.0}}"#).unwrap();

        let result = AppConfig::load(Some(&path));
        let _ = fs::remove_file(&path);

        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        assert!(AppConfig::load(Some(&temp_path("does-not-exist.json"))).is_err());
    }
}
