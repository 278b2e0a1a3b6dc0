use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Stream width assumed until the caster sends a `VideoDimension` frame
pub const DEFAULT_WIDTH: u32 = 3840;
/// Stream height assumed until the caster sends a `VideoDimension` frame
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Sample rate assumed until the caster sends an `AudioSampleRate` frame
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

const DEFAULT_CODEC: &str = "h264";
const DEFAULT_READ_CHUNK: usize = 16 * 1024;
const DEFAULT_TICK_MS: u64 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Session values used before the first control frame overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub width: u32,
    pub height: u32,
    pub audio_sample_rate: u32,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            audio_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decoder name as known to the codec library
    pub codec: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_CODEC.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub session: SessionDefaults,
    pub decoder: DecoderConfig,
    /// Bytes read from the input per delivery
    pub read_chunk_size: usize,
    /// Interval between dispatch ticks, in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            session: SessionDefaults::default(),
            decoder: DecoderConfig::default(),
            read_chunk_size: DEFAULT_READ_CHUNK,
            tick_interval_ms: DEFAULT_TICK_MS,
        }
    }
}

impl ReceiverConfig {
    /// Loads a JSON config; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Returns a version as specified in Cargo.toml
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReceiverConfig::default();
        assert_eq!(config.session.width, 3840);
        assert_eq!(config.session.height, 1080);
        assert_eq!(config.session.audio_sample_rate, 48_000);
        assert_eq!(config.decoder.codec, "h264");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ReceiverConfig::from_json(
            r#"{ "session": { "width": 1280 }, "decoder": { "codec": "hevc" }, "tick_interval_ms": 0 }"#,
        )
        .unwrap();

        assert_eq!(config.session.width, 1280);
        assert_eq!(config.session.height, DEFAULT_HEIGHT);
        assert_eq!(config.decoder.codec, "hevc");
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK);
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ReceiverConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
