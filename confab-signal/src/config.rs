use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

use crate::types::MediaKind;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub signaling: SignalingConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3777,
        }
    }
}

/// Timing knobs for the coordinator's reconciliation loop.
///
/// A client demonstrates liveness only by issuing a sync request at least
/// once per `peer_stale_ms`; there is no persistent connection to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Evict a peer whose last sync is older than this (milliseconds)
    pub peer_stale_ms: u64,
    /// Staleness sweep period (milliseconds)
    pub sweep_interval_ms: u64,
    /// Producer/consumer stats refresh period (milliseconds)
    pub stats_interval_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            peer_stale_ms: 15_000,
            sweep_interval_ms: 1_000,
            stats_interval_ms: 3_000,
        }
    }
}

/// Media engine worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower bound of the RTC port range the worker may bind
    pub rtc_min_port: u16,
    /// Upper bound of the RTC port range the worker may bind
    pub rtc_max_port: u16,
    /// Address advertised in ICE candidates
    pub listen_ip: String,
    pub initial_available_outgoing_bitrate: u32,
    pub media_codecs: Vec<MediaCodec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rtc_min_port: 40_000,
            rtc_max_port: 49_999,
            listen_ip: "127.0.0.1".to_string(),
            initial_available_outgoing_bitrate: 800_000,
            media_codecs: default_media_codecs(),
        }
    }
}

/// One entry of the router codec list, passed to the engine verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCodec {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(default)]
    pub parameters: Value,
}

fn default_media_codecs() -> Vec<MediaCodec> {
    vec![
        MediaCodec {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            channels: Some(2),
            parameters: json!({}),
        },
        MediaCodec {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_string(),
            clock_rate: 90_000,
            channels: None,
            parameters: json!({}),
        },
        MediaCodec {
            kind: MediaKind::Video,
            mime_type: "video/h264".to_string(),
            clock_rate: 90_000,
            channels: None,
            parameters: json!({
                "packetization-mode": 1,
                "profile-level-id": "4d0032",
                "level-asymmetry-allowed": 1,
            }),
        },
        MediaCodec {
            kind: MediaKind::Video,
            mime_type: "video/h264".to_string(),
            clock_rate: 90_000,
            channels: None,
            parameters: json!({
                "packetization-mode": 1,
                "profile-level-id": "42e01f",
                "level-asymmetry-allowed": 1,
            }),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// "pretty" for development, "json" for production
    pub format: String,
    /// Optional log file path (appended)
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with the given file (if any) plus `CONFAB_*`
    /// environment overrides.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CONFAB")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Validate configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.rtc_min_port > self.engine.rtc_max_port {
            errors.push(format!(
                "engine.rtc_min_port ({}) exceeds engine.rtc_max_port ({})",
                self.engine.rtc_min_port, self.engine.rtc_max_port
            ));
        }
        if self.engine.media_codecs.is_empty() {
            errors.push("engine.media_codecs must not be empty".to_string());
        }
        if self.signaling.peer_stale_ms == 0 {
            errors.push("signaling.peer_stale_ms must be positive".to_string());
        }
        if self.signaling.sweep_interval_ms == 0 {
            errors.push("signaling.sweep_interval_ms must be positive".to_string());
        }
        if self.signaling.stats_interval_ms == 0 {
            errors.push("signaling.stats_interval_ms must be positive".to_string());
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            errors.push(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `CONFAB_CONFIG_PATH` environment variable (explicit path)
/// 2. `./confab.yaml` (current working directory)
/// 3. Fall back to environment variables only
pub fn load_config() -> anyhow::Result<Config> {
    let config_path = std::env::var("CONFAB_CONFIG_PATH")
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            let cwd = "confab.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        Config::from_env().unwrap_or_default()
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3777);
        assert_eq!(config.signaling.peer_stale_ms, 15_000);
        assert_eq!(config.engine.media_codecs.len(), 4);
    }

    #[test]
    fn test_inverted_port_range_rejected() {
        let mut config = Config::default();
        config.engine.rtc_min_port = 50_000;
        config.engine.rtc_max_port = 40_000;
        let errors = config.validate().expect_err("should fail validation");
        assert!(errors.iter().any(|e| e.contains("rtc_min_port")));
    }

    #[test]
    fn test_codec_wire_names() {
        let codecs = default_media_codecs();
        let json = serde_json::to_value(&codecs[0]).expect("serialize");
        assert_eq!(json["mimeType"], "audio/opus");
        assert_eq!(json["clockRate"], 48_000);
        assert_eq!(json["channels"], 2);
    }
}
