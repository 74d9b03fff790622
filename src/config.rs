//! Configuration loading and management

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional JSON config file
pub const CONFIG_PATH_ENV: &str = "STT_LINK_CONFIG";

/// Audio stream parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Wire encoding (e.g. "pcm_s16le", "pcm_mulaw")
    pub encoding: String,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            encoding: "pcm_s16le".to_string(),
            channels: 1,
        }
    }
}

/// Parameters forwarded to the transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub language: String,
    pub punctuate: bool,
    pub speaker_labels: bool,
    pub confidence_threshold: f32,
    /// Vocabulary hints
    pub word_boost: Vec<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: "en_us".to_string(),
            punctuate: true,
            speaker_labels: false,
            confidence_threshold: 0.0,
            word_boost: Vec::new(),
        }
    }
}

/// Buffering and batching knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub buffer_size: usize,
    /// Capacity of the disconnected-audio queue, in chunks
    pub max_queue_size: usize,
    /// When false, audio sent while disconnected is rejected instead of queued
    pub enable_batching: bool,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4_096,
            max_queue_size: 100,
            enable_batching: true,
            batch_size: 10,
            batch_timeout_ms: 100,
        }
    }
}

/// Client configuration
///
/// Supplied pre-validated; the client never range-checks it and only replaces
/// it through [`ConfigUpdate`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_url: String,
    pub websocket_url: String,
    pub connection_timeout_ms: u64,
    pub max_retries: u32,
    /// Initial retry delay
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub performance: PerformanceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.assemblyai.com".to_string(),
            websocket_url: "wss://api.assemblyai.com/v2/realtime/ws".to_string(),
            connection_timeout_ms: 10_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            audio: AudioConfig::default(),
            transcription: TranscriptionConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

// The API key never reaches logs through `{:?}`.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &format_args!("<{} chars>", self.api_key.len()))
            .field("api_url", &self.api_url)
            .field("websocket_url", &self.websocket_url)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .field("audio", &self.audio)
            .field("transcription", &self.transcription)
            .field("performance", &self.performance)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from an optional JSON file and the environment
    ///
    /// `STT_LINK_CONFIG` may name a JSON file; `STT_LINK_*` variables then
    /// override individual fields.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_json_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid client configuration")
    }

    /// Apply `STT_LINK_*` overrides resolved through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            raw.trim()
                .parse()
                .with_context(|| format!("invalid value for {name}: {raw:?}"))
        }

        macro_rules! override_field {
            ($name:literal, $field:expr) => {
                if let Some(raw) = lookup($name) {
                    $field = parse($name, raw)?;
                }
            };
        }

        if let Some(key) = lookup("STT_LINK_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = lookup("STT_LINK_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("STT_LINK_WEBSOCKET_URL") {
            self.websocket_url = url;
        }
        if let Some(language) = lookup("STT_LINK_LANGUAGE") {
            self.transcription.language = language;
        }
        override_field!("STT_LINK_CONNECTION_TIMEOUT_MS", self.connection_timeout_ms);
        override_field!("STT_LINK_MAX_RETRIES", self.max_retries);
        override_field!("STT_LINK_RETRY_DELAY_MS", self.retry_delay_ms);
        override_field!("STT_LINK_MAX_RETRY_DELAY_MS", self.max_retry_delay_ms);
        override_field!("STT_LINK_SAMPLE_RATE", self.audio.sample_rate);
        override_field!("STT_LINK_MAX_QUEUE_SIZE", self.performance.max_queue_size);
        override_field!("STT_LINK_ENABLE_BATCHING", self.performance.enable_batching);

        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Redacted view safe to expose in health reports
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            api_url: self.api_url.clone(),
            websocket_url: self.websocket_url.clone(),
            api_key_present: !self.api_key.is_empty(),
            api_key_length: self.api_key.len(),
            connection_timeout_ms: self.connection_timeout_ms,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            sample_rate: self.audio.sample_rate,
            encoding: self.audio.encoding.clone(),
            channels: self.audio.channels,
            language: self.transcription.language.clone(),
            max_queue_size: self.performance.max_queue_size,
            enable_batching: self.performance.enable_batching,
        }
    }
}

/// Partial configuration update
///
/// Every field that is `Some` replaces the current value wholesale; nested
/// sections are swapped as a unit, not merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub websocket_url: Option<String>,
    pub connection_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub audio: Option<AudioConfig>,
    pub transcription: Option<TranscriptionConfig>,
    pub performance: Option<PerformanceConfig>,
}

impl ConfigUpdate {
    pub fn apply_to(self, config: &mut ClientConfig) {
        let update = self;

        macro_rules! replace {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = update.$field {
                        config.$field = value;
                    }
                )*
            };
        }

        replace!(
            api_key,
            api_url,
            websocket_url,
            connection_timeout_ms,
            max_retries,
            retry_delay_ms,
            max_retry_delay_ms,
            audio,
            transcription,
            performance,
        );
    }
}

/// Configuration as reported by health checks; the API key is never included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub api_url: String,
    pub websocket_url: String,
    pub api_key_present: bool,
    pub api_key_length: usize,
    pub connection_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub sample_rate: u32,
    pub encoding: String,
    pub channels: u16,
    pub language: String,
    pub max_queue_size: usize,
    pub enable_batching: bool,
}
