use interview_core::{
    Arbitration, SyncConfig,
    presentation::PresentationConfig,
    vad::VadConfig,
};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub realtime_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub sync: SyncConfig,
}

/// Reads `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &str, default: u64) -> Result<Duration, ConfigError> {
    env_or(name, default).map(Duration::from_millis)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address: SocketAddr = env_or(
            "BIND_ADDRESS",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-10-01".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let defaults = SyncConfig::default();
        let vad = VadConfig {
            start_threshold: env_or("VAD_START_THRESHOLD", defaults.presentation.vad.start_threshold)?,
            stop_threshold: env_or("VAD_STOP_THRESHOLD", defaults.presentation.vad.stop_threshold)?,
            min_silence: millis_or("VAD_SILENCE_MS", 300)?,
        };
        if !(vad.stop_threshold < vad.start_threshold) {
            return Err(ConfigError::InvalidValue(
                "VAD_STOP_THRESHOLD".to_string(),
                format!(
                    "stop threshold {} must be below start threshold {}",
                    vad.stop_threshold, vad.start_threshold
                ),
            ));
        }

        let call_buffer_ttl = match std::env::var("CALL_BUFFER_TTL_MS") {
            Ok(_) => Some(millis_or("CALL_BUFFER_TTL_MS", 0)?),
            Err(_) => None,
        };

        let frame_interval = millis_or("FRAME_INTERVAL_MS", 16)?;
        if frame_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "FRAME_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let sync = SyncConfig {
            presentation: PresentationConfig {
                fallback_idle: millis_or("FALLBACK_IDLE_MS", 4000)?,
                vad,
                arbitration: env_or::<Arbitration>(
                    "PRESENTATION_ARBITRATION",
                    Arbitration::AudioAuthoritative,
                )?,
            },
            frame_interval,
            call_buffer_ttl,
            ..defaults
        };

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_model,
            log_level,
            prompts_path,
            sync,
        })
    }
}
