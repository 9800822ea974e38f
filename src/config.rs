//! Configuration types for the interaction runtime.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Speech capture session settings.
    pub capture: CaptureConfig,
    /// Speech playback session settings.
    pub playback: PlaybackConfig,
    /// Dialogue relay client settings.
    pub relay: RelayConfig,
    /// Dialogue relay endpoint (server side) settings.
    pub relay_server: RelayServerConfig,
    /// Reminder store settings.
    pub reminders: ReminderConfig,
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| AssistantError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Speech capture session configuration.
///
/// Every timing knob of the restart machinery lives here so tests can shrink
/// the windows instead of mocking clocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum spacing between recognition (re)start attempts, in ms.
    pub restart_cooldown_ms: u64,
    /// Delay before restarting after a normal engine end, in ms.
    pub restart_delay_ms: u64,
    /// Delay before restarting after a non-terminal engine error, in ms.
    pub error_backoff_ms: u64,
    /// Supervisory tick interval that restarts capture if it should be
    /// active but is observed idle, in ms.
    pub health_check_interval_ms: u64,
    /// Quiet period after the last partial result before the buffered text is
    /// committed, in ms.
    pub silence_commit_ms: u64,
    /// BCP-47 language tag requested from the recognizer.
    pub language: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            restart_cooldown_ms: 2_000,
            restart_delay_ms: 2_000,
            error_backoff_ms: 3_000,
            health_check_interval_ms: 5_000,
            silence_commit_ms: 1_000,
            language: "en-US".to_owned(),
        }
    }
}

impl CaptureConfig {
    /// Cooldown window as a [`Duration`].
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    /// Normal restart delay as a [`Duration`].
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Error backoff as a [`Duration`].
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Health check interval as a [`Duration`].
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Silence commit window as a [`Duration`].
    pub fn silence_commit(&self) -> Duration {
        Duration::from_millis(self.silence_commit_ms)
    }
}

/// Speech playback session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Settle delay after cancelling a prior utterance before the next one
    /// starts, in ms.
    pub cancel_settle_ms: u64,
    /// How long the reply stays on screen when synthesis is unavailable or
    /// permission was denied, in ms.
    pub permission_fallback_display_ms: u64,
    /// How long the reply stays on screen after a non-permission synthesis
    /// error, in ms.
    pub error_fallback_display_ms: u64,
    /// Silent-failure watchdog budget per character of text, in ms.
    pub watchdog_ms_per_char: u64,
    /// Minimum silent-failure watchdog timeout, in ms.
    pub watchdog_min_ms: u64,
    /// Supervisor tick that reconciles a stuck "is speaking" flag against the
    /// engine's reported state, in ms.
    pub supervisor_interval_ms: u64,
    /// Delay before capture resumes once playback completes, in ms.
    pub resume_delay_ms: u64,
    /// Preferred voice language prefix (e.g. "en-US").
    pub voice_language: String,
    /// Substring hint for the preferred voice name.
    pub voice_name_hint: String,
    /// Substring hint for the preferred voice gender marker.
    pub voice_gender_hint: String,
    /// Utterance speaking rate.
    pub rate: f32,
    /// Utterance pitch.
    pub pitch: f32,
    /// Utterance volume.
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            cancel_settle_ms: 150,
            permission_fallback_display_ms: 4_000,
            error_fallback_display_ms: 3_000,
            watchdog_ms_per_char: 100,
            watchdog_min_ms: 3_000,
            supervisor_interval_ms: 2_000,
            resume_delay_ms: 1_000,
            voice_language: "en-US".to_owned(),
            voice_name_hint: "google".to_owned(),
            voice_gender_hint: "female".to_owned(),
            rate: 1.0,
            pitch: 1.3,
            volume: 1.0,
        }
    }
}

impl PlaybackConfig {
    /// Cancel settle delay as a [`Duration`].
    pub fn cancel_settle(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_ms)
    }

    /// Supervisor tick as a [`Duration`].
    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms)
    }

    /// Resume delay as a [`Duration`].
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    /// Silent-failure watchdog timeout for a given utterance text.
    ///
    /// Scales with text length so long replies are not cut short, with a
    /// configured floor.
    pub fn watchdog_timeout(&self, text: &str) -> Duration {
        let scaled = self.watchdog_ms_per_char.saturating_mul(text.len() as u64);
        Duration::from_millis(scaled.max(self.watchdog_min_ms))
    }
}

/// Dialogue relay client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay endpoint URL.
    pub endpoint: String,
    /// Hard timeout for a relay round trip, in ms.
    pub timeout_ms: u64,
    /// Emergency game-launch dead-man timer armed whenever a launch is
    /// pending, in ms.
    pub emergency_launch_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787/api/chat".to_owned(),
            timeout_ms: 10_000,
            emergency_launch_ms: 8_000,
        }
    }
}

impl RelayConfig {
    /// Round-trip timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Emergency launch timer as a [`Duration`].
    pub fn emergency_launch(&self) -> Duration {
        Duration::from_millis(self.emergency_launch_ms)
    }
}

/// Dialogue relay endpoint configuration (server side).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    /// Bind address for the HTTP endpoint.
    pub bind_addr: String,
    /// Path to the instruction preamble file. A baked-in default is used when
    /// the file cannot be read.
    pub instructions_path: PathBuf,
    /// Upstream generative-text endpoint URL.
    pub upstream_url: String,
    /// Environment variable holding the upstream API key.
    pub api_key_env: String,
    /// Upstream call timeout, in ms.
    pub upstream_timeout_ms: u64,
    /// Sampling temperature for the upstream call.
    pub temperature: f64,
    /// Token budget for the upstream call.
    pub max_output_tokens: u32,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_owned(),
            instructions_path: PathBuf::from("chatbot-instructions.txt"),
            upstream_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-lite:generateContent".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            upstream_timeout_ms: 8_000,
            temperature: 0.7,
            max_output_tokens: 200,
        }
    }
}

impl RelayServerConfig {
    /// Upstream timeout as a [`Duration`].
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

/// Reminder store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Directory holding the reminder documents.
    pub data_dir: PathBuf,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: base.join("onerobo").join("reminders"),
        }
    }
}
