//! Gate configuration.
//!
//! On a page the settings arrive as a localized-script JSON blob or as meta
//! tags, where WordPress hands every scalar over as a string. The native
//! replay tool reads the same structure from `config.toml`.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::{ConfigError, LogOnError};
use crate::selectors::SelectorTable;

// ==================== Limits ====================

/// Upper bound for the settle delay; longer waits turn into polling
pub const MAX_SETTLE_DELAY_MS: u32 = 250;

/// Bounds for the fallback rescan interval when observation is unavailable
pub const MIN_RESCAN_INTERVAL_MS: u32 = 250;
pub const MAX_RESCAN_INTERVAL_MS: u32 = 5000;

/// Prefix of the page meta tags the gate reads
pub const META_PREFIX: &str = "answer-gate:";

/// Default log filter for the native binary
pub const DEFAULT_LOG_FILTER: &str = "answer_gate=debug";

// ==================== Gate configuration ====================

/// Per-quiz gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
  /// An incorrect answer blocks progression until the hint is viewed
  #[serde(deserialize_with = "bool_like", alias = "forceHintMode", alias = "force_hint")]
  pub force_hint_mode: bool,
  /// Hide Next until the policy allows it; when false the engine owns Next
  #[serde(deserialize_with = "bool_like", alias = "requireCorrectForNext")]
  pub require_correct_for_next: bool,
  /// Emit progress events for the sidebar panel
  #[serde(deserialize_with = "bool_like", alias = "sidebarEnabled")]
  pub sidebar_enabled: bool,
  #[serde(deserialize_with = "u32_like", alias = "settleDelayMs")]
  pub settle_delay_ms: u32,
  #[serde(deserialize_with = "u32_like", alias = "rescanIntervalMs")]
  pub rescan_interval_ms: u32,
  /// Identify questions by DOM position when the engine gives no id
  #[serde(deserialize_with = "bool_like", alias = "positionFallback")]
  pub position_fallback: bool,
  #[serde(alias = "correctPhrases")]
  pub correct_phrases: Vec<String>,
  #[serde(alias = "incorrectPhrases")]
  pub incorrect_phrases: Vec<String>,
  #[serde(alias = "tryAgainText")]
  pub try_again_text: String,
  #[serde(alias = "hintRequiredText")]
  pub hint_required_text: String,
  pub selectors: SelectorTable,
}

impl Default for GateConfig {
  fn default() -> Self {
    Self {
      force_hint_mode: false,
      require_correct_for_next: true,
      sidebar_enabled: false,
      settle_delay_ms: 40,
      rescan_interval_ms: 1000,
      position_fallback: true,
      correct_phrases: vec!["correct".into(), "נכון".into()],
      incorrect_phrases: vec![
        "incorrect".into(),
        "wrong".into(),
        "לא נכון".into(),
        "שגוי".into(),
      ],
      try_again_text: "Not quite. Choose another answer and check again.".into(),
      hint_required_text: "Please open the hint before moving on.".into(),
      selectors: SelectorTable::default(),
    }
  }
}

impl GateConfig {
  /// Parse the page-embedded settings blob.
  pub fn from_settings_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Apply `answer-gate:*` meta tags on top of the defaults.
  ///
  /// Unknown names are ignored; unparseable values are logged and skipped.
  pub fn from_meta_tags<I, K, V>(tags: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut config = Self::default();
    for (name, content) in tags {
      let Some(key) = name.as_ref().strip_prefix(META_PREFIX) else {
        continue;
      };
      let content = content.as_ref();
      let flag = |target: &mut bool| match parse_bool_like(content) {
        Some(value) => *target = value,
        None => tracing::warn!("Ignoring meta {}{}: not a boolean: {:?}", META_PREFIX, key, content),
      };
      match key {
        "force-hint" => flag(&mut config.force_hint_mode),
        "require-correct" => flag(&mut config.require_correct_for_next),
        "sidebar" => flag(&mut config.sidebar_enabled),
        "position-fallback" => flag(&mut config.position_fallback),
        "settle-delay" => match content.trim().parse() {
          Ok(ms) => config.settle_delay_ms = ms,
          Err(_) => tracing::warn!("Ignoring meta {}settle-delay: {:?}", META_PREFIX, content),
        },
        "try-again-text" => config.try_again_text = content.to_string(),
        "hint-required-text" => config.hint_required_text = content.to_string(),
        _ => {}
      }
    }
    config
  }

  /// Settle delay actually used, bounded so it never becomes a poll.
  pub fn settle_delay(&self) -> u32 {
    self.settle_delay_ms.min(MAX_SETTLE_DELAY_MS)
  }

  /// Fallback rescan period actually used.
  pub fn rescan_interval(&self) -> u32 {
    self
      .rescan_interval_ms
      .clamp(MIN_RESCAN_INTERVAL_MS, MAX_RESCAN_INTERVAL_MS)
  }
}

// ==================== WordPress scalar coercion ====================

/// Parse the boolean spellings WordPress localization produces.
pub fn parse_bool_like(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" | "" => Some(false),
    _ => None,
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
  Bool(bool),
  Int(i64),
  Text(String),
}

fn bool_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
  match BoolLike::deserialize(deserializer)? {
    BoolLike::Bool(b) => Ok(b),
    BoolLike::Int(n) => Ok(n != 0),
    BoolLike::Text(s) => parse_bool_like(&s)
      .ok_or_else(|| serde::de::Error::custom(format!("not a boolean: {:?}", s))),
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U32Like {
  Int(u32),
  Text(String),
}

fn u32_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
  match U32Like::deserialize(deserializer)? {
    U32Like::Int(n) => Ok(n),
    U32Like::Text(s) => s
      .trim()
      .parse()
      .map_err(|_| serde::de::Error::custom(format!("not a number: {:?}", s))),
  }
}

// ==================== config.toml ====================

/// Configuration file structure for config.toml
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
  gate: Option<GateConfig>,
  logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
  filter: Option<String>,
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
  if !path.exists() {
    return Ok(None);
  }
  let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.display().to_string(),
    source,
  })?;
  Ok(Some(toml::from_str(&contents)?))
}

/// Load gate settings with priority: config.toml > .env > default
pub fn load_gate_config(path: &Path) -> GateConfig {
  // Load .env file if present
  let _ = dotenvy::dotenv();

  // Priority 1: config.toml
  let file = read_file_config(path).log_warn(&format!("Ignoring {}", path.display()));
  if let Some(Some(FileConfig { gate: Some(gate), .. })) = file {
    tracing::info!("Using gate settings from {}", path.display());
    return gate;
  }

  // Priority 2: environment
  let mut config = GateConfig::default();
  let mut from_env = false;
  if let Some(value) = env_flag("ANSWER_GATE_FORCE_HINT") {
    config.force_hint_mode = value;
    from_env = true;
  }
  if let Some(value) = env_flag("ANSWER_GATE_REQUIRE_CORRECT") {
    config.require_correct_for_next = value;
    from_env = true;
  }
  if from_env {
    tracing::info!("Using gate settings from environment");
  } else {
    tracing::info!("Using default gate settings");
  }
  config
}

fn env_flag(name: &str) -> Option<bool> {
  std::env::var(name).ok().and_then(|raw| parse_bool_like(&raw))
}

/// Log filter with priority: RUST_LOG > config.toml > default
pub fn log_filter(path: &Path) -> String {
  if let Ok(filter) = std::env::var("RUST_LOG") {
    return filter;
  }
  read_file_config(path)
    .ok()
    .flatten()
    .and_then(|c| c.logging)
    .and_then(|l| l.filter)
    .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}
