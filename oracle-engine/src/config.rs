//! Runtime configuration for the oracle services.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Environment overrides are applied after parsing and validated with the
//! rest.
use serde::{Deserialize, Serialize};

use crate::constants::{
    COMPAT_CODE_LEN, COMPAT_SESSION_TTL_SECS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, ENV_MODEL,
    ENV_TEMPERATURE, INITIAL_CREDITS, STREAK_PERIOD_DAYS, STREAK_REWARD_CREDITS,
};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    #[serde(default = "NarrativeConfig::default_model")]
    pub model: String,
    #[serde(default = "NarrativeConfig::default_temperature")]
    pub temperature: f32,
}

impl NarrativeConfig {
    #[must_use]
    pub fn default_model() -> String {
        DEFAULT_MODEL.to_string()
    }

    #[must_use]
    pub const fn default_temperature() -> f32 {
        DEFAULT_TEMPERATURE
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::RangeViolation {
                field: "narrative.temperature",
                min: 0.0,
                max: 2.0,
                value: f64::from(self.temperature),
            });
        }
        Ok(())
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            temperature: Self::default_temperature(),
        }
    }
}

/// Credit and streak rules for [`crate::ledger::UserRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "LedgerConfig::default_initial_credits")]
    pub initial_credits: u32,
    #[serde(default = "LedgerConfig::default_streak_period")]
    pub streak_period: u32,
    #[serde(default = "LedgerConfig::default_streak_reward_credits")]
    pub streak_reward_credits: u32,
}

impl LedgerConfig {
    #[must_use]
    pub const fn default_initial_credits() -> u32 {
        INITIAL_CREDITS
    }

    #[must_use]
    pub const fn default_streak_period() -> u32 {
        STREAK_PERIOD_DAYS
    }

    #[must_use]
    pub const fn default_streak_reward_credits() -> u32 {
        STREAK_REWARD_CREDITS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=366).contains(&self.streak_period) {
            return Err(ConfigError::RangeViolation {
                field: "ledger.streak_period",
                min: 1.0,
                max: 366.0,
                value: f64::from(self.streak_period),
            });
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_credits: Self::default_initial_credits(),
            streak_period: Self::default_streak_period(),
            streak_reward_credits: Self::default_streak_reward_credits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatConfig {
    #[serde(default = "CompatConfig::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "CompatConfig::default_code_len")]
    pub code_len: usize,
}

impl CompatConfig {
    #[must_use]
    pub const fn default_session_ttl_secs() -> u64 {
        COMPAT_SESSION_TTL_SECS
    }

    #[must_use]
    pub const fn default_code_len() -> usize {
        COMPAT_CODE_LEN
    }

    fn validate(&self) -> Result<(), ConfigError> {
        const MIN_TTL: u64 = 60;
        const MAX_TTL: u64 = 30 * 24 * 3600;
        if !(MIN_TTL..=MAX_TTL).contains(&self.session_ttl_secs) {
            return Err(ConfigError::RangeViolation {
                field: "compat.session_ttl_secs",
                min: 60.0,
                max: 2_592_000.0,
                value: self.session_ttl_secs as f64,
            });
        }
        if !(4..=32).contains(&self.code_len) {
            return Err(ConfigError::RangeViolation {
                field: "compat.code_len",
                min: 4.0,
                max: 32.0,
                value: self.code_len as f64,
            });
        }
        Ok(())
    }
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: Self::default_session_ttl_secs(),
            code_len: Self::default_code_len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub compat: CompatConfig,
}

impl OracleConfig {
    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::RangeViolation`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// See [`OracleConfig::apply_overrides`].
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `ORACLE_LLM_MODEL` and `ORACLE_LLM_TEMPERATURE` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when the temperature is not a
    /// number, and any validation error for the resulting config.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.narrative.model = model.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TEMPERATURE) {
            self.narrative.temperature =
                raw.trim()
                    .parse::<f32>()
                    .map_err(|_| ConfigError::InvalidEnv {
                        var: ENV_TEMPERATURE,
                        value: raw.clone(),
                    })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns the first field outside its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.narrative.validate()?;
        self.ledger.validate()?;
        self.compat.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = OracleConfig::from_json("{}").unwrap();
        assert_eq!(config, OracleConfig::default());
        assert_eq!(config.ledger.initial_credits, 3);
        assert_eq!(config.compat.code_len, 8);
        assert!((config.narrative.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = OracleConfig::from_json(r#"{"ledger": {"streak_period": 5}}"#).unwrap();
        assert_eq!(config.ledger.streak_period, 5);
        assert_eq!(config.ledger.streak_reward_credits, 2);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = OracleConfig::from_json(r#"{"compat": {"code_len": 2}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RangeViolation {
                field: "compat.code_len",
                ..
            }
        ));
        let err = OracleConfig::from_json(r#"{"ledger": {"streak_period": 0}}"#).unwrap_err();
        assert!(err.to_string().contains("ledger.streak_period"));
    }

    #[test]
    fn env_overrides_win() {
        let config = OracleConfig::default()
            .apply_overrides(|var| match var {
                ENV_MODEL => Some("local-model".to_string()),
                ENV_TEMPERATURE => Some(" 0.2 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.narrative.model, "local-model");
        assert!((config.narrative.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn unparsable_temperature_is_reported() {
        let err = OracleConfig::default()
            .apply_overrides(|var| (var == ENV_TEMPERATURE).then(|| "warm".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_TEMPERATURE, .. }));
    }
}
