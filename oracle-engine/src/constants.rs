//! Tuning constants for the oracle services.
//!
//! Ledger, compat, and model values are the defaults behind
//! [`crate::config`]. Key prefixes and cache lifetimes are fixed.

// Store keys ---------------------------------------------------------------
pub const USER_KEY_PREFIX: &str = "co:user:";
pub const COMPAT_KEY_PREFIX: &str = "co:compat:";
pub const DIVINE_KEY_PREFIX: &str = "co:divine:";

// Ledger -------------------------------------------------------------------
pub const INITIAL_CREDITS: u32 = 3;
pub const STREAK_PERIOD_DAYS: u32 = 7;
pub const STREAK_REWARD_CREDITS: u32 = 2;

// Compatibility sessions ---------------------------------------------------
pub const COMPAT_SESSION_TTL_SECS: u64 = 24 * 3600;
pub const COMPAT_CODE_LEN: usize = 8;

// Narrative ----------------------------------------------------------------
pub const DEFAULT_MODEL: &str = "oracle-narrator";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DAILY_CACHE_TTL_SECS: u64 = 24 * 3600;
pub const READING_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

// Environment overrides ----------------------------------------------------
pub const ENV_MODEL: &str = "ORACLE_LLM_MODEL";
pub const ENV_TEMPERATURE: &str = "ORACLE_LLM_TEMPERATURE";
