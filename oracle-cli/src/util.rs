use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse a lowercase keyword into one of the engine's profile enums.
pub fn parse_keyword<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let key = raw.trim().to_lowercase();
    serde_json::from_value(serde_json::Value::String(key.clone()))
        .map_err(|_| format!("unrecognized value {key:?}"))
}

/// `HH:MM` on a 24-hour clock.
pub fn parse_birth_time(raw: &str) -> Result<String, String> {
    static TIME_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let raw = raw.trim();
    let valid = TIME_RE
        .get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(raw));
    if valid {
        Ok(raw.to_string())
    } else {
        Err(format!("expected HH:MM, got {raw:?}"))
    }
}

pub fn parse_birth_date(raw: &str) -> Result<String, String> {
    oracle_engine::parse_date(raw)
        .map(oracle_engine::format_date)
        .map_err(|err| err.to_string())
}
