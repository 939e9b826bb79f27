//! Seed composition.
//!
//! Every draw in the engine is keyed by a [`Seed`]. The base seed comes from
//! [`compose_seed`]; features then salt it through [`compose_scoped_seed`] or
//! [`compose_pick_seed`] so the inputs that separate two draws live in one
//! place.
use serde::{Deserialize, Serialize};
use std::fmt;

const FIELD_SEP: char = '|';

/// Opaque seed string. Identical seeds reproduce identical draws.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(String);

impl Seed {
    /// Wrap an already composed seed, e.g. one read back from a share link.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Seed {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Good,
    Ok,
    Bad,
}

impl SleepQuality {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Ok => "ok",
            Self::Bad => "bad",
        }
    }
}

/// Three-step self report used for stress and mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Mid,
    High,
}

impl Level {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherKind {
    Sunny,
    Cloudy,
    Rain,
    Snow,
    Wind,
    Fog,
    Hot,
    Cold,
}

impl WeatherKind {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::Cloudy => "cloudy",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Wind => "wind",
            Self::Fog => "fog",
            Self::Hot => "hot",
            Self::Cold => "cold",
        }
    }
}

/// Optional personalization folded into the base seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub sleep: Option<SleepQuality>,
    pub stress: Option<Level>,
    pub mood: Option<Level>,
    pub weather: Option<WeatherKind>,
    pub birth_date: Option<String>,
    pub birth_time: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set fields in their fixed seed order.
    fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = Vec::with_capacity(6);
        if let Some(sleep) = self.sleep {
            fields.push(("sleep", sleep.key()));
        }
        if let Some(stress) = self.stress {
            fields.push(("stress", stress.key()));
        }
        if let Some(mood) = self.mood {
            fields.push(("mood", mood.key()));
        }
        if let Some(weather) = self.weather {
            fields.push(("weather", weather.key()));
        }
        if let Some(birth) = self.birth_date.as_deref() {
            fields.push(("birth", birth));
        }
        if let Some(time) = self.birth_time.as_deref() {
            fields.push(("time", time));
        }
        fields
    }
}

/// Percent-escape the characters that carry structure in a seed.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
    out
}

fn push_field(buf: &mut String, key: &str, value: &str) {
    if !buf.is_empty() {
        buf.push(FIELD_SEP);
    }
    buf.push_str(key);
    buf.push('=');
    buf.push_str(&escape(value));
}

/// Build the base seed for one device on one date.
///
/// Fields appear as `d, date, sleep, stress, mood, weather, birth, time`;
/// unset profile fields are left out entirely.
#[must_use]
pub fn compose_seed(device_id: &str, date: &str, profile: &Profile) -> Seed {
    let mut buf = String::new();
    push_field(&mut buf, "d", device_id);
    push_field(&mut buf, "date", date);
    for (key, value) in profile.fields() {
        push_field(&mut buf, key, value);
    }
    Seed(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatRole {
    A,
    B,
}

impl CompatRole {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

/// Which feature a draw belongs to.
///
/// `nonce` is the only way per-request entropy (a timestamp, a reroll
/// counter) reaches a draw; leaving it `None` makes the feature repeatable
/// for the day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum DrawScope {
    Daily,
    Spread {
        spread_id: String,
        nonce: Option<String>,
    },
    Topic {
        topic_id: String,
        question: Option<String>,
        nonce: Option<String>,
    },
    Dream,
    Compat {
        topic_id: String,
        role: CompatRole,
        nonce: Option<String>,
    },
}

impl DrawScope {
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Spread { .. } => "spread",
            Self::Topic { .. } => "topic",
            Self::Dream => "dream",
            Self::Compat { .. } => "compat",
        }
    }
}

/// Salt `base` for one feature.
#[must_use]
pub fn compose_scoped_seed(base: &Seed, scope: &DrawScope) -> Seed {
    let mut buf = base.0.clone();
    push_field(&mut buf, "scope", scope.key());
    match scope {
        DrawScope::Daily | DrawScope::Dream => {}
        DrawScope::Spread { spread_id, nonce } => {
            push_field(&mut buf, "spread", spread_id);
            push_nonce(&mut buf, nonce.as_deref());
        }
        DrawScope::Topic {
            topic_id,
            question,
            nonce,
        } => {
            push_field(&mut buf, "topic", topic_id);
            if let Some(q) = question.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                push_field(&mut buf, "q", q);
            }
            push_nonce(&mut buf, nonce.as_deref());
        }
        DrawScope::Compat {
            topic_id,
            role,
            nonce,
        } => {
            push_field(&mut buf, "topic", topic_id);
            push_field(&mut buf, "role", role.key());
            push_nonce(&mut buf, nonce.as_deref());
        }
    }
    Seed(buf)
}

fn push_nonce(buf: &mut String, nonce: Option<&str>) {
    if let Some(nonce) = nonce {
        push_field(buf, "n", nonce);
    }
}

/// Where an interactive pick happened: the n-th card chosen, after which
/// shuffle, from which face-down slot on the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickContext {
    pub pick_index: usize,
    pub shuffle: u32,
    pub table_slot: usize,
}

/// Seed for one click in a pick-one-of-several flow.
#[must_use]
pub fn compose_pick_seed(scoped: &Seed, pick: &PickContext) -> Seed {
    let mut buf = scoped.0.clone();
    push_field(&mut buf, "pick", &pick.pick_index.to_string());
    push_field(&mut buf, "sh", &pick.shuffle.to_string());
    push_field(&mut buf, "table", &pick.table_slot.to_string());
    Seed(buf)
}
