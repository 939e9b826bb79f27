//! Two-person compatibility readings.
//!
//! Party A draws, opens a session under a short share code, and party B
//! joins it later with their own draw. The session record only moves from
//! `waiting` to `ready`; it is never reopened.
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::catalog::{CardId, Catalog, Element};
use crate::draw::draw_one;
use crate::error::{CompatError, OracleError};

/// Sessions never outlive a year.
const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// Uppercase alphabet without the look-alikes `0 O 1 I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatTopic {
    pub id: &'static str,
    pub icon: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const COMPAT_TOPICS: [CompatTopic; 3] = [
    CompatTopic {
        id: "love",
        icon: "💘",
        name: "感情合盘",
        description: "两个人之间的化学反应",
    },
    CompatTopic {
        id: "friend",
        icon: "🤝",
        name: "友谊合盘",
        description: "你和 TA 的灵魂契合度",
    },
    CompatTopic {
        id: "work",
        icon: "💼",
        name: "事业合盘",
        description: "你们适合一起共事吗",
    },
];

#[must_use]
pub fn compat_topic(id: &str) -> Option<&'static CompatTopic> {
    COMPAT_TOPICS.iter().find(|topic| topic.id == id)
}

/// One side's card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatParty {
    pub card_id: CardId,
    pub is_reversed: bool,
}

/// Draw a single card for one party. Seeds for A and B differ by role, see
/// [`crate::seed::DrawScope::Compat`].
///
/// # Errors
///
/// Returns [`OracleError::ExhaustedPool`] for an empty deck.
pub fn draw_party(catalog: &Catalog, seed: &str) -> Result<CompatParty, OracleError> {
    let pick = draw_one(catalog.cards(), seed, &BTreeSet::new())?;
    Ok(CompatParty {
        card_id: catalog.cards()[pick.card_index].id,
        is_reversed: pick.is_reversed,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatSession {
    pub code: String,
    pub topic_id: String,
    pub topic_name: String,
    pub a: CompatParty,
    pub b: Option<CompatParty>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl CompatSession {
    #[must_use]
    pub fn open(
        code: &str,
        topic_id: &str,
        topic_name: &str,
        a: CompatParty,
        now: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs.min(MAX_TTL_SECS)).unwrap_or(0));
        Self {
            code: normalize_code(code),
            topic_id: topic_id.to_string(),
            topic_name: topic_name.to_string(),
            a,
            b: None,
            status: SessionStatus::Waiting,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            joined_at: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }

    /// Attach party B.
    ///
    /// # Errors
    ///
    /// [`CompatError::AlreadyJoined`] when B is already present and
    /// [`CompatError::Expired`] once `expires_at` has passed.
    pub fn join(&mut self, b: CompatParty, now: DateTime<Utc>) -> Result<(), CompatError> {
        if self.b.is_some() || self.status == SessionStatus::Ready {
            return Err(CompatError::AlreadyJoined {
                code: self.code.clone(),
            });
        }
        if self.is_expired(now) {
            return Err(CompatError::Expired {
                code: self.code.clone(),
            });
        }
        self.b = Some(b);
        self.status = SessionStatus::Ready;
        self.joined_at = Some(now);
        Ok(())
    }
}

/// Random share code of `len` characters from [`CODE_ALPHABET`].
pub fn generate_session_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Codes are typed by hand; compare them trimmed and uppercased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Whether `code` could have come from [`generate_session_code`], after
/// normalization.
#[must_use]
pub fn is_session_code(code: &str) -> bool {
    static CODE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    CODE_RE
        .get_or_init(|| Regex::new(r"^[A-HJ-NP-Z2-9]{4,32}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(&normalize_code(code)))
}

/// Relationship label from the two cards' elements, after the elemental
/// dignities: fire and air feed each other, as do water and earth; fire and
/// water oppose, as do air and earth; the remaining pairs are neutral.
#[must_use]
pub fn relation_label(a: Element, b: Element) -> &'static str {
    use Element::{Air, Earth, Fire, Water};
    match (a, b) {
        _ if a == b => "同频共振",
        (Fire, Air) | (Air, Fire) | (Water, Earth) | (Earth, Water) => "相生互补",
        (Fire, Water) | (Water, Fire) | (Air, Earth) | (Earth, Air) => "相克张力",
        _ => "磨合成长",
    }
}
