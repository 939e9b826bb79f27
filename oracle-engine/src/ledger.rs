//! Per-device progress: collected cards, check-ins, counters.
//!
//! Two writers (the device's local cache and the server copy) may diverge.
//! They are reconciled with [`merge`], which only ever grows sets and
//! counters so neither side loses progress.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::CardId;
use crate::config::LedgerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub seen_cards: BTreeSet<CardId>,
    #[serde(default)]
    pub checkin_days: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub checkin_streak: u32,
    #[serde(default)]
    pub total_readings: u64,
    #[serde(default = "LedgerConfig::default_initial_credits")]
    pub credits: u32,
    #[serde(default)]
    pub free_readings_used: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinOutcome {
    pub is_new: bool,
    pub streak_reward: bool,
}

impl UserRecord {
    #[must_use]
    pub fn new(now: DateTime<Utc>, rules: &LedgerConfig) -> Self {
        Self {
            seen_cards: BTreeSet::new(),
            checkin_days: BTreeSet::new(),
            checkin_streak: 0,
            total_readings: 0,
            credits: rules.initial_credits,
            free_readings_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a stored record, filling absent fields from a fresh record
    /// stamped `now`. Partial documents written by older clients keep
    /// whatever they do carry.
    ///
    /// # Errors
    ///
    /// Returns an error when `raw` is not a JSON object of record fields.
    pub fn from_stored(
        raw: &str,
        now: DateTime<Utc>,
        rules: &LedgerConfig,
    ) -> Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(Self::new(now, rules))?;
        let stored: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Object(fields) = stored else {
            return Err(serde::de::Error::custom("user record must be a JSON object"));
        };
        if let serde_json::Value::Object(target) = &mut base {
            target.extend(fields);
        }
        serde_json::from_value(base)
    }

    /// Returns `true` when the card had not been seen before.
    pub fn record_card_seen(&mut self, card_id: CardId, now: DateTime<Utc>) -> bool {
        self.updated_at = now;
        self.seen_cards.insert(card_id)
    }

    pub fn record_reading(&mut self, now: DateTime<Utc>) -> u64 {
        self.total_readings = self.total_readings.saturating_add(1);
        self.updated_at = now;
        self.total_readings
    }

    /// Check in for `date`.
    ///
    /// The streak continues when the previous day is on record and restarts
    /// at one otherwise. Every `streak_period`-th consecutive day grants
    /// `streak_reward_credits`.
    pub fn check_in(
        &mut self,
        date: NaiveDate,
        rules: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> CheckinOutcome {
        if !self.checkin_days.insert(date) {
            return CheckinOutcome {
                is_new: false,
                streak_reward: false,
            };
        }
        let continues = date
            .pred_opt()
            .is_some_and(|yesterday| self.checkin_days.contains(&yesterday));
        self.checkin_streak = if continues {
            self.checkin_streak.saturating_add(1)
        } else {
            1
        };
        let streak_reward =
            rules.streak_period > 0 && self.checkin_streak % rules.streak_period == 0;
        if streak_reward {
            self.credits = self.credits.saturating_add(rules.streak_reward_credits);
        }
        self.updated_at = now;
        CheckinOutcome {
            is_new: true,
            streak_reward,
        }
    }
}

/// Reconcile two copies of the same record.
///
/// Sets are unioned, counters take the larger value, `created_at` the
/// earlier instant and `updated_at` the later. The result does not depend on
/// argument order, and merging a record with itself returns it unchanged.
#[must_use]
pub fn merge(local: &UserRecord, remote: &UserRecord) -> UserRecord {
    UserRecord {
        seen_cards: local.seen_cards.union(&remote.seen_cards).copied().collect(),
        checkin_days: local
            .checkin_days
            .union(&remote.checkin_days)
            .copied()
            .collect(),
        checkin_streak: local.checkin_streak.max(remote.checkin_streak),
        total_readings: local.total_readings.max(remote.total_readings),
        credits: local.credits.max(remote.credits),
        free_readings_used: local.free_readings_used.max(remote.free_readings_used),
        created_at: local.created_at.min(remote.created_at),
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

/// Session-scoped "already synced" flag, owned by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub synced: bool,
}

impl SyncState {
    #[must_use]
    pub const fn new() -> Self {
        Self { synced: false }
    }

    /// Merge once per session. Later calls return `None` and leave both
    /// records alone.
    pub fn sync(&mut self, local: &UserRecord, remote: &UserRecord) -> Option<UserRecord> {
        if self.synced {
            return None;
        }
        self.synced = true;
        Some(merge(local, remote))
    }
}
