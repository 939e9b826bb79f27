//! Key-value persistence seam and the repositories built on it.
//!
//! The engine never talks to a concrete database. Hosts implement
//! [`KvStore`]; [`MemoryStore`] is the in-process reference implementation.
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::compat::{CompatParty, CompatSession, is_session_code, normalize_code};
use crate::config::{CompatConfig, LedgerConfig};
use crate::constants::{COMPAT_KEY_PREFIX, USER_KEY_PREFIX};
use crate::error::{CompatError, ServiceError, StoreError};
use crate::ledger::{SyncState, UserRecord, merge};

/// String key-value store with optional per-key expiry.
pub trait KvStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a live value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value`, replacing any previous value and expiry. `None` keeps
    /// the value until overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), Self::Error>;

    /// Seconds until `key` expires; `None` for missing or persistent keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn ttl(&self, key: &str) -> Result<Option<u64>, Self::Error>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    type Error = S::Error;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), Self::Error> {
        (**self).set(key, value, ttl_secs)
    }

    fn ttl(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        (**self).ttl(key)
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-memory store with expiry evaluated against an injectable clock.
/// Expired keys are dropped when read and swept on every write.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Clock,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = (self.clock)();
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.values().filter(|e| e.is_live(now)).count())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

impl KvStore for MemoryStore {
    type Error = StoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let now = (self.clock)();
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), Self::Error> {
        let now = (self.clock)();
        let expires_at = ttl_secs.map(|secs| {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX / 1000).min(i64::MAX / 1000);
            now.checked_add_signed(chrono::Duration::seconds(secs))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        let now = (self.clock)();
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .and_then(|at| u64::try_from((at - now).num_seconds()).ok()))
    }
}

#[must_use]
pub fn user_key(device_id: &str) -> String {
    format!("{USER_KEY_PREFIX}{device_id}")
}

#[must_use]
pub fn compat_key(code: &str) -> String {
    format!("{COMPAT_KEY_PREFIX}{}", normalize_code(code))
}

/// Reads and writes [`UserRecord`]s under `co:user:{device}`.
#[derive(Debug, Clone)]
pub struct UserRepository<S> {
    store: S,
    rules: LedgerConfig,
}

impl<S: KvStore> UserRepository<S> {
    pub const fn new(store: S, rules: LedgerConfig) -> Self {
        Self { store, rules }
    }

    #[must_use]
    pub const fn rules(&self) -> &LedgerConfig {
        &self.rules
    }

    /// Load a device's record. Missing or unreadable blobs yield a fresh
    /// record stamped `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the store itself fails.
    pub fn load(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, ServiceError<S::Error>> {
        let raw = self
            .store
            .get(&user_key(device_id))
            .map_err(ServiceError::Store)?;
        let Some(raw) = raw else {
            return Ok(UserRecord::new(now, &self.rules));
        };
        match UserRecord::from_stored(&raw, now, &self.rules) {
            Ok(record) => Ok(record),
            Err(err) => {
                log::warn!("discarding unreadable user record for {device_id}: {err}");
                Ok(UserRecord::new(now, &self.rules))
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Encode`] or [`ServiceError::Store`].
    pub fn save(&self, device_id: &str, record: &UserRecord) -> Result<(), ServiceError<S::Error>> {
        let json = serde_json::to_string(record).map_err(|source| ServiceError::Encode {
            what: "user record",
            source,
        })?;
        self.store
            .set(&user_key(device_id), &json, None)
            .map_err(ServiceError::Store)
    }

    /// Load, apply `update`, save, and hand back the updated record plus
    /// whatever `update` returned.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn update<T, F>(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
        update: F,
    ) -> Result<(UserRecord, T), ServiceError<S::Error>>
    where
        F: FnOnce(&mut UserRecord, &LedgerConfig) -> T,
    {
        let mut record = self.load(device_id, now)?;
        let out = update(&mut record, &self.rules);
        self.save(device_id, &record)?;
        Ok((record, out))
    }

    /// Merge a client-held copy into the stored record once per session.
    /// Returns `None` when the session already synced.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn sync(
        &self,
        device_id: &str,
        local: &UserRecord,
        state: &mut SyncState,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, ServiceError<S::Error>> {
        if state.synced {
            return Ok(None);
        }
        let remote = self.load(device_id, now)?;
        let Some(merged) = state.sync(local, &remote) else {
            return Ok(None);
        };
        self.save(device_id, &merged)?;
        log::debug!(
            "synced {device_id}: {} cards, {} readings",
            merged.seen_cards.len(),
            merged.total_readings
        );
        Ok(Some(merged))
    }

    /// Plain merge without the once-per-session guard.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn merge_from(
        &self,
        device_id: &str,
        local: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, ServiceError<S::Error>> {
        let merged = merge(local, &self.load(device_id, now)?);
        self.save(device_id, &merged)?;
        Ok(merged)
    }
}

/// Compatibility sessions under `co:compat:{CODE}`.
#[derive(Debug, Clone)]
pub struct CompatRepository<S> {
    store: S,
    config: CompatConfig,
}

impl<S: KvStore> CompatRepository<S> {
    pub const fn new(store: S, config: CompatConfig) -> Self {
        Self { store, config }
    }

    fn write(&self, session: &CompatSession, ttl_secs: u64) -> Result<(), ServiceError<S::Error>> {
        let json = serde_json::to_string(session).map_err(|source| ServiceError::Encode {
            what: "compat session",
            source,
        })?;
        self.store
            .set(&compat_key(&session.code), &json, Some(ttl_secs))
            .map_err(ServiceError::Store)
    }

    /// Persist a freshly opened session with the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Encode`] or [`ServiceError::Store`].
    pub fn open(&self, session: &CompatSession) -> Result<(), ServiceError<S::Error>> {
        self.write(session, self.config.session_ttl_secs)
    }

    /// Fetch a live session; codes are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the store fails.
    pub fn load(&self, code: &str) -> Result<Option<CompatSession>, ServiceError<S::Error>> {
        if !is_session_code(code) {
            log::debug!("rejecting malformed compat code {code:?}");
            return Ok(None);
        }
        let raw = self
            .store
            .get(&compat_key(code))
            .map_err(ServiceError::Store)?;
        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!("ignoring unreadable compat session {code}: {err}");
                None
            }
        }))
    }

    /// Attach party B and rewrite the session without extending its life.
    ///
    /// # Errors
    ///
    /// [`CompatError::NotFound`] for unknown or expired codes, the session's
    /// own join errors, and store failures.
    pub fn join(
        &self,
        code: &str,
        party: CompatParty,
        now: DateTime<Utc>,
    ) -> Result<CompatSession, ServiceError<S::Error>> {
        let mut session = self.load(code)?.ok_or_else(|| CompatError::NotFound {
            code: normalize_code(code),
        })?;
        session.join(party, now)?;
        let remaining = self
            .store
            .ttl(&compat_key(code))
            .map_err(ServiceError::Store)?
            .filter(|secs| *secs > 0)
            .unwrap_or(self.config.session_ttl_secs);
        self.write(&session, remaining)?;
        Ok(session)
    }
}
