//! Oracle Engine
//!
//! Deterministic fortune draws: tarot spreads, hexagrams, sexagenary days,
//! daily signs, dream matches, and two-person compatibility readings. Every
//! draw is a pure function of a seed string, so the same inputs reproduce the
//! same result on any machine.
//!
//! Persistence and text generation sit behind the [`KvStore`] and
//! [`TextCompletion`] traits; the [`Oracle`] facade wires them to the draw
//! functions.

pub mod calendar;
pub mod catalog;
pub mod compat;
pub mod config;
pub mod constants;
pub mod daily;
pub mod draw;
pub mod dream;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod narrative;
pub mod seed;
pub mod store;
pub mod topic;

pub use calendar::{Phase, SexagenaryDay, derive_day, derive_day_str, format_date, parse_date};
pub use catalog::{
    Card, CardId, Catalog, CatalogSources, DreamKeywords, Element, HEXAGRAM_COUNT, Hexagram,
    Position, SpreadType, Topic,
};
pub use compat::{
    COMPAT_TOPICS, CompatParty, CompatSession, CompatTopic, SessionStatus, compat_topic,
    draw_party, generate_session_code, is_session_code, normalize_code, relation_label,
};
pub use config::{CompatConfig, LedgerConfig, NarrativeConfig, OracleConfig};
pub use daily::{DailySign, daily_sign};
pub use draw::{
    CardPick, DrawnCard, DrawnPick, SpreadResult, SpreadSession, draw_one, draw_one_card,
    draw_spread,
};
pub use dream::{DreamMatch, is_decodable, match_dream, normalize_dream};
pub use error::{
    CatalogError, CompatError, ConfigError, NarrativeError, OracleError, ServiceError, StoreError,
};
pub use hash::{bounded_index, fnv1a32, hash_bit};
pub use ledger::{CheckinOutcome, SyncState, UserRecord, merge};
pub use narrative::{
    CompletionRequest, Narration, NarrativeMode, NarrativeService, TemplateCompletion,
    TextCompletion, cache_key,
};
pub use seed::{
    CompatRole, DrawScope, Level, PickContext, Profile, Seed, SleepQuality, WeatherKind,
    compose_pick_seed, compose_scoped_seed, compose_seed,
};
pub use store::{CompatRepository, KvStore, MemoryStore, UserRepository};
pub use topic::{TopicFortune, brief_reading, cast_topic_fortune};

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Who is asking and when: the inputs of the base seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Querent {
    pub device_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub profile: Profile,
}

impl Querent {
    #[must_use]
    pub fn new(device_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            device_id: device_id.into(),
            date,
            profile: Profile::default(),
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn seed(&self) -> Seed {
        compose_seed(&self.device_id, &format_date(self.date), &self.profile)
    }

    #[must_use]
    pub fn scoped_seed(&self, scope: &DrawScope) -> Seed {
        compose_scoped_seed(&self.seed(), scope)
    }
}

/// A topic fortune together with its template reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicReading {
    pub topic: Topic,
    pub fortune: TopicFortune,
    pub brief: String,
}

/// A dream match resolved to its card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamReading {
    #[serde(flatten)]
    pub matched: DreamMatch,
    pub card: Card,
}

/// Main entry point tying seeds, draws, and the user ledger to a store.
///
/// Draw results never depend on the store. Ledger bookkeeping that follows a
/// draw is best-effort: a failed write is logged and the draw still returns.
pub struct Oracle<S>
where
    S: KvStore,
{
    catalog: &'static Catalog,
    config: OracleConfig,
    store: S,
}

impl<S> Oracle<S>
where
    S: KvStore,
{
    /// Create an oracle over the embedded catalog.
    pub fn new(store: S, config: OracleConfig) -> Self {
        Self::with_catalog(Catalog::default_catalog(), store, config)
    }

    pub const fn with_catalog(catalog: &'static Catalog, store: S, config: OracleConfig) -> Self {
        Self {
            catalog,
            config,
            store,
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &OracleConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn users(&self) -> UserRepository<&S> {
        UserRepository::new(&self.store, self.config.ledger)
    }

    fn sessions(&self) -> CompatRepository<&S> {
        CompatRepository::new(&self.store, self.config.compat)
    }

    fn note_reading(&self, device_id: &str, cards: &[CardId], now: DateTime<Utc>) {
        let result = self.users().update(device_id, now, |record, _| {
            for id in cards {
                record.record_card_seen(*id, now);
            }
            record.record_reading(now);
        });
        if let Err(err) = result {
            log::warn!("failed to record reading for {device_id}: {err}");
        }
    }

    /// Today's sign for `querent`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ExhaustedPool`] only for an empty catalog.
    pub fn daily(&self, querent: &Querent, now: DateTime<Utc>) -> Result<DailySign, OracleError> {
        let seed = querent.scoped_seed(&DrawScope::Daily);
        let sign = daily_sign(self.catalog, seed.as_str(), querent.date)?;
        self.note_reading(&querent.device_id, &[sign.card.id], now);
        Ok(sign)
    }

    fn spread_by_id(&self, spread_id: &str) -> Result<&'static SpreadType, OracleError> {
        self.catalog
            .spread(spread_id)
            .ok_or_else(|| OracleError::UnknownSpread {
                spread: spread_id.to_string(),
            })
    }

    /// Draw a whole spread at once.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownSpread`] or [`OracleError::SpreadTooLarge`].
    pub fn spread(
        &self,
        querent: &Querent,
        spread_id: &str,
        nonce: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SpreadResult, OracleError> {
        let spread = self.spread_by_id(spread_id)?;
        let seed = querent.scoped_seed(&DrawScope::Spread {
            spread_id: spread_id.to_string(),
            nonce: nonce.map(str::to_string),
        });
        let result = draw_spread(self.catalog.cards(), spread, seed.as_str())?;
        self.note_reading(&querent.device_id, &result.card_ids(), now);
        Ok(result)
    }

    /// Start an interactive spread; pair with [`Oracle::pick`].
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownSpread`] or [`OracleError::SpreadTooLarge`].
    pub fn start_session(&self, spread_id: &str) -> Result<SpreadSession, OracleError> {
        let spread = self.spread_by_id(spread_id)?;
        SpreadSession::new(spread.clone(), self.catalog.cards().len())
    }

    /// Draw the next card of an interactive spread from the face-down slot
    /// the user clicked.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ExhaustedPool`] if the deck runs dry.
    pub fn pick(
        &self,
        session: &mut SpreadSession,
        scoped: &Seed,
        shuffle: u32,
        table_slot: usize,
    ) -> Result<Option<DrawnCard>, OracleError> {
        let context = PickContext {
            pick_index: session.pick_index(),
            shuffle,
            table_slot,
        };
        let seed = compose_pick_seed(scoped, &context);
        Ok(session.pick(self.catalog.cards(), seed.as_str())?.cloned())
    }

    /// Cast a topic fortune and its brief reading.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownTopic`], [`OracleError::UnknownSpread`],
    /// or [`OracleError::SpreadTooLarge`].
    pub fn topic(
        &self,
        querent: &Querent,
        topic_id: &str,
        spread_id: &str,
        question: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TopicReading, OracleError> {
        let topic = self
            .catalog
            .topic(topic_id)
            .ok_or_else(|| OracleError::UnknownTopic {
                topic: topic_id.to_string(),
            })?;
        let spread = self.spread_by_id(spread_id)?;
        let seed = querent.scoped_seed(&DrawScope::Topic {
            topic_id: topic_id.to_string(),
            question: question.map(str::to_string),
            nonce: None,
        });
        let fortune = cast_topic_fortune(
            self.catalog,
            topic_id,
            spread,
            seed.as_str(),
            querent.date,
        )?;
        self.note_reading(&querent.device_id, &fortune.spread.card_ids(), now);
        let brief = brief_reading(&fortune, &topic.name);
        Ok(TopicReading {
            topic: topic.clone(),
            fortune,
            brief,
        })
    }

    /// Match a dream description to a card.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ExhaustedPool`] only for an empty catalog.
    pub fn dream(
        &self,
        device_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<DreamReading, OracleError> {
        let matched = match_dream(self.catalog, text)?;
        let card = self.catalog.cards()[matched.pick.card_index].clone();
        self.note_reading(device_id, &[card.id], now);
        Ok(DreamReading { matched, card })
    }

    fn party_for(
        &self,
        querent: &Querent,
        topic_id: &str,
        role: CompatRole,
    ) -> Result<CompatParty, OracleError> {
        let seed = querent.scoped_seed(&DrawScope::Compat {
            topic_id: topic_id.to_string(),
            role,
            nonce: None,
        });
        draw_party(self.catalog, seed.as_str())
    }

    /// Draw party A and open a shareable session.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Oracle`] for unknown topics and
    /// [`ServiceError::Store`] when the session cannot be saved.
    pub fn open_compat<R: Rng + ?Sized>(
        &self,
        querent: &Querent,
        topic_id: &str,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<CompatSession, ServiceError<S::Error>> {
        let topic = compat_topic(topic_id).ok_or_else(|| OracleError::UnknownTopic {
            topic: topic_id.to_string(),
        })?;
        let a = self.party_for(querent, topic_id, CompatRole::A)?;
        let code = generate_session_code(rng, self.config.compat.code_len);
        let session = CompatSession::open(
            &code,
            topic.id,
            topic.name,
            a,
            now,
            self.config.compat.session_ttl_secs,
        );
        self.sessions().open(&session)?;
        log::debug!("opened compat session {}", session.code);
        self.note_reading(&querent.device_id, &[a.card_id], now);
        Ok(session)
    }

    /// Draw party B and join the session behind `code`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Compat`] for missing, expired, or full
    /// sessions and [`ServiceError::Store`] for store failures.
    pub fn join_compat(
        &self,
        querent: &Querent,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CompatSession, ServiceError<S::Error>> {
        let sessions = self.sessions();
        let existing = sessions.load(code)?.ok_or_else(|| CompatError::NotFound {
            code: normalize_code(code),
        })?;
        let b = self.party_for(querent, &existing.topic_id, CompatRole::B)?;
        let session = sessions.join(code, b, now)?;
        self.note_reading(&querent.device_id, &[b.card_id], now);
        Ok(session)
    }

    /// Relationship label for a ready session.
    #[must_use]
    pub fn compat_label(&self, session: &CompatSession) -> Option<&'static str> {
        let a = self.catalog.card(session.a.card_id)?;
        let b = self.catalog.card(session.b?.card_id)?;
        Some(relation_label(a.element, b.element))
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the store fails.
    pub fn compat_session(
        &self,
        code: &str,
    ) -> Result<Option<CompatSession>, ServiceError<S::Error>> {
        self.sessions().load(code)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the store fails.
    pub fn user(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, ServiceError<S::Error>> {
        self.users().load(device_id, now)
    }

    /// Check in for `date`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] or [`ServiceError::Encode`].
    pub fn check_in(
        &self,
        device_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(UserRecord, CheckinOutcome), ServiceError<S::Error>> {
        self.users()
            .update(device_id, now, |record, rules| record.check_in(date, rules, now))
    }

    /// Reconcile a client copy once per session.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] or [`ServiceError::Encode`].
    pub fn sync(
        &self,
        device_id: &str,
        local: &UserRecord,
        state: &mut SyncState,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, ServiceError<S::Error>> {
        self.users().sync(device_id, local, state, now)
    }

    /// Narrative service sharing this oracle's store as its cache.
    pub fn narrator<B: TextCompletion>(&self, backend: B) -> NarrativeService<B, &S> {
        NarrativeService::new(backend, &self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedStore {
        values: Rc<RefCell<HashMap<String, (String, Option<u64>)>>>,
    }

    impl KvStore for SharedStore {
        type Error = Infallible;

        fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
            Ok(self.values.borrow().get(key).map(|(v, _)| v.clone()))
        }

        fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), Self::Error> {
            self.values
                .borrow_mut()
                .insert(key.to_string(), (value.to_string(), ttl_secs));
            Ok(())
        }

        fn ttl(&self, key: &str) -> Result<Option<u64>, Self::Error> {
            Ok(self.values.borrow().get(key).and_then(|(_, ttl)| *ttl))
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-02-10T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn querent(device: &str) -> Querent {
        Querent::new(device, parse_date("2024-02-10").unwrap())
    }

    fn oracle() -> Oracle<SharedStore> {
        Oracle::new(SharedStore::default(), OracleConfig::default())
    }

    #[test]
    fn draws_update_the_ledger() {
        let oracle = oracle();
        let sign = oracle.daily(&querent("dev"), now()).unwrap();
        let spread = oracle.spread(&querent("dev"), "three-card", None, now()).unwrap();
        let record = oracle.user("dev", now()).unwrap();
        assert_eq!(record.total_readings, 2);
        assert!(record.seen_cards.contains(&sign.card.id));
        for id in spread.card_ids() {
            assert!(record.seen_cards.contains(&id));
        }
    }

    #[test]
    fn daily_and_spread_use_distinct_scopes() {
        let oracle = oracle();
        let q = querent("dev");
        let daily = q.scoped_seed(&DrawScope::Daily);
        let spread = q.scoped_seed(&DrawScope::Spread {
            spread_id: "single".into(),
            nonce: None,
        });
        assert_ne!(daily, spread);
        assert_eq!(
            oracle.daily(&q, now()).unwrap(),
            oracle.daily(&q, now()).unwrap()
        );
    }

    #[test]
    fn unknown_spread_and_topic_are_rejected() {
        let oracle = oracle();
        let q = querent("dev");
        assert!(matches!(
            oracle.spread(&q, "zodiac-wheel", None, now()),
            Err(OracleError::UnknownSpread { .. })
        ));
        assert!(matches!(
            oracle.topic(&q, "fame", "three-card", None, now()),
            Err(OracleError::UnknownTopic { .. })
        ));
        assert_eq!(oracle.user("dev", now()).unwrap().total_readings, 0);
    }

    #[test]
    fn topic_reading_carries_brief_text() {
        let oracle = oracle();
        let reading = oracle
            .topic(&querent("dev"), "career", "three-card", None, now())
            .unwrap();
        assert_eq!(reading.topic.id, "career");
        assert!(reading.brief.contains(&reading.fortune.hexagram.name));
    }

    #[test]
    fn interactive_session_fills_every_position() {
        let oracle = oracle();
        let mut session = oracle.start_session("three-card").unwrap();
        let scoped = querent("dev").scoped_seed(&DrawScope::Spread {
            spread_id: "three-card".into(),
            nonce: Some("1700000000".into()),
        });
        for slot in [4, 1, 7] {
            assert!(oracle.pick(&mut session, &scoped, 0, slot).unwrap().is_some());
        }
        assert!(session.is_complete());
        assert!(oracle.pick(&mut session, &scoped, 0, 0).unwrap().is_none());
    }

    #[test]
    fn compat_round_trip() {
        let oracle = oracle();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let opened = oracle
            .open_compat(&querent("alice"), "love", &mut rng, now())
            .unwrap();
        assert_eq!(opened.status, SessionStatus::Waiting);
        assert_eq!(opened.code.len(), 8);
        assert!(oracle.compat_label(&opened).is_none());

        let joined = oracle
            .join_compat(&querent("bob"), &opened.code.to_lowercase(), now())
            .unwrap();
        assert_eq!(joined.status, SessionStatus::Ready);
        assert!(oracle.compat_label(&joined).is_some());
        assert!(matches!(
            oracle.join_compat(&querent("carol"), &opened.code, now()),
            Err(ServiceError::Compat(CompatError::AlreadyJoined { .. }))
        ));
    }

    #[test]
    fn check_in_and_sync() {
        let oracle = oracle();
        let date = parse_date("2024-02-10").unwrap();
        let (_, outcome) = oracle.check_in("dev", date, now()).unwrap();
        assert!(outcome.is_new);
        let (_, outcome) = oracle.check_in("dev", date, now()).unwrap();
        assert!(!outcome.is_new);

        let mut local = UserRecord::new(now(), &oracle.config().ledger);
        local.record_card_seen(21, now());
        let mut state = SyncState::default();
        let merged = oracle.sync("dev", &local, &mut state, now()).unwrap().unwrap();
        assert!(merged.seen_cards.contains(&21));
        assert!(merged.checkin_days.contains(&date));
    }

    #[test]
    fn narrator_shares_the_store() {
        let oracle = oracle();
        let sign = oracle.daily(&querent("dev"), now()).unwrap();
        let request = narrative::daily_request(&oracle.config().narrative, &sign);
        let narrator = oracle.narrator(TemplateCompletion);
        assert!(!narrator.narrate_to_string(&request).unwrap().cached);
        assert!(narrator.narrate_to_string(&request).unwrap().cached);
    }
}
