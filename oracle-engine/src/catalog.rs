//! Static reference data: cards, hexagrams, spreads, topics, and text pools.
//!
//! The JSON under `assets/data` is embedded at compile time and parsed once per
//! process. Nothing here is mutated after load.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::calendar::Phase;
use crate::error::{CatalogError, OracleError};

const CARDS_DATA: &str = include_str!("../assets/data/cards.json");
const HEXAGRAMS_DATA: &str = include_str!("../assets/data/hexagrams.json");
const SPREADS_DATA: &str = include_str!("../assets/data/spreads.json");
const TOPICS_DATA: &str = include_str!("../assets/data/topics.json");
const FORTUNES_DATA: &str = include_str!("../assets/data/fortunes.json");
const DREAMS_DATA: &str = include_str!("../assets/data/dreams.json");

pub const HEXAGRAM_COUNT: usize = 64;

pub type CardId = u16;

/// Tarot element tag carried by every card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Fire,
    Water,
    Air,
    Earth,
}

impl Element {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fire => "火",
            Self::Water => "水",
            Self::Air => "风",
            Self::Earth => "土",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    /// Thematic alias shown beside the traditional name.
    pub alias: String,
    pub upright: String,
    pub reversed: String,
    pub element: Element,
}

impl Card {
    #[must_use]
    pub fn meaning(&self, is_reversed: bool) -> &str {
        if is_reversed {
            &self.reversed
        } else {
            &self.upright
        }
    }

    /// `愚者（系统初始化）` style display name.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}（{}）", self.name, self.alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hexagram {
    /// King Wen sequence number, 1-based.
    pub number: u8,
    pub name: String,
    pub symbol: String,
    pub upper: String,
    pub lower: String,
    pub nature: String,
    pub keywords: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub name: String,
    pub description: String,
}

impl Position {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A named layout of positions; one card is drawn per position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub positions: Vec<Position>,
}

impl SpreadType {
    /// Build a spread, rejecting layouts the deck cannot fill.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::SpreadTooLarge`] when there are more positions
    /// than cards in a deck of `deck_size`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        positions: Vec<Position>,
        deck_size: usize,
    ) -> Result<Self, OracleError> {
        let spread = Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            positions,
        };
        spread.ensure_fits(deck_size)?;
        Ok(spread)
    }

    #[must_use]
    pub fn card_count(&self) -> usize {
        self.positions.len()
    }

    /// # Errors
    ///
    /// Returns [`OracleError::SpreadTooLarge`] when the spread needs more
    /// cards than `deck_size`.
    pub fn ensure_fits(&self, deck_size: usize) -> Result<(), OracleError> {
        if self.card_count() > deck_size {
            return Err(OracleError::SpreadTooLarge {
                spread: self.id.clone(),
                requested: self.card_count(),
                available: deck_size,
            });
        }
        Ok(())
    }
}

/// A life topic offered by the three-system topic reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    #[serde(default)]
    pub requires_question: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamKeywords {
    pub card_id: CardId,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CardsFile {
    cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HexagramsFile {
    hexagrams: Vec<Hexagram>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SpreadsFile {
    spreads: Vec<SpreadType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TopicsFile {
    topics: Vec<Topic>,
    analysis: BTreeMap<String, BTreeMap<Phase, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FortunesFile {
    daily: Vec<String>,
    labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DreamsFile {
    entries: Vec<DreamKeywords>,
}

/// Raw JSON documents a catalog is built from.
#[derive(Debug, Clone, Copy)]
pub struct CatalogSources<'a> {
    pub cards: &'a str,
    pub hexagrams: &'a str,
    pub spreads: &'a str,
    pub topics: &'a str,
    pub fortunes: &'a str,
    pub dreams: &'a str,
}

impl CatalogSources<'static> {
    /// The documents embedded in the crate.
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            cards: CARDS_DATA,
            hexagrams: HEXAGRAMS_DATA,
            spreads: SPREADS_DATA,
            topics: TOPICS_DATA,
            fortunes: FORTUNES_DATA,
            dreams: DREAMS_DATA,
        }
    }
}

/// All reference data the engine draws from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    cards: Vec<Card>,
    hexagrams: Vec<Hexagram>,
    spreads: Vec<SpreadType>,
    topics: Vec<Topic>,
    analysis: BTreeMap<String, BTreeMap<Phase, String>>,
    daily_fortunes: Vec<String>,
    labels: Vec<String>,
    dream_keywords: Vec<DreamKeywords>,
}

fn parse<T: serde::de::DeserializeOwned>(
    source_name: &'static str,
    json: &str,
) -> Result<T, CatalogError> {
    serde_json::from_str(json).map_err(|error| CatalogError::Parse { source_name, error })
}

impl Catalog {
    /// Parse and validate a catalog from its JSON documents.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] when a document fails to parse or the data
    /// breaks a catalog invariant (see [`Catalog::validate`]).
    pub fn from_sources(sources: &CatalogSources<'_>) -> Result<Self, CatalogError> {
        let cards: CardsFile = parse("cards.json", sources.cards)?;
        let hexagrams: HexagramsFile = parse("hexagrams.json", sources.hexagrams)?;
        let spreads: SpreadsFile = parse("spreads.json", sources.spreads)?;
        let topics: TopicsFile = parse("topics.json", sources.topics)?;
        let fortunes: FortunesFile = parse("fortunes.json", sources.fortunes)?;
        let dreams: DreamsFile = parse("dreams.json", sources.dreams)?;
        let catalog = Self {
            cards: cards.cards,
            hexagrams: hexagrams.hexagrams,
            spreads: spreads.spreads,
            topics: topics.topics,
            analysis: topics.analysis,
            daily_fortunes: fortunes.daily,
            labels: fortunes.labels,
            dream_keywords: dreams.entries,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load the embedded catalog, falling back to an empty one if the
    /// embedded data is broken.
    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_sources(&CatalogSources::embedded()).unwrap_or_else(|err| {
            log::error!("embedded catalog rejected: {err}");
            Self::default()
        })
    }

    /// Process-wide catalog parsed on first use.
    #[must_use]
    pub fn default_catalog() -> &'static Self {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(Self::load_from_static)
    }

    /// Check the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: card ids out of sequence, a
    /// hexagram count other than 64, an empty or oversized spread, a topic
    /// without analysis for every phase, an empty text pool, or a dream
    /// keyword entry pointing at a missing card.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (position, card) in self.cards.iter().enumerate() {
            if usize::from(card.id) != position {
                return Err(CatalogError::CardOrder {
                    position,
                    id: card.id,
                });
            }
        }
        if self.hexagrams.len() != HEXAGRAM_COUNT {
            return Err(CatalogError::HexagramCount {
                expected: HEXAGRAM_COUNT,
                found: self.hexagrams.len(),
            });
        }
        for spread in &self.spreads {
            if spread.positions.is_empty() {
                return Err(CatalogError::EmptySpread {
                    spread: spread.id.clone(),
                });
            }
            spread.ensure_fits(self.cards.len())?;
        }
        for topic in &self.topics {
            for phase in Phase::ALL {
                if self.wuxing_analysis(&topic.id, phase).is_none() {
                    return Err(CatalogError::MissingAnalysis {
                        topic: topic.id.clone(),
                        phase: phase.key(),
                    });
                }
            }
        }
        if self.daily_fortunes.is_empty() {
            return Err(CatalogError::EmptyPool { pool: "daily" });
        }
        if self.labels.is_empty() {
            return Err(CatalogError::EmptyPool { pool: "labels" });
        }
        if let Some(entry) = self
            .dream_keywords
            .iter()
            .find(|entry| self.card(entry.card_id).is_none())
        {
            return Err(CatalogError::UnknownDreamCard {
                card_id: entry.card_id,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.cards.get(usize::from(id))
    }

    #[must_use]
    pub fn hexagrams(&self) -> &[Hexagram] {
        &self.hexagrams
    }

    #[must_use]
    pub fn spreads(&self) -> &[SpreadType] {
        &self.spreads
    }

    #[must_use]
    pub fn spread(&self, id: &str) -> Option<&SpreadType> {
        self.spreads.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    #[must_use]
    pub fn topic(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    /// Canned analysis of how the day's phase bears on `topic_id`.
    #[must_use]
    pub fn wuxing_analysis(&self, topic_id: &str, phase: Phase) -> Option<&str> {
        self.analysis
            .get(topic_id)
            .and_then(|by_phase| by_phase.get(&phase))
            .map(String::as_str)
    }

    #[must_use]
    pub fn daily_fortunes(&self) -> &[String] {
        &self.daily_fortunes
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn dream_keywords(&self) -> &[DreamKeywords] {
        &self.dream_keywords
    }
}
