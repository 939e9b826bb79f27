//! Seeded card draws without replacement.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::{Card, CardId, Position, SpreadType};
use crate::error::OracleError;
use crate::hash::{bounded_index, hash_bit};

const ORIENTATION_SALT: &str = "|orientation";

/// Index into the deck plus orientation, before binding to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPick {
    pub card_index: usize,
    pub is_reversed: bool,
}

/// A card resolved from the deck together with its orientation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawnPick {
    pub card: Card,
    pub is_reversed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawnCard {
    pub card: Card,
    pub is_reversed: bool,
    pub position: Position,
}

impl DrawnCard {
    #[must_use]
    pub fn meaning(&self) -> &str {
        self.card.meaning(self.is_reversed)
    }

    #[must_use]
    pub const fn orientation_label(&self) -> &'static str {
        orientation_label(self.is_reversed)
    }
}

#[must_use]
pub const fn orientation_label(is_reversed: bool) -> &'static str {
    if is_reversed { "逆位" } else { "正位" }
}

/// Cards of one spread in position order; card ids never repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadResult {
    pub cards: Vec<DrawnCard>,
}

impl SpreadResult {
    #[must_use]
    pub fn card_ids(&self) -> Vec<CardId> {
        self.cards.iter().map(|drawn| drawn.card.id).collect()
    }

    #[must_use]
    pub fn upright_count(&self) -> usize {
        self.cards.iter().filter(|drawn| !drawn.is_reversed).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Pick one card from `deck`, skipping `excluded` ids.
///
/// The remaining ids stay in ascending order and a single hash of `seed`
/// selects among them. Orientation comes from a second, salted hash of the
/// same seed.
///
/// # Errors
///
/// Returns [`OracleError::ExhaustedPool`] when every card is excluded.
pub fn draw_one(
    deck: &[Card],
    seed: &str,
    excluded: &BTreeSet<CardId>,
) -> Result<CardPick, OracleError> {
    let pool: Vec<usize> = deck
        .iter()
        .enumerate()
        .filter(|(_, card)| !excluded.contains(&card.id))
        .map(|(index, _)| index)
        .collect();
    if pool.is_empty() {
        return Err(OracleError::ExhaustedPool {
            deck: deck.len(),
            excluded: excluded.len(),
        });
    }
    let card_index = pool[bounded_index(seed, pool.len())];
    Ok(CardPick {
        card_index,
        is_reversed: draw_orientation(seed),
    })
}

/// Orientation for `seed`, independent of which card the seed selects.
#[must_use]
pub fn draw_orientation(seed: &str) -> bool {
    hash_bit(&format!("{seed}{ORIENTATION_SALT}"))
}

/// Draw a card for an interactive pick where the caller composes the seed
/// and tracks which ids are already on the table.
///
/// # Errors
///
/// Returns [`OracleError::ExhaustedPool`] when `used_ids` covers the deck.
pub fn draw_one_card(
    deck: &[Card],
    seed: &str,
    used_ids: &[CardId],
) -> Result<DrawnPick, OracleError> {
    let excluded: BTreeSet<CardId> = used_ids.iter().copied().collect();
    let pick = draw_one(deck, seed, &excluded)?;
    Ok(DrawnPick {
        card: deck[pick.card_index].clone(),
        is_reversed: pick.is_reversed,
    })
}

/// Per-position seed used by [`draw_spread`].
#[must_use]
pub fn position_seed(seed: &str, position: usize) -> String {
    format!("{seed}|pos={position}")
}

/// Draw every position of `spread` in order without replacement.
///
/// # Errors
///
/// Returns [`OracleError::SpreadTooLarge`] before drawing anything when the
/// spread has more positions than the deck has cards.
pub fn draw_spread(
    deck: &[Card],
    spread: &SpreadType,
    seed: &str,
) -> Result<SpreadResult, OracleError> {
    spread.ensure_fits(deck.len())?;
    let mut used = BTreeSet::new();
    let mut cards = Vec::with_capacity(spread.card_count());
    for (index, position) in spread.positions.iter().enumerate() {
        let pick = draw_one(deck, &position_seed(seed, index), &used)?;
        let card = deck[pick.card_index].clone();
        used.insert(card.id);
        cards.push(DrawnCard {
            card,
            is_reversed: pick.is_reversed,
            position: position.clone(),
        });
    }
    Ok(SpreadResult { cards })
}

/// A spread filled one position at a time, driven by user picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadSession {
    spread: SpreadType,
    result: SpreadResult,
}

impl SpreadSession {
    /// # Errors
    ///
    /// Returns [`OracleError::SpreadTooLarge`] when the deck cannot fill the
    /// spread.
    pub fn new(spread: SpreadType, deck_size: usize) -> Result<Self, OracleError> {
        spread.ensure_fits(deck_size)?;
        Ok(Self {
            spread,
            result: SpreadResult::default(),
        })
    }

    #[must_use]
    pub const fn spread(&self) -> &SpreadType {
        &self.spread
    }

    #[must_use]
    pub const fn result(&self) -> &SpreadResult {
        &self.result
    }

    #[must_use]
    pub fn pick_index(&self) -> usize {
        self.result.len()
    }

    /// Position the next pick will fill, if any remain.
    #[must_use]
    pub fn next_position(&self) -> Option<&Position> {
        self.spread.positions.get(self.pick_index())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next_position().is_none()
    }

    /// Draw the next position with a caller-composed seed. Returns `None`
    /// once every position is filled.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ExhaustedPool`] if the deck runs out, which the
    /// size check in [`SpreadSession::new`] rules out for a fixed deck.
    pub fn pick(&mut self, deck: &[Card], seed: &str) -> Result<Option<&DrawnCard>, OracleError> {
        let Some(position) = self.next_position().cloned() else {
            return Ok(None);
        };
        let drawn = draw_one_card(deck, seed, &self.result.card_ids())?;
        self.result.cards.push(DrawnCard {
            card: drawn.card,
            is_reversed: drawn.is_reversed,
            position,
        });
        Ok(self.result.cards.last())
    }

    #[must_use]
    pub fn into_result(self) -> SpreadResult {
        self.result
    }
}
