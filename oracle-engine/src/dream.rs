//! Map free-text dream descriptions to a card.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::{Catalog, CardId};
use crate::draw::{CardPick, draw_one, draw_orientation};
use crate::error::OracleError;

pub const MAX_DREAM_CHARS: usize = 500;
pub const MIN_DREAM_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamMatch {
    pub pick: CardPick,
    /// The text the match was computed from.
    pub normalized: String,
    /// Keyword that selected the card; `None` when the hash fallback did.
    pub matched_keyword: Option<String>,
}

/// Trim, collapse whitespace runs, lowercase, and cap the length.
#[must_use]
pub fn normalize_dream(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase().chars().take(MAX_DREAM_CHARS).collect()
}

/// Whether `text` is long enough to be worth decoding.
#[must_use]
pub fn is_decodable(text: &str) -> bool {
    normalize_dream(text).chars().count() >= MIN_DREAM_CHARS
}

fn best_keyword_hit(catalog: &Catalog, normalized: &str) -> Option<(CardId, String)> {
    let mut best: Option<(usize, CardId, String)> = None;
    for entry in catalog.dream_keywords() {
        let hits: Vec<&String> = entry
            .keywords
            .iter()
            .filter(|keyword| {
                !keyword.is_empty() && normalized.contains(keyword.to_lowercase().as_str())
            })
            .collect();
        let Some(first) = hits.first() else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((score, card_id, _)) => {
                hits.len() > *score || (hits.len() == *score && entry.card_id < *card_id)
            }
        };
        if better {
            best = Some((hits.len(), entry.card_id, (*first).clone()));
        }
    }
    best.map(|(_, card_id, keyword)| (card_id, keyword))
}

/// Pick a card for a dream.
///
/// Keyword entries score one point per keyword found in the normalized
/// text; the highest score wins and ties go to the lower card id. Text with
/// no keyword hit is hashed straight into the deck. Either way the same text
/// always lands on the same card and orientation.
///
/// # Errors
///
/// Returns [`OracleError::ExhaustedPool`] only for an empty deck.
pub fn match_dream(catalog: &Catalog, text: &str) -> Result<DreamMatch, OracleError> {
    let normalized = normalize_dream(text);
    if let Some((card_id, keyword)) = best_keyword_hit(catalog, &normalized) {
        if catalog.card(card_id).is_some() {
            return Ok(DreamMatch {
                pick: CardPick {
                    card_index: usize::from(card_id),
                    is_reversed: draw_orientation(&normalized),
                },
                normalized,
                matched_keyword: Some(keyword),
            });
        }
    }
    let pick = draw_one(catalog.cards(), &normalized, &BTreeSet::new())?;
    Ok(DreamMatch {
        pick,
        normalized,
        matched_keyword: None,
    })
}
