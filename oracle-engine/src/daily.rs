//! Daily sign: the day's sexagenary phase picks a tarot element, and a
//! seeded draw from that element's cards gives the sign.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::calendar::{SexagenaryDay, derive_day, format_date};
use crate::catalog::{Card, CardId, Catalog};
use crate::draw::draw_one;
use crate::error::OracleError;
use crate::hash::bounded_index;

/// One device's sign for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySign {
    pub date: String,
    pub gan_zhi: SexagenaryDay,
    pub card: Card,
    pub is_reversed: bool,
    pub fortune: String,
    pub label: String,
}

/// Draw the daily sign.
///
/// The day's phase picks a tarot element and only cards of that element are
/// eligible. If the catalog has no card of that element the whole deck is
/// used instead.
///
/// # Errors
///
/// Returns [`OracleError::ExhaustedPool`] when the deck is empty.
pub fn daily_sign(
    catalog: &Catalog,
    seed: &str,
    date: NaiveDate,
) -> Result<DailySign, OracleError> {
    let gan_zhi = derive_day(date);
    let element = gan_zhi.element.tarot_element();
    let mut excluded: BTreeSet<CardId> = catalog
        .cards()
        .iter()
        .filter(|card| card.element != element)
        .map(|card| card.id)
        .collect();
    if excluded.len() == catalog.cards().len() {
        excluded.clear();
    }
    let pick = draw_one(catalog.cards(), seed, &excluded)?;
    Ok(DailySign {
        date: format_date(date),
        gan_zhi,
        card: catalog.cards()[pick.card_index].clone(),
        is_reversed: pick.is_reversed,
        fortune: pick_text(catalog.daily_fortunes(), seed, "|fortune"),
        label: pick_text(catalog.labels(), seed, "|label"),
    })
}

fn pick_text(pool: &[String], seed: &str, salt: &str) -> String {
    if pool.is_empty() {
        return String::new();
    }
    pool[bounded_index(&format!("{seed}{salt}"), pool.len())].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_date;
    use crate::catalog::Element;

    #[test]
    fn card_matches_the_day_element() {
        let catalog = Catalog::default_catalog();
        let date = parse_date("2024-02-10").unwrap();
        for n in 0..50 {
            let sign = daily_sign(catalog, &format!("device-{n}"), date).unwrap();
            assert_eq!(sign.card.element, Element::Fire);
            assert_eq!(sign.gan_zhi.designation(), "甲辰");
            assert_eq!(sign.date, "2024-02-10");
        }
    }

    #[test]
    fn metal_days_draw_air_cards() {
        let catalog = Catalog::default_catalog();
        // 2024-01-07 is 庚午.
        let date = parse_date("2024-01-07").unwrap();
        let sign = daily_sign(catalog, "dev", date).unwrap();
        assert_eq!(sign.gan_zhi.stem, "庚");
        assert_eq!(sign.card.element, Element::Air);
    }

    #[test]
    fn same_seed_same_sign() {
        let catalog = Catalog::default_catalog();
        let date = parse_date("2024-03-01").unwrap();
        assert_eq!(
            daily_sign(catalog, "seed", date).unwrap(),
            daily_sign(catalog, "seed", date).unwrap()
        );
        let sign = daily_sign(catalog, "seed", date).unwrap();
        assert!(catalog.daily_fortunes().contains(&sign.fortune));
        assert!(catalog.labels().contains(&sign.label));
    }
}
