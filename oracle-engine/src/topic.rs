//! Topic fortunes: hexagram, day phase, and a tarot spread cast together for
//! one life topic.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{SexagenaryDay, derive_day};
use crate::catalog::{Catalog, HEXAGRAM_COUNT, Hexagram, SpreadType};
use crate::draw::{SpreadResult, draw_spread};
use crate::error::OracleError;
use crate::hash::bounded_index;

const HEXAGRAM_SALT: &str = "|hexagram";
const TAROT_SALT: &str = "|tarot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicFortune {
    pub topic_id: String,
    pub hexagram: Hexagram,
    pub gan_zhi: SexagenaryDay,
    pub wuxing_analysis: String,
    pub spread: SpreadResult,
}

/// Cast the three systems for `topic_id` on `date`.
///
/// Each system hashes its own salted copy of `seed`, so the hexagram never
/// influences the cards and the day is derived from the calendar alone.
///
/// # Errors
///
/// Returns [`OracleError::UnknownTopic`] for a topic missing from the catalog
/// or its analysis table, and [`OracleError::SpreadTooLarge`] when the spread
/// cannot be filled. Both are checked before anything is drawn.
pub fn cast_topic_fortune(
    catalog: &Catalog,
    topic_id: &str,
    spread: &SpreadType,
    seed: &str,
    date: NaiveDate,
) -> Result<TopicFortune, OracleError> {
    let unknown = || OracleError::UnknownTopic {
        topic: topic_id.to_string(),
    };
    catalog.topic(topic_id).ok_or_else(unknown)?;
    spread.ensure_fits(catalog.cards().len())?;

    let gan_zhi = derive_day(date);
    let wuxing_analysis = catalog
        .wuxing_analysis(topic_id, gan_zhi.element)
        .ok_or_else(unknown)?
        .to_string();
    let hexagram_count = catalog.hexagrams().len().min(HEXAGRAM_COUNT);
    let hexagram_index = bounded_index(&format!("{seed}{HEXAGRAM_SALT}"), hexagram_count);
    let hexagram = catalog.hexagrams()[hexagram_index].clone();
    let spread = draw_spread(catalog.cards(), spread, &format!("{seed}{TAROT_SALT}"))?;

    Ok(TopicFortune {
        topic_id: topic_id.to_string(),
        hexagram,
        gan_zhi,
        wuxing_analysis,
        spread,
    })
}

/// Closing line keyed by the share of upright cards.
fn resonance(upright: usize, total: usize) -> &'static str {
    if total == 0 {
        "牌面尚未展开，先以卦象与日辰为参照。"
    } else if upright == total {
        "三系同频，顺势而行即可。"
    } else if upright == 0 {
        "牌面皆逆，宜守不宜攻，先整理再出发。"
    } else if upright * 2 >= total {
        "顺多逆少，整体可期，留意逆位所提示的细节。"
    } else {
        "逆多顺少，节奏放慢，把注意力放回可控之处。"
    }
}

/// Template reading assembled only from the fortune's own fields.
///
/// Works on partially drawn spreads, including an empty one, so the
/// interactive flow can refresh it after every pick.
#[must_use]
pub fn brief_reading(fortune: &TopicFortune, topic_name: &str) -> String {
    let mut lines = Vec::with_capacity(fortune.spread.len() + 4);
    lines.push(format!("【{topic_name}】"));
    let hex = &fortune.hexagram;
    lines.push(format!(
        "得{}卦 {}，{}；关键词：{}。",
        hex.name, hex.symbol, hex.nature, hex.keywords
    ));
    let day = &fortune.gan_zhi;
    lines.push(format!(
        "今日{}日，{}当令，{}",
        day.designation(),
        day.wuxing,
        fortune.wuxing_analysis
    ));
    for drawn in &fortune.spread.cards {
        lines.push(format!(
            "{}：{}{}，{}。",
            drawn.position.name,
            drawn.card.display_name(),
            drawn.orientation_label(),
            drawn.meaning()
        ));
    }
    lines.push(resonance(fortune.spread.upright_count(), fortune.spread.len()).to_string());
    lines.join("\n")
}
