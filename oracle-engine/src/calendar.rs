//! Sexagenary (天干地支) day derivation.
//!
//! Pure date arithmetic over the 60-day cycle; no seed is involved, so a given
//! date always maps to the same stem, branch, and phase.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::Element;
use crate::error::OracleError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 1949-10-01 is a 甲子 day: stem 0, branch 0.
const ANCHOR: (i32, u32, u32) = (1949, 10, 1);

pub const STEMS: [&str; 10] = [
    "甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸",
];
pub const BRANCHES: [&str; 12] = [
    "子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥",
];

/// The five phases (五行).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

impl Phase {
    pub const ALL: [Self; 5] = [
        Self::Wood,
        Self::Fire,
        Self::Earth,
        Self::Metal,
        Self::Water,
    ];

    /// Stems come in pairs: 甲乙 wood, 丙丁 fire, 戊己 earth, 庚辛 metal, 壬癸 water.
    #[must_use]
    pub const fn from_stem(stem_index: usize) -> Self {
        match (stem_index % 10) / 2 {
            0 => Self::Wood,
            1 => Self::Fire,
            2 => Self::Earth,
            3 => Self::Metal,
            _ => Self::Water,
        }
    }

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Wood => "wood",
            Self::Fire => "fire",
            Self::Earth => "earth",
            Self::Metal => "metal",
            Self::Water => "water",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Wood => "木",
            Self::Fire => "火",
            Self::Earth => "土",
            Self::Metal => "金",
            Self::Water => "水",
        }
    }

    #[must_use]
    pub const fn direction(self) -> &'static str {
        match self {
            Self::Wood => "东",
            Self::Fire => "南",
            Self::Earth => "中",
            Self::Metal => "西",
            Self::Water => "北",
        }
    }

    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Wood => "青",
            Self::Fire => "赤",
            Self::Earth => "黄",
            Self::Metal => "白",
            Self::Water => "黑",
        }
    }

    /// Tarot element sharing the phase's suit material: wands are wood,
    /// swords are metal, pentacles are earth, cups hold water.
    #[must_use]
    pub const fn tarot_element(self) -> Element {
        match self {
            Self::Wood | Self::Fire => Element::Fire,
            Self::Earth => Element::Earth,
            Self::Metal => Element::Air,
            Self::Water => Element::Water,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One day of the sexagenary cycle together with its phase attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SexagenaryDay {
    pub cycle_index: usize,
    pub stem_index: usize,
    pub branch_index: usize,
    pub stem: String,
    pub branch: String,
    /// Polarity plus phase, e.g. `阳木`.
    pub wuxing: String,
    pub element: Phase,
    pub direction: String,
    pub color: String,
}

impl SexagenaryDay {
    /// `甲辰` style two-character designation.
    #[must_use]
    pub fn designation(&self) -> String {
        format!("{}{}", self.stem, self.branch)
    }
}

fn anchor() -> NaiveDate {
    let (y, m, d) = ANCHOR;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
///
/// Returns [`OracleError::InvalidDate`] for anything that is not a real
/// calendar date in that format.
pub fn parse_date(input: &str) -> Result<NaiveDate, OracleError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| OracleError::InvalidDate {
        input: input.to_string(),
    })
}

/// Format a date the way seeds and records store it.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Derive the sexagenary designation for `date`.
#[must_use]
pub fn derive_day(date: NaiveDate) -> SexagenaryDay {
    let days = (date - anchor()).num_days();
    let stem_index = index_in(days, 10);
    let branch_index = index_in(days, 12);
    let element = Phase::from_stem(stem_index);
    let polarity = if stem_index % 2 == 0 { "阳" } else { "阴" };
    SexagenaryDay {
        cycle_index: index_in(days, 60),
        stem_index,
        branch_index,
        stem: STEMS[stem_index].to_string(),
        branch: BRANCHES[branch_index].to_string(),
        wuxing: format!("{polarity}{}", element.label()),
        element,
        direction: element.direction().to_string(),
        color: element.color().to_string(),
    }
}

/// Parse then derive.
///
/// # Errors
///
/// Returns [`OracleError::InvalidDate`] when `input` is malformed.
pub fn derive_day_str(input: &str) -> Result<SexagenaryDay, OracleError> {
    parse_date(input).map(derive_day)
}

fn index_in(days: i64, modulus: i64) -> usize {
    usize::try_from(days.rem_euclid(modulus)).unwrap_or(0)
}
