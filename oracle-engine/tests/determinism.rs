use std::collections::BTreeSet;

use chrono::Duration;
use oracle_engine::{
    Catalog, DrawScope, Level, Phase, Profile, SleepQuality, WeatherKind, bounded_index,
    cast_topic_fortune, compose_scoped_seed, compose_seed, daily_sign, derive_day,
    derive_day_str, draw_one, draw_spread, match_dream, parse_date,
};

fn catalog() -> &'static Catalog {
    Catalog::default_catalog()
}

fn ids_and_flips(result: &oracle_engine::SpreadResult) -> Vec<(u16, bool)> {
    result
        .cards
        .iter()
        .map(|drawn| (drawn.card.id, drawn.is_reversed))
        .collect()
}

#[test]
fn scenario_three_card_spread_is_pinned() {
    let spread = catalog().spread("three-card").unwrap();
    let result = draw_spread(catalog().cards(), spread, "device42|2024-01-01").unwrap();
    assert_eq!(
        ids_and_flips(&result),
        vec![(10, true), (9, false), (20, true)]
    );
    let again = draw_spread(catalog().cards(), spread, "device42|2024-01-01").unwrap();
    assert_eq!(result, again);
}

#[test]
fn longer_spreads_extend_shorter_ones() {
    let three = catalog().spread("three-card").unwrap();
    let celtic = catalog().spread("celtic-cross").unwrap();
    let short = draw_spread(catalog().cards(), three, "device42|2024-01-01").unwrap();
    let long = draw_spread(catalog().cards(), celtic, "device42|2024-01-01").unwrap();
    assert_eq!(long.len(), 10);
    assert_eq!(
        ids_and_flips(&long),
        vec![
            (10, true),
            (9, false),
            (20, true),
            (7, true),
            (0, true),
            (17, true),
            (14, true),
            (4, true),
            (11, true),
            (6, true),
        ]
    );
    let prefix: Vec<_> = ids_and_flips(&long).into_iter().take(3).collect();
    assert_eq!(prefix, ids_and_flips(&short));
}

#[test]
fn no_card_repeats_within_any_spread() {
    for spread in catalog().spreads() {
        for n in 0..300 {
            let result = draw_spread(catalog().cards(), spread, &format!("sweep-{n}")).unwrap();
            let unique: BTreeSet<_> = result.card_ids().into_iter().collect();
            assert_eq!(unique.len(), spread.card_count(), "{} seed {n}", spread.id);
        }
    }
}

#[test]
fn scenario_lunar_new_year_day() {
    let day = derive_day_str("2024-02-10").unwrap();
    assert_eq!(
        (
            day.stem.as_str(),
            day.branch.as_str(),
            day.wuxing.as_str(),
            day.element,
            day.direction.as_str(),
            day.color.as_str()
        ),
        ("甲", "辰", "阳木", Phase::Wood, "东", "青")
    );
}

#[test]
fn calendar_is_periodic_and_pure() {
    let start = parse_date("1999-12-25").unwrap();
    for offset in 0..400 {
        let date = start + Duration::days(offset);
        assert_eq!(derive_day(date), derive_day(date));
        assert_eq!(derive_day(date), derive_day(date + Duration::days(60)));
    }
}

#[test]
fn scenario_career_topic_is_reproducible() {
    let spread = catalog().spread("three-card").unwrap();
    let date = parse_date("2024-02-10").unwrap();
    let first = cast_topic_fortune(catalog(), "career", spread, "seedX", date).unwrap();
    let second = cast_topic_fortune(catalog(), "career", spread, "seedX", date).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.hexagram.number, 8);
    assert_eq!(first.hexagram.name, "比");
    assert_eq!(
        ids_and_flips(&first.spread),
        vec![(13, true), (17, true), (19, false)]
    );
}

#[test]
fn scenario_flying_dream_is_stable() {
    let first = match_dream(catalog(), "我梦到自己在飞").unwrap();
    for _ in 0..5 {
        assert_eq!(match_dream(catalog(), "我梦到自己在飞").unwrap(), first);
    }
    assert_eq!(first.pick.card_index, 0);
    assert!(!first.pick.is_reversed);
}

#[test]
fn card_choice_does_not_force_orientation() {
    let spread = catalog().spread("three-card").unwrap();
    for position in 0..spread.card_count() {
        let mut seen = BTreeSet::new();
        for n in 0..3_000 {
            let result = draw_spread(catalog().cards(), spread, &format!("o-{n}")).unwrap();
            let drawn = &result.cards[position];
            seen.insert((drawn.card.id, drawn.is_reversed));
        }
        assert_eq!(seen.len(), catalog().cards().len() * 2, "position {position}");
    }
}

#[test]
fn single_draws_show_each_card_both_ways() {
    let mut seen = BTreeSet::new();
    for n in 0..3_000 {
        let seed = format!("seed-{n}|tarot");
        let pick = draw_one(catalog().cards(), &seed, &BTreeSet::new()).unwrap();
        seen.insert((pick.card_index, pick.is_reversed));
    }
    assert_eq!(seen.len(), catalog().cards().len() * 2);
}

#[test]
fn profile_fields_all_feed_the_seed() {
    let full = Profile {
        sleep: Some(SleepQuality::Ok),
        stress: Some(Level::Mid),
        mood: Some(Level::Low),
        weather: Some(WeatherKind::Fog),
        birth_date: Some("2001-01-01".into()),
        birth_time: Some("23:59".into()),
    };
    let mut seeds = BTreeSet::new();
    seeds.insert(compose_seed("dev", "2024-01-01", &full));
    seeds.insert(compose_seed("dev", "2024-01-01", &Profile::default()));
    let without = Profile {
        sleep: None,
        ..full.clone()
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    let without = Profile {
        stress: None,
        ..full.clone()
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    let without = Profile {
        mood: None,
        ..full.clone()
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    let without = Profile {
        weather: None,
        ..full.clone()
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    let without = Profile {
        birth_date: None,
        ..full.clone()
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    let without = Profile {
        birth_time: None,
        ..full
    };
    seeds.insert(compose_seed("dev", "2024-01-01", &without));
    assert_eq!(seeds.len(), 8);
}

#[test]
fn daily_sign_is_pinned() {
    let base = compose_seed("dev", "2024-02-10", &Profile::default());
    let seed = compose_scoped_seed(&base, &DrawScope::Daily);
    assert_eq!(seed.as_str(), "d=dev|date=2024-02-10|scope=daily");
    let sign = daily_sign(catalog(), seed.as_str(), parse_date("2024-02-10").unwrap()).unwrap();
    assert_eq!(sign.card.id, 16);
    assert!(sign.is_reversed);
    assert_eq!(sign.fortune, catalog().daily_fortunes()[2]);
    assert_eq!(sign.label, catalog().labels()[1]);
}

#[test]
fn bounded_index_agrees_with_draws() {
    let pick = draw_one(catalog().cards(), "device42|2024-01-01|pos=0", &BTreeSet::new()).unwrap();
    assert_eq!(
        pick.card_index,
        bounded_index("device42|2024-01-01|pos=0", catalog().cards().len())
    );
}
