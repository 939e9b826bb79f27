//! Property sweeps over many seeds.
//!
//! Each check runs once per (seed token, iteration) pair and records the
//! first few failures verbatim so a broken build points at a reproducible
//! seed.
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use oracle_engine::{
    Catalog, LedgerConfig, UserRecord, cast_topic_fortune, derive_day, draw_spread, match_dream,
    merge,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

const MAX_RECORDED_FAILURES: usize = 10;

pub const CHECKS: [(&str, &str); 6] = [
    ("spread-determinism", "same seed, same spread, same cards"),
    ("no-repeat", "no card appears twice within one spread"),
    ("topic-reproducible", "topic fortunes repeat for a fixed seed and date"),
    ("dream-stable", "dream matches repeat for the same text"),
    ("calendar-cycle", "the sexagenary day repeats every 60 days"),
    ("merge-laws", "ledger merge is commutative and idempotent"),
];

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    pub average_duration: Duration,
}

/// Seeds and date a sweep runs over.
#[derive(Debug, Clone)]
pub struct CheckPlan {
    pub seeds: Vec<String>,
    pub iterations: usize,
    pub date: NaiveDate,
}

impl CheckPlan {
    fn seed_inputs(&self) -> impl Iterator<Item = (usize, String)> + '_ {
        self.seeds.iter().flat_map(move |token| {
            (0..self.iterations.max(1)).map(move |i| (i, format!("{token}#{i}")))
        })
    }
}

/// Run every check named in `names`; unknown names come back as failures.
pub fn run_checks(catalog: &Catalog, plan: &CheckPlan, names: &[String]) -> Vec<CheckResult> {
    names
        .iter()
        .map(|name| run_check(catalog, plan, name))
        .collect()
}

fn run_check(catalog: &Catalog, plan: &CheckPlan, name: &str) -> CheckResult {
    let mut failures = Vec::new();
    let mut runs = 0usize;
    let mut successes = 0usize;
    let mut elapsed = Duration::ZERO;

    for (iteration, seed) in plan.seed_inputs() {
        let started = Instant::now();
        let outcome = match name {
            "spread-determinism" => check_spread_determinism(catalog, &seed),
            "no-repeat" => check_no_repeat(catalog, &seed),
            "topic-reproducible" => check_topic(catalog, &seed, plan.date),
            "dream-stable" => check_dream(catalog, &seed),
            "calendar-cycle" => check_calendar(plan.date, iteration),
            "merge-laws" => check_merge(catalog, &seed),
            other => Err(format!("unknown check {other:?}")),
        };
        elapsed += started.elapsed();
        runs += 1;
        match outcome {
            Ok(()) => successes += 1,
            Err(message) => {
                if failures.len() < MAX_RECORDED_FAILURES {
                    failures.push(format!("{seed}: {message}"));
                }
            }
        }
    }

    let average_duration = u32::try_from(runs)
        .ok()
        .filter(|n| *n > 0)
        .map_or(Duration::ZERO, |n| elapsed / n);
    log::debug!("{name}: {successes}/{runs} in {elapsed:?}");
    CheckResult {
        check_name: name.to_string(),
        passed: runs > 0 && successes == runs,
        iterations_run: runs,
        successful_iterations: successes,
        failures,
        average_duration,
    }
}

fn check_spread_determinism(catalog: &Catalog, seed: &str) -> Result<(), String> {
    for spread in catalog.spreads() {
        let first = draw_spread(catalog.cards(), spread, seed).map_err(|e| e.to_string())?;
        let second = draw_spread(catalog.cards(), spread, seed).map_err(|e| e.to_string())?;
        if first != second {
            return Err(format!(
                "{} drew {:?} then {:?}",
                spread.id,
                first.card_ids(),
                second.card_ids()
            ));
        }
    }
    Ok(())
}

fn check_no_repeat(catalog: &Catalog, seed: &str) -> Result<(), String> {
    for spread in catalog.spreads() {
        let result = draw_spread(catalog.cards(), spread, seed).map_err(|e| e.to_string())?;
        let unique: BTreeSet<_> = result.card_ids().into_iter().collect();
        if unique.len() != spread.card_count() {
            return Err(format!("{} repeated a card: {:?}", spread.id, result.card_ids()));
        }
    }
    Ok(())
}

fn check_topic(catalog: &Catalog, seed: &str, date: NaiveDate) -> Result<(), String> {
    let Some(spread) = catalog.spread("three-card") else {
        return Err("catalog has no three-card spread".to_string());
    };
    for topic in catalog.topics() {
        let first = cast_topic_fortune(catalog, &topic.id, spread, seed, date)
            .map_err(|e| e.to_string())?;
        let second = cast_topic_fortune(catalog, &topic.id, spread, seed, date)
            .map_err(|e| e.to_string())?;
        if first != second {
            return Err(format!("topic {} changed between casts", topic.id));
        }
    }
    Ok(())
}

fn check_dream(catalog: &Catalog, seed: &str) -> Result<(), String> {
    let text = format!("梦见{seed}");
    let first = match_dream(catalog, &text).map_err(|e| e.to_string())?;
    let second = match_dream(catalog, &text).map_err(|e| e.to_string())?;
    if first == second {
        Ok(())
    } else {
        Err(format!("dream matched {:?} then {:?}", first.pick, second.pick))
    }
}

fn check_calendar(start: NaiveDate, offset: usize) -> Result<(), String> {
    let offset = i64::try_from(offset).map_err(|e| e.to_string())?;
    let date = start + ChronoDuration::days(offset);
    let later = date + ChronoDuration::days(60);
    if derive_day(date) == derive_day(later) {
        Ok(())
    } else {
        Err(format!("{date} and {later} disagree"))
    }
}

fn record_from_draw(
    catalog: &Catalog,
    seed: &str,
    at: DateTime<Utc>,
) -> Result<UserRecord, String> {
    let mut record = UserRecord::new(at, &LedgerConfig::default());
    let Some(spread) = catalog.spread("celtic-cross") else {
        return Err("catalog has no celtic-cross spread".to_string());
    };
    let result = draw_spread(catalog.cards(), spread, seed).map_err(|e| e.to_string())?;
    for id in result.card_ids().into_iter().take(1 + result.upright_count()) {
        record.record_card_seen(id, at);
        record.record_reading(at);
    }
    Ok(record)
}

fn check_merge(catalog: &Catalog, seed: &str) -> Result<(), String> {
    let t0 = DateTime::<Utc>::UNIX_EPOCH;
    let a = record_from_draw(catalog, &format!("{seed}|a"), t0)?;
    let b = record_from_draw(catalog, &format!("{seed}|b"), t0 + ChronoDuration::hours(1))?;
    if merge(&a, &b) != merge(&b, &a) {
        return Err("merge is not commutative".to_string());
    }
    if merge(&a, &a) != a {
        return Err("merge is not idempotent".to_string());
    }
    let merged = merge(&a, &b);
    if !merged.seen_cards.is_superset(&a.seen_cards)
        || !merged.seen_cards.is_superset(&b.seen_cards)
    {
        return Err("merge dropped a seen card".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(iterations: usize) -> CheckPlan {
        CheckPlan {
            seeds: vec!["1337".to_string(), "device42".to_string()],
            iterations,
            date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
        }
    }

    #[test]
    fn every_builtin_check_passes() {
        let names: Vec<String> = CHECKS.iter().map(|(name, _)| (*name).to_string()).collect();
        let results = run_checks(Catalog::default_catalog(), &plan(5), &names);
        assert_eq!(results.len(), CHECKS.len());
        for result in results {
            assert!(result.passed, "{} failed: {:?}", result.check_name, result.failures);
            assert_eq!(result.iterations_run, 10);
        }
    }

    #[test]
    fn unknown_checks_fail_with_a_message() {
        let results = run_checks(Catalog::default_catalog(), &plan(1), &["vibes".to_string()]);
        assert!(!results[0].passed);
        assert_eq!(results[0].failures.len(), 2);
        assert!(results[0].failures[0].contains("unknown check"));
    }

    #[test]
    fn zero_iterations_still_runs_each_seed_once() {
        let results = run_checks(
            Catalog::default_catalog(),
            &plan(0),
            &["no-repeat".to_string()],
        );
        assert_eq!(results[0].iterations_run, 2);
    }
}
