mod check;
mod file_store;
mod reports;
mod util;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use oracle_engine::draw::orientation_label;
use oracle_engine::narrative::{
    CompletionRequest, compat_request, daily_request, dream_request, spread_request, topic_request,
};
use oracle_engine::{
    COMPAT_TOPICS, Card, CardId, CompatSession, DrawScope, KvStore, Level, MemoryStore, Oracle,
    OracleConfig, Profile, Querent, SleepQuality, SpreadResult, TemplateCompletion, UserRecord,
    WeatherKind, derive_day, is_decodable, parse_date,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use check::{CHECKS, CheckPlan, run_checks};
use file_store::FileStore;
use reports::{ReportFormat, Reading, write_reading};
use util::{parse_birth_date, parse_birth_time, parse_keyword, split_csv};

#[derive(Debug, Parser)]
#[command(name = "oracle", version)]
#[command(about = "Deterministic tarot, hexagram, and sexagenary-day readings")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Device identifier folded into every seed
    #[arg(long, global = true, default_value = "cli")]
    device: String,

    /// Reading date (YYYY-MM-DD); defaults to today in local time
    #[arg(long, global = true)]
    date: Option<String>,

    #[command(flatten)]
    profile: ProfileArgs,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Console)]
    format: ReportFormat,

    /// Optional path to write output instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// JSON file used as the key-value store (in-memory when omitted)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// JSON config document
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append a template narration to the reading
    #[arg(long, global = true)]
    narrate: bool,
}

/// Optional self-report folded into the base seed.
#[derive(Debug, Clone, Default, clap::Args)]
struct ProfileArgs {
    /// Last night's sleep: good, ok, bad
    #[arg(long, global = true, value_parser = parse_keyword::<SleepQuality>)]
    sleep: Option<SleepQuality>,

    /// Stress level: low, mid, high
    #[arg(long, global = true, value_parser = parse_keyword::<Level>)]
    stress: Option<Level>,

    /// Mood level: low, mid, high
    #[arg(long, global = true, value_parser = parse_keyword::<Level>)]
    mood: Option<Level>,

    /// Weather: sunny, cloudy, rain, snow, wind, fog, hot, cold
    #[arg(long, global = true, value_parser = parse_keyword::<WeatherKind>)]
    weather: Option<WeatherKind>,

    /// Birth date (YYYY-MM-DD)
    #[arg(long, global = true, value_parser = parse_birth_date)]
    birth_date: Option<String>,

    /// Birth time (HH:MM)
    #[arg(long, global = true, value_parser = parse_birth_time)]
    birth_time: Option<String>,
}

impl ProfileArgs {
    fn to_profile(&self) -> Profile {
        Profile {
            sleep: self.sleep,
            stress: self.stress,
            mood: self.mood,
            weather: self.weather,
            birth_date: self.birth_date.clone(),
            birth_time: self.birth_time.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Today's sign for this device
    Daily,
    /// Draw a whole spread at once
    Spread {
        #[arg(default_value = "three-card")]
        spread: String,
        /// Extra salt for a fresh draw on the same day
        #[arg(long)]
        nonce: Option<String>,
    },
    /// Draw a spread card by card from face-down table slots
    Pick {
        #[arg(default_value = "three-card")]
        spread: String,
        #[arg(long)]
        nonce: Option<String>,
        /// Shuffle counter shown on the table
        #[arg(long, default_value_t = 0)]
        shuffle: u32,
        /// Table slots clicked, in order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        slots: Vec<usize>,
    },
    /// Topic fortune: hexagram, day phase, and a tarot spread
    Topic {
        topic: String,
        #[arg(long, default_value = "three-card")]
        spread: String,
        #[arg(long)]
        question: Option<String>,
    },
    /// Match a dream description to a card
    Dream { text: String },
    /// Sexagenary designation of the reading date
    Ganzhi,
    /// Two-person compatibility sessions
    Compat {
        #[command(subcommand)]
        action: CompatAction,
    },
    /// Check in for the reading date
    Checkin,
    /// Show this device's stored progress
    User,
    /// List spreads, topics, and checks
    List,
    /// Sweep determinism properties over many seeds
    Check {
        /// Seed tokens (comma-separated)
        #[arg(long, default_value = "1337")]
        seeds: String,
        /// Iterations per seed token
        #[arg(long, default_value_t = 10)]
        iterations: usize,
        /// Checks to run (comma-separated, or "all")
        #[arg(long, default_value = "all")]
        checks: String,
    },
}

#[derive(Debug, Subcommand)]
enum CompatAction {
    /// Draw party A and open a session
    Open {
        #[arg(default_value = "love")]
        topic: String,
        /// Seed for the share-code generator
        #[arg(long)]
        code_seed: Option<u64>,
    },
    /// Join an open session as party B
    Join { code: String },
    /// Show a session
    Show { code: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    if args.format == ReportFormat::Console && args.output.is_none() {
        announce_banner();
    }

    let mut output_target = OutputTarget::new(args.output.clone())?;
    let passed = if let Some(path) = &args.store {
        let store = FileStore::new(path);
        log::info!("using store {}", store.path().display());
        execute(&args, &Oracle::new(store, config), output_target.writer())?
    } else {
        execute(&args, &Oracle::new(MemoryStore::new(), config), output_target.writer())?
    };
    output_target.flush_inner()?;

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

fn announce_banner() {
    println!("{}", "🔮 Cyber Oracle".bright_cyan().bold());
    println!("{}", "================".cyan());
}

fn load_config(path: Option<&Path>) -> Result<OracleConfig> {
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            OracleConfig::from_json(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => OracleConfig::default(),
    };
    config
        .with_env_overrides()
        .context("invalid environment override")
}

fn reading_date(args: &Args) -> Result<NaiveDate> {
    match args.date.as_deref() {
        Some(raw) => Ok(parse_date(raw)?),
        None => Ok(Local::now().date_naive()),
    }
}

/// Run the selected command. Returns `false` when a check sweep failed.
fn execute<S: KvStore>(args: &Args, oracle: &Oracle<S>, out: &mut dyn Write) -> Result<bool> {
    let now = Utc::now();
    let querent = Querent::new(args.device.clone(), reading_date(args)?)
        .with_profile(args.profile.to_profile());
    log::debug!("base seed {}", querent.seed());

    let reading = match &args.command {
        Command::Daily => {
            let sign = oracle.daily(&querent, now)?;
            let day = &sign.gan_zhi;
            let mut reading = Reading::new(
                format!("{} {}日 · 今日签", sign.date, day.designation()),
                serde_json::to_value(&sign)?,
            )
            .line(format!("签牌：{}", card_label(&sign.card, sign.is_reversed)))
            .line(format!("牌义：{}", sign.card.meaning(sign.is_reversed)))
            .line(format!("签文：{}", sign.fortune))
            .line(format!("标签：{}", sign.label))
            .line(format!("五行：{} · {}方 · {}色", day.wuxing, day.direction, day.color));
            let request = daily_request(&oracle.config().narrative, &sign);
            reading.narration = narrate(args, oracle, &request)?;
            reading
        }
        Command::Spread { spread, nonce } => {
            let result = oracle.spread(&querent, spread, nonce.as_deref(), now)?;
            spread_reading(args, oracle, spread, &result)?
        }
        Command::Pick {
            spread,
            nonce,
            shuffle,
            slots,
        } => {
            let mut session = oracle.start_session(spread)?;
            let scoped = querent.scoped_seed(&DrawScope::Spread {
                spread_id: spread.clone(),
                nonce: nonce.clone(),
            });
            while !session.is_complete() {
                let index = session.pick_index();
                let slot = slots.get(index).copied().unwrap_or(index);
                if oracle.pick(&mut session, &scoped, *shuffle, slot)?.is_none() {
                    break;
                }
            }
            spread_reading(args, oracle, spread, &session.into_result())?
        }
        Command::Topic {
            topic,
            spread,
            question,
        } => {
            let reading = oracle.topic(&querent, topic, spread, question.as_deref(), now)?;
            let spread_name = oracle
                .catalog()
                .spread(spread)
                .map_or_else(|| spread.clone(), |s| s.name.clone());
            let request = topic_request(
                &oracle.config().narrative,
                &reading.fortune,
                &reading.topic.name,
                &spread_name,
            );
            let mut out_reading = Reading::new(
                format!("{} {}", reading.topic.icon, reading.topic.name),
                serde_json::to_value(&reading)?,
            )
            .lines(reading.brief.lines().filter(|l| !l.trim().is_empty()));
            out_reading.narration = narrate(args, oracle, &request)?;
            out_reading
        }
        Command::Dream { text } => {
            if !is_decodable(text) {
                bail!("dream description is too short to decode");
            }
            let dream = oracle.dream(&args.device, text, now)?;
            let is_reversed = dream.matched.pick.is_reversed;
            let keyword = dream
                .matched
                .matched_keyword
                .clone()
                .unwrap_or_else(|| "（无关键词，按文本起牌）".to_string());
            let request = dream_request(
                &oracle.config().narrative,
                &dream.matched.normalized,
                &dream.card,
                is_reversed,
            );
            let mut reading = Reading::new("梦境解码", serde_json::to_value(&dream)?)
                .line(format!("梦境牌：{}", card_label(&dream.card, is_reversed)))
                .line(format!("关键词：{keyword}"))
                .line(format!("牌义：{}", dream.card.meaning(is_reversed)));
            reading.narration = narrate(args, oracle, &request)?;
            reading
        }
        Command::Ganzhi => {
            let day = derive_day(querent.date);
            Reading::new(
                format!("{} {}日", querent.date, day.designation()),
                serde_json::to_value(&day)?,
            )
            .line(format!("六十甲子第 {} 位", day.cycle_index + 1))
            .line(format!("五行：{}", day.wuxing))
            .line(format!("方位：{}", day.direction))
            .line(format!("颜色：{}", day.color))
        }
        Command::Compat { action } => compat_reading(args, oracle, &querent, action)?,
        Command::Checkin => {
            let (record, outcome) = oracle.check_in(&args.device, querent.date, now)?;
            let status = if outcome.is_new { "签到成功" } else { "今日已签到" };
            let mut reading = Reading::new(
                status,
                json!({ "outcome": outcome, "record": record }),
            )
            .line(format!("连续签到：{} 天", record.checkin_streak))
            .line(format!("剩余额度：{}", record.credits));
            if outcome.streak_reward {
                reading = reading.line(format!(
                    "连签奖励：+{}",
                    oracle.config().ledger.streak_reward_credits
                ));
            }
            reading
        }
        Command::User => {
            let record = oracle.user(&args.device, now)?;
            user_reading(&args.device, oracle, &record)?
        }
        Command::List => list_reading(oracle),
        Command::Check {
            seeds,
            iterations,
            checks,
        } => {
            let plan = CheckPlan {
                seeds: split_csv(seeds),
                iterations: *iterations,
                date: querent.date,
            };
            return run_check_command(args.format, oracle, &plan, checks, out);
        }
    };

    write_reading(out, args.format, &reading)?;
    Ok(true)
}

fn card_label(card: &Card, is_reversed: bool) -> String {
    format!("{}（{}）", card.display_name(), orientation_label(is_reversed))
}

fn narrate<S: KvStore>(
    args: &Args,
    oracle: &Oracle<S>,
    request: &CompletionRequest,
) -> Result<Option<String>> {
    if !args.narrate {
        return Ok(None);
    }
    let narration = oracle.narrator(TemplateCompletion).narrate_to_string(request)?;
    log::debug!("narration for {} (cached: {})", request.mode, narration.cached);
    Ok(Some(narration.text))
}

fn spread_reading<S: KvStore>(
    args: &Args,
    oracle: &Oracle<S>,
    spread_id: &str,
    result: &SpreadResult,
) -> Result<Reading> {
    let Some(spread) = oracle.catalog().spread(spread_id) else {
        bail!("unknown spread {spread_id:?}");
    };
    let lines = result.cards.iter().map(|drawn| {
        format!(
            "{}：{}｜{}",
            drawn.position.name,
            card_label(&drawn.card, drawn.is_reversed),
            drawn.meaning()
        )
    });
    let mut reading = Reading::new(spread.name.clone(), serde_json::to_value(result)?).lines(lines);
    reading.narration = narrate(
        args,
        oracle,
        &spread_request(&oracle.config().narrative, spread, result),
    )?;
    Ok(reading)
}

fn compat_reading<S: KvStore>(
    args: &Args,
    oracle: &Oracle<S>,
    querent: &Querent,
    action: &CompatAction,
) -> Result<Reading> {
    let now = Utc::now();
    let session = match action {
        CompatAction::Open { topic, code_seed } => {
            let mut rng = code_seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
            oracle.open_compat(querent, topic, &mut rng, now)?
        }
        CompatAction::Join { code } => oracle.join_compat(querent, code, now)?,
        CompatAction::Show { code } => match oracle.compat_session(code)? {
            Some(session) => session,
            None => bail!("compat session {} not found", code.trim().to_uppercase()),
        },
    };
    session_reading(args, oracle, &session, now)
}

fn party_line<S: KvStore>(
    oracle: &Oracle<S>,
    role: &str,
    card_id: CardId,
    is_reversed: bool,
) -> String {
    oracle.catalog().card(card_id).map_or_else(
        || format!("{role}：未知牌 {card_id}"),
        |card| format!("{role}：{}", card_label(card, is_reversed)),
    )
}

fn session_reading<S: KvStore>(
    args: &Args,
    oracle: &Oracle<S>,
    session: &CompatSession,
    now: chrono::DateTime<Utc>,
) -> Result<Reading> {
    let mut reading = Reading::new(
        format!("{} · {}", session.topic_name, session.code),
        serde_json::to_value(session)?,
    )
    .line(party_line(oracle, "甲方", session.a.card_id, session.a.is_reversed));

    match session.b {
        Some(b) => {
            reading = reading.line(party_line(oracle, "乙方", b.card_id, b.is_reversed));
            if let Some(label) = oracle.compat_label(session) {
                reading = reading.line(format!("关系：{label}"));
            }
            let cards = oracle
                .catalog()
                .card(session.a.card_id)
                .zip(oracle.catalog().card(b.card_id));
            if let Some((a_card, b_card)) = cards {
                let request = compat_request(
                    &oracle.config().narrative,
                    &session.topic_name,
                    (a_card, session.a.is_reversed),
                    (b_card, b.is_reversed),
                );
                reading.narration = narrate(args, oracle, &request)?;
            }
        }
        None => {
            reading = reading
                .line(format!("合盘码：{}（分享给对方加入）", session.code))
                .line(format!(
                    "剩余时间：{} 分钟",
                    session.remaining_secs(now) / 60
                ));
        }
    }
    Ok(reading)
}

fn user_reading<S: KvStore>(
    device: &str,
    oracle: &Oracle<S>,
    record: &UserRecord,
) -> Result<Reading> {
    let total = oracle.catalog().cards().len();
    Ok(Reading::new(format!("设备 {device}"), serde_json::to_value(record)?)
        .line(format!("已收集：{}/{total} 张", record.seen_cards.len()))
        .line(format!("累计占卜：{} 次", record.total_readings))
        .line(format!("连续签到：{} 天", record.checkin_streak))
        .line(format!("剩余额度：{}", record.credits)))
}

fn list_reading<S: KvStore>(oracle: &Oracle<S>) -> Reading {
    let catalog = oracle.catalog();
    let spreads: Vec<_> = catalog
        .spreads()
        .iter()
        .map(|s| json!({ "id": s.id, "name": s.name, "cards": s.card_count() }))
        .collect();
    let topics: Vec<_> = catalog
        .topics()
        .iter()
        .map(|t| json!({ "id": t.id, "name": t.name }))
        .collect();
    let compat: Vec<_> = COMPAT_TOPICS
        .iter()
        .map(|t| json!({ "id": t.id, "name": t.name }))
        .collect();
    let checks: Vec<_> = CHECKS.iter().map(|(name, _)| *name).collect();

    let mut lines = Vec::new();
    lines.extend(
        catalog
            .spreads()
            .iter()
            .map(|s| format!("spread  {:18} {}（{} 张）", s.id, s.name, s.card_count())),
    );
    lines.extend(
        catalog
            .topics()
            .iter()
            .map(|t| format!("topic   {:18} {} {}", t.id, t.icon, t.name)),
    );
    lines.extend(
        COMPAT_TOPICS
            .iter()
            .map(|t| format!("compat  {:18} {} {}", t.id, t.icon, t.name)),
    );
    lines.extend(
        CHECKS
            .iter()
            .map(|(name, description)| format!("check   {name:18} {description}")),
    );

    Reading::new(
        "Available readings",
        json!({ "spreads": spreads, "topics": topics, "compat": compat, "checks": checks }),
    )
    .lines(lines)
}

fn expand_checks(raw: &str) -> Vec<String> {
    let mut names = split_csv(raw);
    if names.iter().any(|n| n == "all") {
        names.retain(|n| n != "all");
        for (name, _) in CHECKS {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn run_check_command<S: KvStore>(
    format: ReportFormat,
    oracle: &Oracle<S>,
    plan: &CheckPlan,
    checks: &str,
    out: &mut dyn Write,
) -> Result<bool> {
    let start_time = Instant::now();
    let names = expand_checks(checks);
    if plan.seeds.is_empty() {
        bail!("no seeds given");
    }
    let results = run_checks(oracle.catalog(), plan, &names);
    match format {
        ReportFormat::Json => reports::generate_json_report(out, &results)?,
        ReportFormat::Markdown => reports::generate_markdown_report(out, &results)?,
        ReportFormat::Console => {
            reports::generate_console_report(out, &results, start_time.elapsed())?;
            writeln!(out, "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }
    Ok(results.iter().all(|r| r.passed))
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["oracle", "--device", "dev", "--date", "2024-02-10"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn run_json(oracle: &Oracle<MemoryStore>, extra: &[&str]) -> Value {
        let mut argv = vec!["--format", "json"];
        argv.extend_from_slice(extra);
        let mut buf = Vec::new();
        assert!(execute(&args(&argv), oracle, &mut buf).unwrap());
        serde_json::from_slice(&buf).unwrap()
    }

    fn oracle() -> Oracle<MemoryStore> {
        Oracle::new(MemoryStore::new(), OracleConfig::default())
    }

    #[test]
    fn daily_matches_the_engine() {
        let oracle = oracle();
        let value = run_json(&oracle, &["daily"]);
        let querent = Querent::new("dev", parse_date("2024-02-10").unwrap());
        let sign = oracle.daily(&querent, Utc::now()).unwrap();
        assert_eq!(value["card"]["id"], sign.card.id);
        assert_eq!(value["ganZhi"]["stem"], "甲");
    }

    #[test]
    fn profile_flags_change_the_seed() {
        let plain = args(&["daily"]);
        let tired = args(&["--sleep", "bad", "--weather", "Rain", "daily"]);
        let date = parse_date("2024-02-10").unwrap();
        let a = Querent::new("dev", date).with_profile(plain.profile.to_profile());
        let b = Querent::new("dev", date).with_profile(tired.profile.to_profile());
        assert_ne!(a.seed(), b.seed());
        assert!(b.seed().as_str().contains("sleep=bad|weather=rain"));
    }

    #[test]
    fn invalid_profile_values_are_rejected() {
        assert!(Args::try_parse_from(["oracle", "--birth-time", "25:00", "daily"]).is_err());
        assert!(Args::try_parse_from(["oracle", "--mood", "ecstatic", "daily"]).is_err());
    }

    #[test]
    fn pick_fills_every_position() {
        let value = run_json(&oracle(), &["pick", "celtic-cross", "--slots", "3,1,4"]);
        assert_eq!(value["cards"].as_array().map(Vec::len), Some(10));
    }

    #[test]
    fn narration_is_attached_on_request() {
        let value = run_json(&oracle(), &["--narrate", "spread", "single"]);
        let text = value["narration"].as_str().unwrap();
        assert!(text.starts_with("牌阵已展开。"));
    }

    #[test]
    fn unknown_spread_is_an_error() {
        let mut buf = Vec::new();
        let err = execute(&args(&["spread", "zodiac"]), &oracle(), &mut buf).unwrap_err();
        assert!(err.to_string().contains("zodiac"));
    }

    #[test]
    fn short_dreams_are_refused() {
        let mut buf = Vec::new();
        assert!(execute(&args(&["dream", "飞"]), &oracle(), &mut buf).is_err());
    }

    #[test]
    fn compat_flow_through_one_store() {
        let oracle = oracle();
        let opened = run_json(&oracle, &["compat", "open", "friend", "--code-seed", "9"]);
        let code = opened["code"].as_str().unwrap().to_string();
        assert_eq!(opened["status"], "waiting");

        let join = Args::try_parse_from([
            "oracle", "--device", "other", "--date", "2024-02-10", "--format", "json", "compat",
            "join", code.as_str(),
        ])
        .unwrap();
        let mut buf = Vec::new();
        execute(&join, &oracle, &mut buf).unwrap();
        let joined: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(joined["status"], "ready");
        assert_eq!(joined["a"], opened["a"]);
    }

    #[test]
    fn check_command_reports_all_checks() {
        let value = run_json(&oracle(), &["check", "--seeds", "a,b", "--iterations", "2"]);
        let results = value.as_array().unwrap();
        assert_eq!(results.len(), CHECKS.len());
        assert!(results.iter().all(|r| r["passed"] == true));
    }

    #[test]
    fn expand_checks_handles_all_keyword() {
        let names = expand_checks("no-repeat,all");
        assert_eq!(names[0], "no-repeat");
        assert_eq!(names.len(), CHECKS.len());
    }

    #[test]
    fn markdown_output_uses_headings() {
        let mut buf = Vec::new();
        execute(&args(&["--format", "markdown", "ganzhi"]), &oracle(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("## 2024-02-10 甲辰日"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.writer().write_all(b"ok").unwrap();
        target.flush_inner().unwrap();
    }
}
