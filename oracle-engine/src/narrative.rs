//! Narrative text around a draw.
//!
//! The engine builds the prompt from structured draw fields and hands it to
//! a [`TextCompletion`] backend. Whatever comes back is opaque text: it is
//! streamed to the caller and cached verbatim, never parsed.
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::catalog::{Card, SpreadType};
use crate::config::NarrativeConfig;
use crate::constants::{DAILY_CACHE_TTL_SECS, DIVINE_KEY_PREFIX, READING_CACHE_TTL_SECS};
use crate::daily::DailySign;
use crate::draw::{DrawnCard, SpreadResult, orientation_label};
use crate::error::NarrativeError;
use crate::store::KvStore;
use crate::topic::TopicFortune;

const PERSONA: &str = "你是「赛博神算子」，一位说话现代、犀利又带点幽默的赛博灵媒。不用 markdown。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeMode {
    Daily,
    Spread,
    Topic,
    Dream,
    Compatibility,
}

impl NarrativeMode {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Spread => "spread",
            Self::Topic => "topic",
            Self::Dream => "dream",
            Self::Compatibility => "compatibility",
        }
    }

    #[must_use]
    pub const fn max_tokens(self) -> u32 {
        match self {
            Self::Daily => 320,
            Self::Spread | Self::Topic => 520,
            Self::Dream | Self::Compatibility => 360,
        }
    }

    /// Dream text is personal, so dream narrations are never cached.
    #[must_use]
    pub const fn cache_ttl_secs(self) -> u64 {
        match self {
            Self::Dream => 0,
            Self::Daily => DAILY_CACHE_TTL_SECS,
            Self::Spread | Self::Topic | Self::Compatibility => READING_CACHE_TTL_SECS,
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            Self::Daily => {
                "今日签由干支历法驱动，天干定五行，五行对应塔罗元素。先点出今日干支的气质，再结合牌义给出工作、感情、健康各一两句指引，最后一句忠告。200字以内。"
            }
            Self::Spread => {
                "用户抽了一组塔罗牌阵。先讲整组牌合起来的故事，再逐个位置解读，注意正逆位差异，最后一句总结。300字以内。"
            }
            Self::Topic => {
                "用户就一个主题同时起了卦、看了今日五行、抽了塔罗。把卦象、五行和牌阵交叉印证，指出一致或矛盾之处，给出两三条可执行的建议。400字以内。"
            }
            Self::Dream => {
                "用户描述了一个梦，系统匹配了一张塔罗牌。分别从周公解梦和塔罗原型两个角度解读，再给一个共同结论和一条具体建议。250字以内。"
            }
            Self::Compatibility => {
                "两个人各抽了一张牌。分别解读两人的能量，分析两张牌碰在一起的化学反应，给出关系建议和一个关系标签。250字以内。"
            }
        }
    }

    #[must_use]
    pub fn system_prompt(self) -> String {
        format!("{PERSONA}\n{}", self.instructions())
    }
}

impl std::fmt::Display for NarrativeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub mode: NarrativeMode,
    pub model: String,
    pub system_prompt: String,
    pub user_message: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(mode: NarrativeMode, config: &NarrativeConfig, user_message: String) -> Self {
        Self {
            mode,
            model: config.model.clone(),
            system_prompt: mode.system_prompt(),
            user_message,
            max_tokens: mode.max_tokens(),
            temperature: config.temperature,
        }
    }
}

/// Fields that decide whether two requests would produce the same text.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheFingerprint<'a> {
    model: &'a str,
    system_prompt: &'a str,
    user_message: &'a str,
    max_tokens: u32,
    temperature: f32,
}

/// `co:divine:{mode}:{sha256}` for cacheable modes, `None` for dreams.
#[must_use]
pub fn cache_key(request: &CompletionRequest) -> Option<String> {
    if request.mode.cache_ttl_secs() == 0 {
        return None;
    }
    let fingerprint = CacheFingerprint {
        model: &request.model,
        system_prompt: &request.system_prompt,
        user_message: &request.user_message,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    };
    let json = serde_json::to_string(&fingerprint).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Some(format!(
        "{DIVINE_KEY_PREFIX}{}:{:x}",
        request.mode.key(),
        hasher.finalize()
    ))
}

fn orientation_note(is_reversed: bool) -> String {
    format!("（{}）", orientation_label(is_reversed))
}

fn card_line(drawn: &DrawnCard) -> String {
    format!(
        "{}：{}{}｜{}",
        drawn.position.name,
        drawn.card.display_name(),
        orientation_note(drawn.is_reversed),
        drawn.meaning()
    )
}

fn spread_lines(spread: &SpreadResult) -> String {
    spread
        .cards
        .iter()
        .map(card_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn daily_request(config: &NarrativeConfig, sign: &DailySign) -> CompletionRequest {
    let day = &sign.gan_zhi;
    let message = [
        format!("日期：{}", sign.date),
        format!(
            "天干地支：{}（{}，{}行，{}方，{}色）",
            day.designation(),
            day.wuxing,
            day.element.label(),
            day.direction,
            day.color
        ),
        format!(
            "今日签牌：{}{}",
            sign.card.display_name(),
            orientation_note(sign.is_reversed)
        ),
        format!("牌义：{}", sign.card.meaning(sign.is_reversed)),
        format!("今日签文：{}", sign.fortune),
    ]
    .join("\n");
    CompletionRequest::new(NarrativeMode::Daily, config, message)
}

#[must_use]
pub fn spread_request(
    config: &NarrativeConfig,
    spread: &SpreadType,
    result: &SpreadResult,
) -> CompletionRequest {
    let message = format!("牌阵：{}\n各位置牌面：\n{}", spread.name, spread_lines(result));
    CompletionRequest::new(NarrativeMode::Spread, config, message)
}

#[must_use]
pub fn topic_request(
    config: &NarrativeConfig,
    fortune: &TopicFortune,
    topic_name: &str,
    spread_name: &str,
) -> CompletionRequest {
    let hex = &fortune.hexagram;
    let day = &fortune.gan_zhi;
    let message = [
        format!("专项主题：{topic_name}"),
        String::new(),
        "【周易卦象】".to_string(),
        format!("起卦：{}卦 {}", hex.name, hex.symbol),
        format!("上卦{} · 下卦{}", hex.upper, hex.lower),
        format!("卦性：{}", hex.nature),
        format!("关键词：{}", hex.keywords),
        String::new(),
        "【五行能量场】".to_string(),
        format!(
            "今日天干地支：{}（{}，{}行）",
            day.designation(),
            day.wuxing,
            day.element.label()
        ),
        format!("五行对{topic_name}的影响：{}", fortune.wuxing_analysis),
        String::new(),
        "【塔罗牌阵】".to_string(),
        format!("牌阵：{spread_name}"),
        spread_lines(&fortune.spread),
    ]
    .join("\n");
    CompletionRequest::new(NarrativeMode::Topic, config, message)
}

#[must_use]
pub fn dream_request(
    config: &NarrativeConfig,
    dream_text: &str,
    card: &Card,
    is_reversed: bool,
) -> CompletionRequest {
    let message = [
        format!("梦境内容：{dream_text}"),
        format!(
            "匹配塔罗牌：{}{}",
            card.display_name(),
            orientation_note(is_reversed)
        ),
        format!("牌义：{}", card.meaning(is_reversed)),
        format!("元素：{}", card.element.label()),
    ]
    .join("\n");
    CompletionRequest::new(NarrativeMode::Dream, config, message)
}

#[must_use]
pub fn compat_request(
    config: &NarrativeConfig,
    topic_name: &str,
    a: (&Card, bool),
    b: (&Card, bool),
) -> CompletionRequest {
    let person = |(card, is_reversed): (&Card, bool)| {
        format!(
            "{}{}｜{}",
            card.display_name(),
            orientation_note(is_reversed),
            card.meaning(is_reversed)
        )
    };
    let message = [
        format!("合盘主题：{topic_name}"),
        format!("甲方牌面：{}", person(a)),
        format!("乙方牌面：{}", person(b)),
    ]
    .join("\n");
    CompletionRequest::new(NarrativeMode::Compatibility, config, message)
}

/// Streaming text generator.
pub trait TextCompletion {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Generate text for `request`, passing chunks to `sink` as they arrive.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot produce text.
    fn complete(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(&str),
    ) -> Result<(), Self::Error>;
}

/// Offline backend that restates the structured request as a reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateCompletion;

impl TextCompletion for TemplateCompletion {
    type Error = std::convert::Infallible;

    fn complete(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(&str),
    ) -> Result<(), Self::Error> {
        let opener = match request.mode {
            NarrativeMode::Daily => "今日信号已接收。",
            NarrativeMode::Spread => "牌阵已展开。",
            NarrativeMode::Topic => "三体合一，读数如下。",
            NarrativeMode::Dream => "梦境已解码。",
            NarrativeMode::Compatibility => "合盘结果出炉。",
        };
        sink(opener);
        for line in request.user_message.lines().filter(|l| !l.trim().is_empty()) {
            sink("\n");
            sink(line);
        }
        Ok(())
    }
}

/// Narration text plus whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub text: String,
    pub cached: bool,
}

/// Cache-aware front for a completion backend.
///
/// Cache reads and writes are best-effort: store failures are logged and the
/// request proceeds as a miss.
#[derive(Debug, Clone)]
pub struct NarrativeService<B, S> {
    backend: B,
    store: S,
}

impl<B, S> NarrativeService<B, S>
where
    B: TextCompletion,
    S: KvStore,
{
    pub const fn new(backend: B, store: S) -> Self {
        Self { backend, store }
    }

    /// Stream narration for `request` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::Backend`] if the backend fails on a cache
    /// miss.
    pub fn narrate(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(&str),
    ) -> Result<Narration, NarrativeError<B::Error>> {
        let key = cache_key(request);
        if let Some(key) = key.as_deref() {
            match self.store.get(key) {
                Ok(Some(text)) => {
                    log::debug!("narrative cache hit for {}", request.mode);
                    sink(&text);
                    return Ok(Narration { text, cached: true });
                }
                Ok(None) => log::debug!("narrative cache miss for {}", request.mode),
                Err(err) => log::warn!("narrative cache read failed: {err}"),
            }
        }

        let mut text = String::new();
        self.backend
            .complete(request, &mut |chunk: &str| {
                text.push_str(chunk);
                sink(chunk);
            })
            .map_err(NarrativeError::Backend)?;

        if let Some(key) = key.as_deref() {
            if !text.is_empty() {
                let ttl = request.mode.cache_ttl_secs();
                if let Err(err) = self.store.set(key, &text, Some(ttl)) {
                    log::warn!("narrative cache write failed: {err}");
                }
            }
        }
        Ok(Narration {
            text,
            cached: false,
        })
    }

    /// Collect a narration into a string without streaming.
    ///
    /// # Errors
    ///
    /// See [`NarrativeService::narrate`].
    pub fn narrate_to_string(
        &self,
        request: &CompletionRequest,
    ) -> Result<Narration, NarrativeError<B::Error>> {
        self.narrate(request, &mut |_| {})
    }
}
