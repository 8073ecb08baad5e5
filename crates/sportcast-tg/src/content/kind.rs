use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport limit for a photo caption in characters
pub const CAPTION_LIMIT: usize = 1024;

/// Transport limit for a text message in characters
pub const MESSAGE_LIMIT: usize = 4096;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Closed set of categories of the generated content
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Live,
    Betting,
    News,
    Analysis,
    Polls,
    Coupons,
    Memes,
    DailySummary,
    WeeklySummary,
}

sqlx_bat::impl_try_into_from_db_via_str!(ContentKind);

/// How the content is delivered to a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStrategy {
    /// Native poll with structured options
    Poll,

    /// Album of several images with the text in the caption of the first one
    MediaGroup,

    /// Text message or a photo with caption, followed by the inline keyboard
    Generic,
}

/// Static rules that the content kind imposes on every stage of the pipeline
#[derive(Debug)]
pub struct KindConfig {
    pub emoji: &'static str,

    /// Whether the content should be accompanied by an image
    pub needs_image: bool,

    /// Maximum length of the formatted text sent as a standalone message
    pub max_message_len: usize,

    /// Maximum length of the formatted text sent as a photo caption
    pub max_caption_len: usize,

    /// `false` means the text is never truncated and is split into several
    /// messages instead
    pub truncate: bool,

    /// Minimal interval between two sends of this kind to the same channel
    pub cooldown: Duration,

    pub window: Duration,
    pub max_per_window: u32,
}

impl KindConfig {
    pub fn max_len(&self, has_image: bool) -> usize {
        if has_image {
            self.max_caption_len
        } else {
            self.max_message_len
        }
    }
}

// Caps stay below the transport limits to leave room for the
// "continue reading" marker and the keyboard
const LIVE: KindConfig = KindConfig {
    emoji: "⚽",
    needs_image: false,
    max_message_len: 3800,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(2 * MINUTE),
    window: Duration::from_secs(HOUR),
    max_per_window: 30,
};

const BETTING: KindConfig = KindConfig {
    emoji: "🎯",
    needs_image: true,
    max_message_len: 3500,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(2 * HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 6,
};

const NEWS: KindConfig = KindConfig {
    emoji: "📰",
    needs_image: true,
    max_message_len: 3500,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 12,
};

const ANALYSIS: KindConfig = KindConfig {
    emoji: "📊",
    needs_image: true,
    max_message_len: MESSAGE_LIMIT,
    max_caption_len: 1000,
    truncate: false,
    cooldown: Duration::from_secs(3 * HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 4,
};

const POLLS: KindConfig = KindConfig {
    emoji: "📋",
    needs_image: false,
    max_message_len: 3000,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(4 * HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 3,
};

const COUPONS: KindConfig = KindConfig {
    emoji: "🎫",
    needs_image: true,
    max_message_len: 3000,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(6 * HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 3,
};

const MEMES: KindConfig = KindConfig {
    emoji: "😂",
    needs_image: true,
    max_message_len: 1000,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 8,
};

const DAILY_SUMMARY: KindConfig = KindConfig {
    emoji: "📅",
    needs_image: true,
    max_message_len: 3800,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(20 * HOUR),
    window: Duration::from_secs(DAY),
    max_per_window: 1,
};

const WEEKLY_SUMMARY: KindConfig = KindConfig {
    emoji: "🗓",
    needs_image: true,
    max_message_len: 3800,
    max_caption_len: 1000,
    truncate: true,
    cooldown: Duration::from_secs(6 * DAY),
    window: Duration::from_secs(7 * DAY),
    max_per_window: 1,
};

impl ContentKind {
    pub fn config(self) -> &'static KindConfig {
        match self {
            Self::Live => &LIVE,
            Self::Betting => &BETTING,
            Self::News => &NEWS,
            Self::Analysis => &ANALYSIS,
            Self::Polls => &POLLS,
            Self::Coupons => &COUPONS,
            Self::Memes => &MEMES,
            Self::DailySummary => &DAILY_SUMMARY,
            Self::WeeklySummary => &WEEKLY_SUMMARY,
        }
    }

    pub fn send_strategy(self) -> SendStrategy {
        match self {
            Self::Polls => SendStrategy::Poll,
            Self::Memes => SendStrategy::MediaGroup,
            Self::Live
            | Self::Betting
            | Self::News
            | Self::Analysis
            | Self::Coupons
            | Self::DailySummary
            | Self::WeeklySummary => SendStrategy::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
