//! Data model of the channels and the generated content they receive.
mod kind;
mod language;

use crate::prelude::*;
use chrono::prelude::*;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use kind::*;
pub use language::*;

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
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

sqlx_bat::impl_try_into_db_via_newtype!(ChannelId(i64));

/// Destination of the content. This type is read-only for the pipeline.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,

    /// Opaque chat handle understood by the transport (`@name` or `-100123`)
    pub chat: String,

    /// Raw language code as it is stored. It may be outside of the
    /// supported set, see [`Channel::language`].
    pub language: String,
    pub is_active: bool,
    pub bot: BotCredential,
    pub buttons: ChannelButtonOverrides,
    pub affiliate: AffiliateCodes,
    pub posting: PostingSettings,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn language(&self) -> Option<Language> {
        Language::parse(&self.language)
    }

    /// Both the channel and the bot that owns it must be active
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.bot.is_active
    }

    /// Tag used as `utm_campaign` for the links in this channel
    pub fn tag(&self) -> String {
        let handle = self.chat.trim_start_matches('@');
        if handle.is_empty() || handle.starts_with('-') {
            return format!("channel_{}", self.id);
        }
        handle.to_owned()
    }
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct BotCredential {
    pub id: i64,

    #[derivative(Debug = "ignore")]
    pub token: String,

    pub is_active: bool,
}

/// Per-channel branding that overrides the global button configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelButtonOverrides {
    pub source_tag: Option<String>,
    pub bookmaker_url: Option<url::Url>,
    pub coupon_url: Option<url::Url>,
    pub analysis_url: Option<url::Url>,
    pub channel_url: Option<url::Url>,

    /// Extra rows appended after the buttons of the content kind
    pub custom_buttons: Vec<CustomButton>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomButton {
    /// Either a literal text or a key of the label table
    pub label: String,
    pub url: url::Url,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AffiliateCodes {
    pub bookmaker: Option<String>,
    pub coupon: Option<String>,

    /// Used for the links that have no specific code
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingSettings {
    /// Overrides the cooldown of every content kind in this channel
    pub min_interval_minutes: Option<u32>,

    /// Overrides the rolling window limit of every content kind in this channel
    pub max_posts_per_window: Option<u32>,
}

/// Reference to an image that the transport can send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    Url(url::Url),
    File(PathBuf),

    /// Image that was already uploaded to Telegram
    TgFileId(String),
}

/// Unit of generated content to be distributed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEnvelope {
    #[serde(default = "new_envelope_id")]
    pub id: String,

    pub kind: ContentKind,

    /// Language the content was generated in, as reported by the generator
    #[serde(default)]
    pub language: Option<String>,

    pub items: Vec<ContentItem>,

    /// Image explicitly attached by the producer of the content
    #[serde(default)]
    pub image: Option<ImageRef>,

    /// Image generated for this content during a previous distribution
    #[serde(default)]
    pub generated_image: Option<ImageRef>,

    #[serde(default)]
    pub poll: Option<PollSpec>,
}

fn new_envelope_id() -> String {
    nanoid::nanoid!(10)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentItem {
    pub title: Option<String>,
    pub body: String,
    pub media: Vec<ImageRef>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ContentItem {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)?.as_str()?.non_blank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    pub question: String,
    pub options: Vec<String>,

    #[serde(default = "default_true")]
    pub is_anonymous: bool,

    #[serde(default)]
    pub allows_multiple_answers: bool,
}

fn default_true() -> bool {
    true
}

impl ContentEnvelope {
    /// Parses the envelope from JSON. An unknown content kind is reported
    /// separately from the other shape errors, because it means the producer
    /// and this pipeline disagree on the set of content kinds.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(err_ctx!(ErrorKind::InvalidEnvelope))?;

        if let Some(kind) = value.get("kind").and_then(serde_json::Value::as_str) {
            if ContentKind::from_str(kind).is_err() {
                return Err(err!(ErrorKind::InvalidContentKind {
                    kind: kind.to_owned()
                }));
            }
        }

        serde_json::from_value(value).map_err(err_ctx!(ErrorKind::InvalidEnvelope))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = fs_err::tokio::read_to_string(path)
            .await
            .map_err(err_ctx!(ErrorKind::ReadFile {
                path: path.display().to_string()
            }))?;

        Self::from_json(&json)
    }

    /// Value of the metadata `key` from the first item that has it
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.items.iter().find_map(|item| item.metadata_str(key))
    }

    /// Whether the poll spec is usable for a native poll
    pub fn valid_poll(&self) -> Option<&PollSpec> {
        self.poll.as_ref().filter(|poll| {
            poll.question.non_blank().is_some()
                && poll
                    .options
                    .iter()
                    .filter(|option| option.non_blank().is_some())
                    .count()
                    >= 2
        })
    }
}
