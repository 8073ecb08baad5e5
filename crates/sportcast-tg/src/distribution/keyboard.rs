//! Inline buttons attached to the distributed content.
use super::labels::{localize_custom, Label};
use crate::content::{AffiliateCodes, Channel, ContentEnvelope, ContentKind, CustomButton, Language};
use crate::prelude::*;
use chrono::prelude::*;
use serde::Deserialize;
use url::Url;

/// Telegram limits the callback data to 64 bytes
const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Transport-neutral inline keyboard. It is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Url(Url),
    Callback(String),

    /// Opens the Telegram sharing dialog for the link
    Share(Url),
}

/// Global defaults of the button links loaded from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonsConfig {
    #[serde(default = "default_source_tag")]
    pub(crate) source_tag: String,
    pub(crate) bookmaker_url: Option<Url>,
    pub(crate) coupon_url: Option<Url>,
    pub(crate) analysis_url: Option<Url>,
    pub(crate) channel_url: Option<Url>,
}

fn default_source_tag() -> String {
    "sportcast".to_owned()
}

/// Effective link configuration for a single channel
#[derive(Debug, Clone, Default)]
pub struct ButtonLinkConfig {
    pub source_tag: String,

    /// Value of `utm_campaign`, identifies the channel
    pub campaign: Option<String>,

    pub bookmaker_url: Option<Url>,
    pub coupon_url: Option<Url>,
    pub analysis_url: Option<Url>,
    pub channel_url: Option<Url>,
    pub affiliate: AffiliateCodes,
    pub custom_buttons: Vec<CustomButton>,
}

impl From<ButtonsConfig> for ButtonLinkConfig {
    fn from(config: ButtonsConfig) -> Self {
        Self {
            source_tag: config.source_tag,
            campaign: None,
            bookmaker_url: config.bookmaker_url,
            coupon_url: config.coupon_url,
            analysis_url: config.analysis_url,
            channel_url: config.channel_url,
            affiliate: AffiliateCodes::default(),
            custom_buttons: vec![],
        }
    }
}

impl ButtonLinkConfig {
    /// Merges the branding of the channel on top of the global defaults
    pub fn with_overrides(&self, channel: &Channel) -> ButtonLinkConfig {
        let overrides = &channel.buttons;
        let pick = |own: &Option<Url>, global: &Option<Url>| own.clone().or_else(|| global.clone());

        let channel_url = pick(&overrides.channel_url, &self.channel_url).or_else(|| {
            let handle = channel.chat.strip_prefix('@')?;
            Url::parse(&format!("https://t.me/{handle}")).ok()
        });

        ButtonLinkConfig {
            source_tag: overrides
                .source_tag
                .clone()
                .unwrap_or_else(|| self.source_tag.clone()),
            campaign: Some(channel.tag()),
            bookmaker_url: pick(&overrides.bookmaker_url, &self.bookmaker_url),
            coupon_url: pick(&overrides.coupon_url, &self.coupon_url),
            analysis_url: pick(&overrides.analysis_url, &self.analysis_url),
            channel_url,
            affiliate: channel.affiliate.clone(),
            custom_buttons: overrides.custom_buttons.clone(),
        }
    }

    /// Appends the tracking parameters to a link taken from the configuration.
    /// The parameters that the link already has are left untouched.
    fn track(&self, url: &Url, affiliate: Option<&str>, now: DateTime<Utc>) -> Url {
        let timestamp = now.timestamp().to_string();

        let params = [
            ("utm_source", Some(self.source_tag.as_str())),
            ("utm_medium", Some("telegram")),
            ("utm_campaign", self.campaign.as_deref()),
            ("aff", affiliate.or(self.affiliate.default.as_deref())),
            ("ts", Some(timestamp.as_str())),
        ];

        let existing: Vec<String> = url.query_pairs().map(|(key, _)| key.into_owned()).collect();

        let mut url = url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                let Some(value) = value.and_then(|value| value.non_blank()) else {
                    continue;
                };
                if existing.iter().any(|existing| existing == key) {
                    continue;
                }
                query.append_pair(key, value);
            }
        }
        url
    }
}

/// Builds the keyboard for the content in the channel described by `config`.
/// Returns `None` if there is no button to show.
pub fn build_keyboard(
    envelope: &ContentEnvelope,
    language: Language,
    config: &ButtonLinkConfig,
    now: DateTime<Utc>,
) -> Option<Keyboard> {
    let url_button = |label: Label, url: Url| Button {
        label: label.localize(language).to_owned(),
        action: ButtonAction::Url(url),
    };

    // Links from the content itself are used as is, the configured ones are tracked
    let link = |metadata_key: &str, configured: &Option<Url>, affiliate: Option<&str>| {
        envelope
            .metadata_str(metadata_key)
            .and_then(|url| Url::parse(url).ok())
            .or_else(|| {
                configured
                    .as_ref()
                    .map(|url| config.track(url, affiliate, now))
            })
    };

    let share_button = || {
        let channel_url = config.channel_url.as_ref()?;
        let share = Url::parse_with_params("https://t.me/share/url", [("url", channel_url.as_str())]).ok()?;
        Some(Button {
            label: Label::Share.localize(language).to_owned(),
            action: ButtonAction::Share(share),
        })
    };

    let mut rows: Vec<Vec<Button>> = match envelope.kind {
        ContentKind::Betting => {
            let bookmaker = link(
                "bookmaker_url",
                &config.bookmaker_url,
                config.affiliate.bookmaker.as_deref(),
            );
            bookmaker
                .map(|url| vec![url_button(Label::PlaceBet, url)])
                .into_iter()
                .collect()
        }
        ContentKind::Coupons => {
            let coupon = link(
                "coupon_url",
                &config.coupon_url,
                config.affiliate.coupon.as_deref(),
            );
            let copy_code = envelope.metadata_str("coupon_code").map(|code| Button {
                label: Label::CopyCode.localize(language).to_owned(),
                action: ButtonAction::Callback(callback_data("copy_code", code)),
            });

            vec![
                coupon
                    .map(|url| url_button(Label::GetCoupon, url))
                    .into_iter()
                    .collect(),
                copy_code.into_iter().chain(share_button()).collect(),
            ]
        }
        ContentKind::Analysis => {
            let analysis = link("analysis_url", &config.analysis_url, None);
            analysis
                .map(|url| vec![url_button(Label::FullAnalysis, url)])
                .into_iter()
                .collect()
        }
        ContentKind::Polls => share_button().map(|button| vec![button]).into_iter().collect(),
        ContentKind::Live
        | ContentKind::News
        | ContentKind::Memes
        | ContentKind::DailySummary
        | ContentKind::WeeklySummary => vec![],
    };

    rows.extend(config.custom_buttons.iter().map(|button| {
        vec![Button {
            label: localize_custom(&button.label, language),
            action: ButtonAction::Url(config.track(&button.url, None, now)),
        }]
    }));

    // Telegram rejects empty rows
    rows.retain(|row| !row.is_empty());

    if rows.is_empty() {
        return None;
    }

    Some(Keyboard { rows })
}

fn callback_data(action: &str, payload: &str) -> String {
    let data = format!("{action}:{payload}");
    if data.len() <= MAX_CALLBACK_DATA_LEN {
        return data;
    }
    let mut end = MAX_CALLBACK_DATA_LEN;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    data[..end].to_owned()
}
