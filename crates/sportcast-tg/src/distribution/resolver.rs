//! Decides which channels receive the content and in which language.
use crate::content::{normalize_tag, Channel, ChannelId, Language};
use crate::prelude::*;
use async_trait::async_trait;
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;

/// Read access to the channels. Every method returns only active channels
/// owned by active bots.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn active_channels_by_ids(&self, ids: &[ChannelId]) -> Result<Vec<Channel>>;

    /// `language` is a normalized primary language subtag, see [`normalize_tag`]
    async fn active_channels_by_language(&self, language: &str) -> Result<Vec<Channel>>;

    async fn active_channels(&self) -> Result<Vec<Channel>>;

    async fn any_active_channel(&self) -> Result<Option<Channel>>;
}

/// The rule that produced the resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionStep {
    ExplicitChannels,
    ExplicitLanguage,
    FirstActiveChannel,
    AnyActiveChannel,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// Empty if there is no eligible channel, which is not an error
    pub channels: Vec<Channel>,
    pub language: Language,
    pub step: Option<ResolutionStep>,

    /// Audit trail of the decisions that deviated from the request
    pub notes: Vec<String>,
}

/// Intermediate result with the raw language tag, before it's validated
struct Found {
    step: ResolutionStep,
    channels: Vec<Channel>,
    language: String,
}

pub struct ChannelResolver {
    store: Arc<dyn ChannelStore>,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn ChannelStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        explicit_channel_ids: Option<&[ChannelId]>,
        explicit_language: Option<&str>,
    ) -> Result<Resolution> {
        let requested = explicit_language
            .map(normalize_tag)
            .filter(|language| !language.is_empty());

        let explicit_channel_ids = explicit_channel_ids.filter(|ids| !ids.is_empty());

        let mut notes = vec![];

        let found = self
            .find(explicit_channel_ids, requested.as_deref(), &mut notes)
            .await?;

        let Some(Found {
            step,
            channels,
            language,
        }) = found
        else {
            info!("No eligible channels found");
            return Ok(Resolution {
                channels: vec![],
                language: Language::DEFAULT,
                step: None,
                notes,
            });
        };

        let language = Language::parse(&language).unwrap_or_else(|| {
            warn!(
                %language,
                default = %Language::DEFAULT,
                "Unsupported language, coercing to the default one"
            );
            notes.push(format!(
                "language `{language}` is not supported, coerced to `{}`",
                Language::DEFAULT
            ));
            Language::DEFAULT
        });

        info!(
            %step,
            %language,
            channels = ?channels.iter().map(|channel| channel.id).collect::<Vec<_>>(),
            "Resolved the channels"
        );

        Ok(Resolution {
            channels,
            language,
            step: Some(step),
            notes,
        })
    }

    async fn find(
        &self,
        explicit_channel_ids: Option<&[ChannelId]>,
        requested: Option<&str>,
        notes: &mut Vec<String>,
    ) -> Result<Option<Found>> {
        if let Some(ids) = explicit_channel_ids {
            let channels = eligible(self.store.active_channels_by_ids(ids).await?);

            if let Some(found) = from_explicit_channels(channels, requested, notes) {
                return Ok(Some(found));
            }

            warn!(?ids, "None of the requested channels is eligible");
            notes.push("none of the requested channels is eligible".to_owned());
        }

        let primary = match requested {
            Some(language) => {
                let channels = self.store.active_channels_by_language(language).await?;
                eligible(channels).into_iter().next().map(|channel| Found {
                    step: ResolutionStep::ExplicitLanguage,
                    channels: vec![channel],
                    language: language.to_owned(),
                })
            }
            None => {
                let channels = self.store.active_channels().await?;
                eligible(channels).into_iter().next().map(|channel| Found {
                    step: ResolutionStep::FirstActiveChannel,
                    language: channel.language.clone(),
                    channels: vec![channel],
                })
            }
        };

        if primary.is_some() {
            return Ok(primary);
        }

        let Some(channel) = self
            .store
            .any_active_channel()
            .await?
            .filter(Channel::is_eligible)
        else {
            return Ok(None);
        };

        let language = normalize_tag(&channel.language);

        if let Some(requested) = requested.filter(|&requested| requested != language) {
            warn!(
                %requested,
                channel_language = %language,
                channel = %channel.id,
                "Falling back to a channel in a different language"
            );
            notes.push(format!(
                "no channel for `{requested}`, fell back to channel {} in `{language}`",
                channel.id
            ));
        }

        Ok(Some(Found {
            step: ResolutionStep::AnyActiveChannel,
            channels: vec![channel],
            language,
        }))
    }
}

fn from_explicit_channels(
    channels: Vec<Channel>,
    requested: Option<&str>,
    notes: &mut Vec<String>,
) -> Option<Found> {
    let languages: Vec<_> = channels
        .iter()
        .map(|channel| normalize_tag(&channel.language))
        .unique()
        .collect();

    let first = languages.first()?.clone();

    let language = match requested {
        None => first,
        Some(requested) => {
            if languages.iter().any(|language| language.as_str() != requested) {
                warn!(
                    %requested,
                    ?languages,
                    "Requested language differs from the languages of the requested channels"
                );
                notes.push(format!(
                    "requested language `{requested}` kept although the channels use {}",
                    languages.iter().map(|language| format!("`{language}`")).join(", ")
                ));
            }
            requested.to_owned()
        }
    };

    Some(Found {
        step: ResolutionStep::ExplicitChannels,
        channels,
        language,
    })
}

/// Only the eligible channels in a stable order: creation time, then id
fn eligible(mut channels: Vec<Channel>) -> Vec<Channel> {
    channels.retain(Channel::is_eligible);
    channels.sort_by_key(|channel| (channel.created_at, channel.id));
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::testing::{channel, InMemoryChannelStore};
    use assert_matches::assert_matches;

    fn resolver(channels: Vec<Channel>) -> ChannelResolver {
        ChannelResolver::new(Arc::new(InMemoryChannelStore::new(channels)))
    }

    fn ids(resolution: &Resolution) -> Vec<i64> {
        resolution.channels.iter().map(|channel| channel.id.0).collect()
    }

    #[test_log::test(tokio::test)]
    async fn explicit_channels_with_the_same_language() {
        let resolver = resolver(vec![channel(1, "es"), channel(2, "es"), channel(3, "en")]);

        let resolution = resolver
            .resolve(Some(&[ChannelId(2), ChannelId(1)]), Some("es"))
            .await
            .unwrap();

        assert_eq!(ids(&resolution), [1, 2]);
        assert_eq!(resolution.language, Language::Es);
        assert_eq!(resolution.step, Some(ResolutionStep::ExplicitChannels));
        assert!(resolution.notes.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn explicit_language_is_kept_on_mismatch() {
        let resolver = resolver(vec![channel(1, "en")]);

        let resolution = resolver
            .resolve(Some(&[ChannelId(1)]), Some("FR"))
            .await
            .unwrap();

        assert_eq!(ids(&resolution), [1]);
        assert_eq!(resolution.language, Language::Fr);

        expect_test::expect![[r#"
            [
                "requested language `fr` kept although the channels use `en`",
            ]
        "#]]
        .assert_debug_eq(&resolution.notes);
    }

    #[test_log::test(tokio::test)]
    async fn explicit_channels_adopt_the_first_language() {
        let resolver = resolver(vec![channel(1, "pt-BR"), channel(2, "sw")]);

        let resolution = resolver
            .resolve(Some(&[ChannelId(1), ChannelId(2)]), None)
            .await
            .unwrap();

        assert_eq!(ids(&resolution), [1, 2]);
        assert_eq!(resolution.language, Language::Pt);
    }

    #[test_log::test(tokio::test)]
    async fn inactive_explicit_channels_fall_through_to_the_language() {
        let mut inactive = channel(1, "fr");
        inactive.bot.is_active = false;

        let resolver = resolver(vec![inactive, channel(2, "fr")]);

        let resolution = resolver
            .resolve(Some(&[ChannelId(1)]), Some("fr"))
            .await
            .unwrap();

        assert_eq!(ids(&resolution), [2]);
        assert_eq!(resolution.step, Some(ResolutionStep::ExplicitLanguage));
        assert_eq!(resolution.notes.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn explicit_language_takes_the_primary_channel() {
        let resolver = resolver(vec![channel(5, "am"), channel(3, "am"), channel(1, "en")]);

        let resolution = resolver.resolve(None, Some("am")).await.unwrap();

        assert_eq!(ids(&resolution), [3]);
        assert_eq!(resolution.language, Language::Am);
    }

    #[test_log::test(tokio::test)]
    async fn nothing_requested_takes_the_oldest_channel() {
        let resolver = resolver(vec![channel(4, "sw"), channel(2, "es")]);

        let resolution = resolver.resolve(None, None).await.unwrap();

        assert_eq!(ids(&resolution), [2]);
        assert_eq!(resolution.language, Language::Es);
        assert_eq!(resolution.step, Some(ResolutionStep::FirstActiveChannel));
    }

    #[test_log::test(tokio::test)]
    async fn unknown_language_falls_back_to_any_channel() {
        let resolver = resolver(vec![channel(1, "es")]);

        let resolution = resolver.resolve(None, Some("fr")).await.unwrap();

        assert_eq!(ids(&resolution), [1]);
        assert_eq!(resolution.language, Language::Es);
        assert_eq!(resolution.step, Some(ResolutionStep::AnyActiveChannel));

        expect_test::expect![[r#"
            [
                "no channel for `fr`, fell back to channel 1 in `es`",
            ]
        "#]]
        .assert_debug_eq(&resolution.notes);
    }

    #[test_log::test(tokio::test)]
    async fn no_channels_is_not_an_error() {
        let resolution = resolver(vec![]).resolve(None, Some("fr")).await.unwrap();

        assert!(resolution.channels.is_empty());
        assert_eq!(resolution.language, Language::En);
        assert_eq!(resolution.step, None);
    }

    #[test_log::test(tokio::test)]
    async fn unsupported_language_is_coerced() {
        let resolver = resolver(vec![channel(1, "de")]);

        let resolution = resolver.resolve(None, None).await.unwrap();

        assert_eq!(ids(&resolution), [1]);
        assert_eq!(resolution.language, Language::En);
        assert_eq!(resolution.notes.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn store_failure_is_an_error() {
        let store = InMemoryChannelStore::new(vec![channel(1, "en")]).unavailable();
        let resolver = ChannelResolver::new(Arc::new(store));

        let err = resolver.resolve(None, Some("en")).await.unwrap_err();

        assert_matches!(err.kind(), ErrorKind::Db { .. });
    }
}
