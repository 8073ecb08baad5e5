//! Finds the image that accompanies the content.
use crate::content::{ContentEnvelope, ContentKind, ImageRef, Language};
use crate::distribution::format::strip_tags;
use crate::observability::metrics::IMAGE_RESOLUTIONS_TOTAL;
use crate::prelude::*;
use async_trait::async_trait;
use itertools::Itertools;
use lazy_regex::regex_captures;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Input of the image generation
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    /// Plain text of the content without markup
    pub text: String,
    pub title: Option<String>,
    pub kind: ContentKind,
    pub language: Language,
    pub teams: Vec<String>,
    pub competition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Identifier used to clean up the image
    pub id: String,
    pub image: ImageRef,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns `None` if the generator decided there is nothing to draw
    async fn generate(&self, request: &ImageRequest) -> Result<Option<GeneratedImage>>;

    async fn cleanup(&self, image: &GeneratedImage) -> Result;
}

/// Where the image came from. Only the freshly generated images are owned
/// by the distribution and cleaned up after it.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ImageOrigin {
    Envelope,
    ItemMetadata,
    Cached,
    Generated(GeneratedImage),
    Fallback,
}

impl ImageOrigin {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub image: ImageRef,
    pub origin: ImageOrigin,
}

pub struct ImageResolver {
    generator: Option<Arc<dyn ImageGenerator>>,

    /// Directory-like URL with one `{kind}.jpg` per content kind
    fallback_base_url: Option<Url>,
}

impl ImageResolver {
    pub fn new(generator: Option<Arc<dyn ImageGenerator>>, fallback_base_url: Option<Url>) -> Self {
        let fallback_base_url = fallback_base_url.map(|mut url| {
            if !url.path().ends_with('/') {
                url.set_path(&format!("{}/", url.path()));
            }
            url
        });

        Self {
            generator,
            fallback_base_url,
        }
    }

    #[instrument(skip_all, fields(envelope_id = %envelope.id, kind = %envelope.kind))]
    pub async fn resolve(
        &self,
        envelope: &ContentEnvelope,
        language: Language,
        include_images: bool,
    ) -> Option<ResolvedImage> {
        if !include_images || !envelope.kind.config().needs_image {
            return None;
        }

        let resolved = self.find(envelope, language).await;

        if let Some(resolved) = &resolved {
            let origin = resolved.origin.as_str();
            debug!(%origin, image = ?resolved.image, "Resolved the image");
            metrics::increment_counter!(IMAGE_RESOLUTIONS_TOTAL, "origin" => origin);
        } else {
            warn!("No image is available, sending the content without it");
        }

        resolved
    }

    async fn find(&self, envelope: &ContentEnvelope, language: Language) -> Option<ResolvedImage> {
        let resolved = |image, origin| Some(ResolvedImage { image, origin });

        if let Some(image) = &envelope.image {
            return resolved(image.clone(), ImageOrigin::Envelope);
        }

        if let Some(image) = item_image(envelope) {
            return resolved(image, ImageOrigin::ItemMetadata);
        }

        if let Some(image) = &envelope.generated_image {
            return resolved(image.clone(), ImageOrigin::Cached);
        }

        if let Some(generated) = self.generate(envelope, language).await {
            return resolved(generated.image.clone(), ImageOrigin::Generated(generated));
        }

        self.fallback(envelope.kind)
            .and_then(|url| resolved(ImageRef::Url(url), ImageOrigin::Fallback))
    }

    async fn generate(&self, envelope: &ContentEnvelope, language: Language) -> Option<GeneratedImage> {
        let generator = self.generator.as_ref()?;

        let request = image_request(envelope, language);

        match generator.generate(&request).await {
            Ok(Some(generated)) => Some(generated),
            Ok(None) => {
                info!("Image generator returned no image");
                None
            }
            Err(err) => {
                warn!(err = tracing_err(&err), "Image generation failed, using the fallback");
                None
            }
        }
    }

    fn fallback(&self, kind: ContentKind) -> Option<Url> {
        let base = self.fallback_base_url.as_ref()?;
        base.join(&format!("{kind}.jpg"))
            .map_err(|err| warn!(%base, err = tracing_err(&err), "Invalid fallback image URL"))
            .ok()
    }

    /// Deletes the image if it was generated for this distribution
    pub async fn cleanup(&self, resolved: &ResolvedImage) {
        let (ImageOrigin::Generated(generated), Some(generator)) = (&resolved.origin, &self.generator)
        else {
            return;
        };

        if let Err(err) = generator.cleanup(generated).await {
            warn!(
                image_id = %generated.id,
                err = tracing_err(&err),
                "Failed to clean up the generated image"
            );
        }
    }
}

fn item_image(envelope: &ContentEnvelope) -> Option<ImageRef> {
    envelope.items.iter().find_map(|item| {
        let from_metadata = item.metadata_str("image_url").and_then(|url| {
            Url::parse(url)
                .map_err(|err| warn!(%url, err = tracing_err(&err), "Invalid image URL in metadata"))
                .ok()
        });

        from_metadata
            .map(ImageRef::Url)
            .or_else(|| item.media.first().cloned())
    })
}

fn image_request(envelope: &ContentEnvelope, language: Language) -> ImageRequest {
    let text = envelope
        .items
        .iter()
        .map(|item| strip_tags(&item.body))
        .join("\n\n");

    let title = envelope
        .items
        .iter()
        .find_map(|item| item.title.as_deref()?.non_blank())
        .map(ToOwned::to_owned);

    let headline = title.as_deref().unwrap_or(&text);

    let competition = envelope
        .metadata_str("competition")
        .map(ToOwned::to_owned)
        .or_else(|| competition(&text));

    ImageRequest {
        teams: teams(headline).or_else(|| teams(&text)).unwrap_or_default(),
        competition,
        title,
        text,
        kind: envelope.kind,
        language,
    }
}

/// Finds the first `Home vs Away` pair of capitalized team names
fn teams(text: &str) -> Option<Vec<String>> {
    let (_, home, away) = regex_captures!(
        r"(\p{Lu}[\p{L}\d.']*(?: \p{Lu}[\p{L}\d.']*)*)\s+(?:vs?\.?|–|-)\s+(\p{Lu}[\p{L}\d.']*(?: \p{Lu}[\p{L}\d.']*)*)",
        text
    )?;
    Some(vec![home.to_owned(), away.to_owned()])
}

fn competition(text: &str) -> Option<String> {
    let (competition, ..) = regex_captures!(
        r"(?i)\b(premier league|la liga|serie a|bundesliga|ligue 1|champions league|europa league|conference league|world cup|africa cup of nations|fa cup|copa del rey|copa libertadores|euro \d{4})\b",
        text
    )?;
    Some(competition.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::testing::{envelope, FakeImageGenerator};
    use assert_matches::assert_matches;

    fn url(url: &str) -> ImageRef {
        ImageRef::Url(Url::parse(url).unwrap())
    }

    fn resolver(generator: Option<Arc<FakeImageGenerator>>) -> ImageResolver {
        ImageResolver::new(
            generator.map(|generator| generator as Arc<dyn ImageGenerator>),
            Some(Url::parse("https://cdn.example.com/fallback").unwrap()),
        )
    }

    #[test_log::test(tokio::test)]
    async fn envelope_image_wins() {
        let generator = Arc::new(FakeImageGenerator::returning("gen-1"));
        let mut envelope = envelope(ContentKind::News, "Arsenal vs Chelsea");
        envelope.image = Some(url("https://img.example.com/explicit.jpg"));
        envelope.items[0]
            .metadata
            .insert("image_url".to_owned(), "https://img.example.com/meta.jpg".into());

        let resolved = resolver(Some(generator.clone()))
            .resolve(&envelope, Language::En, true)
            .await
            .unwrap();

        assert_eq!(resolved.origin, ImageOrigin::Envelope);
        assert_eq!(resolved.image, url("https://img.example.com/explicit.jpg"));
        assert!(generator.requests().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn metadata_then_media_then_cached() {
        let resolver = resolver(None);
        let mut envelope = envelope(ContentKind::Betting, "Tips");

        envelope.generated_image = Some(url("https://img.example.com/cached.jpg"));
        let resolved = resolver.resolve(&envelope, Language::En, true).await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::Cached);

        envelope.items[0].media = vec![ImageRef::TgFileId("file-1".to_owned())];
        let resolved = resolver.resolve(&envelope, Language::En, true).await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::ItemMetadata);
        assert_eq!(resolved.image, ImageRef::TgFileId("file-1".to_owned()));

        envelope.items[0]
            .metadata
            .insert("image_url".to_owned(), "https://img.example.com/meta.jpg".into());
        let resolved = resolver.resolve(&envelope, Language::En, true).await.unwrap();
        assert_eq!(resolved.image, url("https://img.example.com/meta.jpg"));
    }

    #[test_log::test(tokio::test)]
    async fn generated_image_receives_teams_and_competition() {
        let generator = Arc::new(FakeImageGenerator::returning("gen-1"));
        let resolver = resolver(Some(generator.clone()));

        let mut envelope = envelope(
            ContentKind::Analysis,
            "<p>Premier League clash tonight: <b>Manchester United</b> vs Real Madrid</p>",
        );
        envelope.items[0].title = Some("Big night".to_owned());

        let resolved = resolver.resolve(&envelope, Language::Es, true).await.unwrap();

        assert_matches!(&resolved.origin, ImageOrigin::Generated(generated) if generated.id == "gen-1");

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].teams, ["Manchester United", "Real Madrid"]);
        assert_eq!(requests[0].competition.as_deref(), Some("Premier League"));
        assert_eq!(requests[0].title.as_deref(), Some("Big night"));
        assert_eq!(requests[0].language, Language::Es);

        resolver.cleanup(&resolved).await;
        assert_eq!(generator.cleaned_up(), ["gen-1"]);
    }

    #[test_log::test(tokio::test)]
    async fn generation_failure_uses_the_fallback() {
        let generator = Arc::new(FakeImageGenerator::failing());
        let resolver = resolver(Some(generator.clone()));

        let resolved = resolver
            .resolve(&envelope(ContentKind::DailySummary, "Summary"), Language::En, true)
            .await
            .unwrap();

        assert_eq!(resolved.origin, ImageOrigin::Fallback);
        assert_eq!(
            resolved.image,
            url("https://cdn.example.com/fallback/daily_summary.jpg")
        );

        // Fallback images are shared and must never be deleted
        resolver.cleanup(&resolved).await;
        assert!(generator.cleaned_up().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn no_image_when_not_needed_or_disabled() {
        let resolver = resolver(None);

        let live = envelope(ContentKind::Live, "Goal!");
        assert_eq!(resolver.resolve(&live, Language::En, true).await, None);

        let news = envelope(ContentKind::News, "News");
        assert_eq!(resolver.resolve(&news, Language::En, false).await, None);
    }

    #[test]
    fn team_extraction() {
        assert_eq!(teams("Preview: Arsenal v. Chelsea at 20:00"), Some(vec!["Arsenal".to_owned(), "Chelsea".to_owned()]));
        assert_eq!(teams("Nothing to see here"), None);
        assert_eq!(competition("tonight in the champions league"), Some("champions league".to_owned()));
    }
}
