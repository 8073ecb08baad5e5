//! Client of the external image generation service.
use crate::content::ImageRef;
use crate::distribution::{GeneratedImage, ImageGenerator, ImageRequest};
use crate::http;
use crate::prelude::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    /// Image generation is disabled when not set
    #[serde(default)]
    pub(crate) url: Option<Url>,

    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    image_url: Option<Url>,
    image_id: Option<String>,
}

pub(crate) struct HttpImageGenerator {
    http: http::Client,
    base_url: Url,
}

impl HttpImageGenerator {
    /// Returns `None` if there is no generation service configured
    pub(crate) fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(base_url) = &config.url else {
            return Ok(None);
        };

        let http = http::create_client(Duration::from_secs(config.timeout_secs))?;

        Ok(Some(Self::new(http, base_url.clone())))
    }

    pub(crate) fn new(http: http::Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .fatal_ctx(|| format!("Invalid image generation endpoint `{path}`"))
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<Option<GeneratedImage>> {
        let response: GenerateResponse = self
            .http
            .post(self.endpoint("generate")?)
            .send_and_read_json(request)
            .await?;

        let Some(image_url) = response.image_url else {
            debug!("The generator returned no image");
            return Ok(None);
        };

        // Without an id the image can't be cleaned up, so the url is the best key we have
        let id = response.image_id.unwrap_or_else(|| image_url.to_string());

        Ok(Some(GeneratedImage {
            id,
            image: ImageRef::Url(image_url),
        }))
    }

    async fn cleanup(&self, image: &GeneratedImage) -> Result {
        let mut url = self.endpoint("images/")?;
        url.path_segments_mut()
            .map_err(|()| fatal!("Image generation URL can't be a base: {}", self.base_url))?
            .pop_if_empty()
            .push(&image.id);

        self.http.delete(url).try_send().await?;

        Ok(())
    }
}
