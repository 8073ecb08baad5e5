//! The pipeline that takes a generated content envelope and delivers it
//! to the Telegram channels.
pub(crate) mod detect;
pub(crate) mod dispatcher;
pub(crate) mod format;
pub(crate) mod image;
pub(crate) mod keyboard;
pub(crate) mod labels;
pub(crate) mod resolver;
pub(crate) mod service;
pub(crate) mod spam_gate;

#[cfg(test)]
pub(crate) mod testing;

use serde::Deserialize;
use std::time::Duration;

pub use dispatcher::{
    AdmittedChannel, DispatchSummary, Dispatcher, MessageId, Payload, SendOutcome, SendStatus,
    Transport, TransportError,
};
pub use image::{
    GeneratedImage, ImageGenerator, ImageOrigin, ImageRequest, ImageResolver, ResolvedImage,
};
pub use keyboard::{Button, ButtonAction, ButtonLinkConfig, ButtonsConfig, Keyboard};
pub use resolver::{ChannelResolver, ChannelStore, Resolution, ResolutionStep};
pub use service::{
    BlockedChannel, Collaborators, DistributionReport, DistributionRequest, DistributionService,
    DistributionStatus, QualityIssue, QualityLogEntry, UsageSink,
};
pub use spam_gate::{GateDecision, RateKey, RateLock, RateRecord, RateStore, SendPermit, SpamGate, Trigger};

/// A failed request is retried at most once, so a single send is never
/// requested more than twice
const MAX_SEND_RETRIES: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_parallel_sends")]
    max_parallel_sends: usize,

    #[serde(default = "default_send_timeout_secs")]
    send_timeout_secs: u64,

    #[serde(default = "default_send_retries")]
    send_retries: u32,

    /// Base URL of the static images used when no other image is available.
    /// The image of the kind is expected at `{base}/{kind}.jpg`.
    #[serde(default)]
    pub(crate) fallback_image_base_url: Option<url::Url>,
}

fn default_max_parallel_sends() -> usize {
    8
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_send_retries() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel_sends: default_max_parallel_sends(),
            send_timeout_secs: default_send_timeout_secs(),
            send_retries: default_send_retries(),
            fallback_image_base_url: None,
        }
    }
}

impl Config {
    pub(crate) fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub(crate) fn send_retries(&self) -> u32 {
        self.send_retries.min(MAX_SEND_RETRIES)
    }

    pub(crate) fn max_parallel_sends(&self) -> usize {
        self.max_parallel_sends.max(1)
    }
}
