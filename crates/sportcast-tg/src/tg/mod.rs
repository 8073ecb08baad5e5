//! Telegram implementation of the transport.
mod transport;

use serde::Deserialize;
use teloxide::adaptors::{DefaultParseMode, Throttle, Trace};

pub(crate) use transport::*;

pub(crate) type Bot = Trace<DefaultParseMode<Throttle<teloxide::Bot>>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Config {
    /// Overrides the Bot API server, e.g. a self-hosted one
    #[serde(default)]
    pub(crate) api_url: Option<url::Url>,
}
