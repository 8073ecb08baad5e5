//! Concurrent delivery of the formatted content to the admitted channels.
use crate::content::{Channel, ChannelId, ContentEnvelope, ContentKind, ImageRef, Language, PollSpec};
use crate::content::{CAPTION_LIMIT, MESSAGE_LIMIT};
use crate::distribution::format::{format, split_message};
use crate::distribution::keyboard::Keyboard;
use crate::distribution::spam_gate::SendPermit;
use crate::distribution::Config;
use crate::observability::metrics::{SENDS_TOTAL, SEND_DURATION_SECONDS};
use crate::prelude::*;
use crate::util::retry::{retry_transient, RetryConfig, Retryability};
use async_trait::async_trait;
use futures::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Identifier of the message assigned by the messaging provider
pub type MessageId = i32;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Transient transport failure: {message}")]
    Transient {
        message: String,

        /// Delay requested by the provider before the next attempt
        retry_after: Option<Duration>,
    },

    #[error("Transport didn't respond in {}s", .after.as_secs_f32())]
    Timeout { after: Duration },

    #[error("Transport failure: {message}")]
    Permanent { message: String },
}

impl TransportError {
    fn retryability(&self) -> Retryability {
        match self {
            Self::Transient { retry_after, .. } => Retryability::Transient {
                retry_after: *retry_after,
            },
            // The provider may have accepted the request before the timeout,
            // so a retry could post a duplicate
            Self::Timeout { .. } | Self::Permanent { .. } => Retryability::Permanent,
        }
    }
}

/// Messaging provider. The text is in the HTML parse mode.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        channel: &Channel,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError>;

    async fn send_photo(
        &self,
        channel: &Channel,
        image: &ImageRef,
        caption: Option<&str>,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError>;

    /// The caption is attached to the first image. Returns the id of the
    /// first message of the group.
    async fn send_media_group(
        &self,
        channel: &Channel,
        images: &[ImageRef],
        caption: &str,
    ) -> Result<MessageId, TransportError>;

    async fn send_poll(&self, channel: &Channel, poll: &PollSpec) -> Result<MessageId, TransportError>;
}

/// Content prepared once per distribution and shared by all channels
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: ContentKind,

    /// Formatted text in the HTML parse mode
    pub text: String,
    pub image: Option<ImageRef>,

    /// Images of the items, sent as an album for the kinds that support it
    pub media: Vec<ImageRef>,
    pub poll: Option<PollSpec>,
}

impl Payload {
    pub fn new(envelope: &ContentEnvelope, language: Language, image: Option<&ImageRef>) -> Self {
        let mut media: Vec<ImageRef> = vec![];
        for image in envelope.items.iter().flat_map(|item| &item.media) {
            if !media.contains(image) {
                media.push(image.clone());
            }
        }

        let has_image = image.is_some() || media.len() > 1;

        Self {
            kind: envelope.kind,
            text: format(envelope, language, has_image),
            image: image.cloned(),
            media,
            poll: envelope.valid_poll().cloned(),
        }
    }

    fn strategy(&self) -> Strategy<'_> {
        use crate::content::SendStrategy;

        match self.kind.send_strategy() {
            SendStrategy::Poll => match &self.poll {
                Some(poll) => Strategy::Poll(poll),
                None => {
                    warn!("Poll has less than two options, sending it as a text");
                    Strategy::Generic
                }
            },
            SendStrategy::MediaGroup if self.media.len() > 1 => Strategy::MediaGroup(&self.media),
            SendStrategy::MediaGroup | SendStrategy::Generic => Strategy::Generic,
        }
    }
}

enum Strategy<'a> {
    Poll(&'a PollSpec),
    MediaGroup(&'a [ImageRef]),
    Generic,
}

/// Channel that passed the spam gate
pub struct AdmittedChannel {
    pub channel: Channel,
    pub permit: SendPermit,
    pub keyboard: Option<Keyboard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub channel_id: ChannelId,
    pub channel_name: String,

    #[serde(flatten)]
    pub status: SendStatus,

    /// Number of transport requests made, including the retries
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendStatus {
    Sent { message_id: MessageId },
    Failed { error: String },
}

#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub success_count: usize,

    /// Sorted by channel id
    pub outcomes: Vec<SendOutcome>,

    /// Channels that weren't started before the deadline
    pub skipped: Vec<ChannelId>,
}

#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum ChannelState {
    Sending,
    Sent,
    Failed,
}

enum ChannelRun {
    Skipped(ChannelId),
    Attempted {
        outcome: SendOutcome,
        permit: SendPermit,
    },
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    max_parallel_sends: usize,

    /// Applies to every single transport request
    send_timeout: Duration,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            max_parallel_sends: config.max_parallel_sends(),
            send_timeout: config.send_timeout(),
            retry: RetryConfig {
                max_retries: config.send_retries(),
                max_delay: config.send_timeout(),
            },
        }
    }

    /// Sends the payload to every channel. Failures are isolated per channel
    /// and reported in the outcomes. After all channels are attempted the
    /// successful sends are recorded through their permits.
    pub async fn distribute(
        &self,
        channels: Vec<AdmittedChannel>,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> DispatchSummary {
        let runs: Vec<_> = stream::iter(channels)
            .map(|admitted| self.run_channel(admitted, payload, deadline))
            .buffer_unordered(self.max_parallel_sends)
            .collect()
            .await;

        let mut summary = DispatchSummary::default();

        for run in runs {
            let (outcome, permit) = match run {
                ChannelRun::Skipped(channel) => {
                    summary.skipped.push(channel);
                    continue;
                }
                ChannelRun::Attempted { outcome, permit } => (outcome, permit),
            };

            // Dropping the permit of a failed send releases it without recording
            if let SendStatus::Sent { message_id } = outcome.status {
                summary.success_count += 1;
                if let Err(err) = permit.record_sent(message_id).await {
                    error!(
                        channel = %outcome.channel_id,
                        err = tracing_err(&err),
                        "Failed to record the sent message, the spam gate won't see it"
                    );
                }
            }

            summary.outcomes.push(outcome);
        }

        summary.outcomes.sort_by_key(|outcome| outcome.channel_id);
        summary.skipped.sort();

        summary
    }

    async fn run_channel(
        &self,
        admitted: AdmittedChannel,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> ChannelRun {
        let AdmittedChannel {
            channel,
            permit,
            keyboard,
        } = admitted;

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!(channel = %channel.id, "Deadline reached before the send started");
            return ChannelRun::Skipped(channel.id);
        }

        let span = info_span!(
            "send",
            channel = %channel.id,
            kind = %payload.kind,
            state = tracing::field::Empty,
        );

        let mut send = ChannelSend {
            dispatcher: self,
            channel: &channel,
            attempts: 0,
        };

        let (result, duration) = AssertUnwindSafe(async {
            debug!(state = %ChannelState::Sending, "Sending to the channel");
            send.send(payload, keyboard.as_ref()).await
        })
        .catch_unwind()
        .instrument(span.clone())
        .with_duration()
        .await;

        let attempts = send.attempts;
        let kind = payload.kind.as_str();

        metrics::histogram!(SEND_DURATION_SECONDS, duration, "kind" => kind);

        let (status, result_label) = match result {
            Ok(Ok(message_id)) => (SendStatus::Sent { message_id }, "ok"),
            Ok(Err(err)) => {
                let label = match err {
                    TransportError::Timeout { .. } => "timeout",
                    TransportError::Transient { .. } | TransportError::Permanent { .. } => "err",
                };
                span.in_scope(|| warn!(err = tracing_err(&err), %attempts, "Send failed"));
                (SendStatus::Failed { error: err.to_string() }, label)
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                span.in_scope(|| error!(%message, "Send panicked"));
                (
                    SendStatus::Failed {
                        error: format!("send panicked: {message}"),
                    },
                    "panic",
                )
            }
        };

        metrics::increment_counter!(SENDS_TOTAL, "kind" => kind, "result" => result_label);

        let state = match status {
            SendStatus::Sent { .. } => ChannelState::Sent,
            SendStatus::Failed { .. } => ChannelState::Failed,
        };
        span.record("state", tracing::field::display(state));
        span.in_scope(|| {
            info!(
                duration = tracing_duration(duration),
                %attempts,
                "Channel send finished"
            )
        });

        ChannelRun::Attempted {
            outcome: SendOutcome {
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                status,
                attempts,
            },
            permit,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}

/// Send of the payload to a single channel
struct ChannelSend<'a> {
    dispatcher: &'a Dispatcher,
    channel: &'a Channel,
    attempts: u32,
}

impl ChannelSend<'_> {
    async fn send(
        &mut self,
        payload: &Payload,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let dispatcher = self.dispatcher;
        let transport = &*dispatcher.transport;
        let channel = self.channel;

        match payload.strategy() {
            // Telegram doesn't allow keyboards on polls and albums
            Strategy::Poll(poll) => self.call(|| transport.send_poll(channel, poll)).await,
            Strategy::MediaGroup(images) => {
                self.call(|| transport.send_media_group(channel, images, &payload.text))
                    .await
            }
            Strategy::Generic => self.send_generic(payload, keyboard).await,
        }
    }

    async fn send_generic(
        &mut self,
        payload: &Payload,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let dispatcher = self.dispatcher;
        let transport = &*dispatcher.transport;
        let channel = self.channel;
        let text = payload.text.as_str();

        let Some(image) = &payload.image else {
            return self.send_chunks(text, keyboard).await;
        };

        if text.tg_len() <= CAPTION_LIMIT {
            return self
                .call(|| transport.send_photo(channel, image, Some(text), keyboard))
                .await;
        }

        debug!("Text doesn't fit into the caption, sending it after the photo");

        let message_id = self
            .call(|| transport.send_photo(channel, image, None, None))
            .await?;

        self.send_chunks(text, keyboard).await?;

        Ok(message_id)
    }

    /// The keyboard is attached to the last chunk. Returns the id of the
    /// first message.
    async fn send_chunks(
        &mut self,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let dispatcher = self.dispatcher;
        let transport = &*dispatcher.transport;
        let channel = self.channel;

        let chunks = split_message(text, MESSAGE_LIMIT);
        let last = chunks.len().saturating_sub(1);

        let mut first_message_id = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard = if i == last { keyboard } else { None };
            let message_id = self
                .call(|| transport.send_text(channel, chunk, keyboard))
                .await?;
            first_message_id.get_or_insert(message_id);
        }

        first_message_id.ok_or_else(|| TransportError::Permanent {
            message: "Nothing to send, the text is empty".to_owned(),
        })
    }

    /// Makes a single transport request with the timeout and the retries
    async fn call<F, Fut>(&mut self, request: F) -> Result<MessageId, TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<MessageId, TransportError>>,
    {
        let timeout = self.dispatcher.send_timeout;

        let attempted = retry_transient(
            self.dispatcher.retry,
            |_| {
                let response = request();
                async move {
                    tokio::time::timeout(timeout, response)
                        .await
                        .unwrap_or(Err(TransportError::Timeout { after: timeout }))
                }
            },
            TransportError::retryability,
        )
        .await;

        self.attempts += attempted.attempts;
        attempted.output
    }
}
