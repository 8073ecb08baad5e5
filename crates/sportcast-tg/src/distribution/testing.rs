//! In-memory fakes of the collaborators that let the pipeline run without
//! a database or network.
use crate::content::*;
use crate::distribution::*;
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Envelope with a single item that has the `body`
pub(crate) fn envelope(kind: ContentKind, body: &str) -> ContentEnvelope {
    ContentEnvelope {
        id: "test".to_owned(),
        kind,
        language: None,
        items: vec![ContentItem {
            body: body.to_owned(),
            ..Default::default()
        }],
        image: None,
        generated_image: None,
        poll: None,
    }
}

/// Active channel of an active bot. Channels with lower ids are older.
pub(crate) fn channel(id: i64, language: &str) -> Channel {
    Channel {
        id: ChannelId(id),
        name: format!("Channel {id}"),
        chat: format!("-100{id}"),
        language: language.to_owned(),
        is_active: true,
        bot: BotCredential {
            id: 1,
            token: "1:test".to_owned(),
            is_active: true,
        },
        buttons: Default::default(),
        affiliate: Default::default(),
        posting: Default::default(),
        created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
    }
}

fn unavailable<T>() -> Result<T> {
    Err(sqlx::Error::PoolTimedOut.into())
}

pub(crate) struct InMemoryChannelStore {
    channels: Vec<Channel>,
    unavailable: bool,
}

impl InMemoryChannelStore {
    pub(crate) fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            unavailable: false,
        }
    }

    pub(crate) fn unavailable(self) -> Self {
        Self {
            unavailable: true,
            ..self
        }
    }

    fn select(&self, filter: impl Fn(&Channel) -> bool) -> Result<Vec<Channel>> {
        if self.unavailable {
            return unavailable();
        }
        Ok(self
            .channels
            .iter()
            .filter(|channel| channel.is_eligible() && filter(channel))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn active_channels_by_ids(&self, ids: &[ChannelId]) -> Result<Vec<Channel>> {
        self.select(|channel| ids.contains(&channel.id))
    }

    async fn active_channels_by_language(&self, language: &str) -> Result<Vec<Channel>> {
        self.select(|channel| normalize_tag(&channel.language) == language)
    }

    async fn active_channels(&self) -> Result<Vec<Channel>> {
        self.select(|_| true)
    }

    async fn any_active_channel(&self) -> Result<Option<Channel>> {
        Ok(self.select(|_| true)?.into_iter().next())
    }
}

type Sends = Arc<Mutex<Vec<(RateKey, Option<MessageId>, DateTime<Utc>)>>>;

/// Shares the key locks among all the gates that use it, the same way the
/// database does among the processes
#[derive(Default)]
pub(crate) struct InMemoryRateStore {
    sends: Sends,
    locks: Mutex<HashMap<RateKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryRateStore {
    /// Pretends there was a send in the past
    pub(crate) fn seed(&self, key: RateKey, sent_at: DateTime<Utc>) {
        self.sends.lock().push((key, None, sent_at));
    }

    pub(crate) fn sent_message_ids(&self) -> Vec<MessageId> {
        self.sends
            .lock()
            .iter()
            .filter_map(|(_, message_id, _)| *message_id)
            .collect()
    }

    /// Channels of the sends recorded by the permits in ascending order
    pub(crate) fn recorded_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self
            .sends
            .lock()
            .iter()
            .filter(|(_, message_id, _)| message_id.is_some())
            .map(|(key, ..)| key.channel)
            .collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn lock(&self, key: &RateKey) -> Result<Box<dyn RateLock>> {
        let lock = self.locks.lock().entry(key.clone()).or_default().clone();

        Ok(Box::new(InMemoryRateLock {
            key: key.clone(),
            sends: self.sends.clone(),
            _guard: lock.lock_owned().await,
        }))
    }
}

struct InMemoryRateLock {
    key: RateKey,
    sends: Sends,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[async_trait]
impl RateLock for InMemoryRateLock {
    async fn load(&mut self, window_start: DateTime<Utc>) -> Result<RateRecord> {
        let sends = self.sends.lock();
        let sends = sends.iter().filter(|(sent_key, ..)| *sent_key == self.key);

        let mut record = RateRecord::default();
        for (_, _, sent_at) in sends {
            record.last_sent_at = record.last_sent_at.max(Some(*sent_at));
            if *sent_at >= window_start {
                record.sent_in_window += 1;
            }
        }
        Ok(record)
    }

    async fn record(self: Box<Self>, message_id: MessageId, sent_at: DateTime<Utc>) -> Result {
        self.sends.lock().push((self.key.clone(), Some(message_id), sent_at));
        Ok(())
    }
}

/// Lets every channel through the gate of a fresh rate store
pub(crate) async fn admit(channels: Vec<Channel>) -> (Arc<InMemoryRateStore>, Vec<AdmittedChannel>) {
    let rates = Arc::new(InMemoryRateStore::default());
    let gate = SpamGate::new(rates.clone());

    let mut admitted = vec![];
    for channel in channels {
        let decision = gate
            .check(ContentKind::Live, &channel, None, Trigger::Manual)
            .await
            .unwrap();

        let GateDecision::Allowed(permit) = decision else {
            panic!("manual trigger must always be allowed");
        };

        admitted.push(AdmittedChannel {
            channel,
            permit,
            keyboard: None,
        });
    }

    (rates, admitted)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Text {
        channel: ChannelId,
        text: String,
        keyboard: bool,
    },
    Photo {
        channel: ChannelId,
        caption: Option<String>,
        keyboard: bool,
    },
    MediaGroup {
        channel: ChannelId,
        images: usize,
        caption: String,
    },
    Poll {
        channel: ChannelId,
        question: String,
        options: Vec<String>,
    },
}

pub(crate) enum Behavior {
    Fail(TransportError),

    /// Fails the given number of requests, then succeeds
    FailTimes(u32, TransportError),
    Panic,
    Hang,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    behaviors: Mutex<HashMap<ChannelId, Behavior>>,
    last_message_id: AtomicI32,
}

impl FakeTransport {
    pub(crate) fn behave(&self, channel: ChannelId, behavior: Behavior) {
        self.behaviors.lock().insert(channel, behavior);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    async fn request(&self, channel: &Channel, sent: Sent) -> Result<MessageId, TransportError> {
        let action = match self.behaviors.lock().get_mut(&channel.id) {
            None | Some(Behavior::FailTimes(0, _)) => None,
            Some(Behavior::Fail(err)) => Some(Behavior::Fail(err.clone())),
            Some(Behavior::FailTimes(times, err)) => {
                *times -= 1;
                Some(Behavior::Fail(err.clone()))
            }
            Some(Behavior::Panic) => Some(Behavior::Panic),
            Some(Behavior::Hang) => Some(Behavior::Hang),
        };

        match action {
            None => {}
            Some(Behavior::Fail(err) | Behavior::FailTimes(_, err)) => return Err(err),
            Some(Behavior::Panic) => panic!("transport exploded"),
            Some(Behavior::Hang) => tokio::time::sleep(Duration::from_secs(3600)).await,
        }

        self.sent.lock().push(sent);
        Ok(self.last_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(
        &self,
        channel: &Channel,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let sent = Sent::Text {
            channel: channel.id,
            text: text.to_owned(),
            keyboard: keyboard.is_some(),
        };
        self.request(channel, sent).await
    }

    async fn send_photo(
        &self,
        channel: &Channel,
        _image: &ImageRef,
        caption: Option<&str>,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let sent = Sent::Photo {
            channel: channel.id,
            caption: caption.map(ToOwned::to_owned),
            keyboard: keyboard.is_some(),
        };
        self.request(channel, sent).await
    }

    async fn send_media_group(
        &self,
        channel: &Channel,
        images: &[ImageRef],
        caption: &str,
    ) -> Result<MessageId, TransportError> {
        let sent = Sent::MediaGroup {
            channel: channel.id,
            images: images.len(),
            caption: caption.to_owned(),
        };
        self.request(channel, sent).await
    }

    async fn send_poll(&self, channel: &Channel, poll: &PollSpec) -> Result<MessageId, TransportError> {
        let sent = Sent::Poll {
            channel: channel.id,
            question: poll.question.clone(),
            options: poll.options.clone(),
        };
        self.request(channel, sent).await
    }
}

pub(crate) struct FakeImageGenerator {
    image_id: Option<&'static str>,
    requests: Mutex<Vec<ImageRequest>>,
    cleaned_up: Mutex<Vec<String>>,
}

impl FakeImageGenerator {
    pub(crate) fn returning(image_id: &'static str) -> Self {
        Self {
            image_id: Some(image_id),
            requests: Default::default(),
            cleaned_up: Default::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            image_id: None,
            requests: Default::default(),
            cleaned_up: Default::default(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn cleaned_up(&self) -> Vec<String> {
        self.cleaned_up.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<Option<GeneratedImage>> {
        self.requests.lock().push(request.clone());

        let Some(id) = self.image_id else {
            return Err(fatal!("image generator is down"));
        };

        let image = ImageRef::Url(
            format!("https://images.example.com/{id}.png")
                .parse()
                .fatal_ctx(|| "invalid test image URL")?,
        );

        Ok(Some(GeneratedImage {
            id: id.to_owned(),
            image,
        }))
    }

    async fn cleanup(&self, image: &GeneratedImage) -> Result {
        self.cleaned_up.lock().push(image.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingUsageSink {
    reports: Mutex<Vec<DistributionReport>>,
    quality: Mutex<Vec<QualityLogEntry>>,
}

impl RecordingUsageSink {
    pub(crate) fn reports(&self) -> Vec<DistributionReport> {
        self.reports.lock().clone()
    }

    pub(crate) fn quality(&self) -> Vec<QualityLogEntry> {
        self.quality.lock().clone()
    }
}

#[async_trait]
impl UsageSink for RecordingUsageSink {
    async fn record_distribution(&self, report: &DistributionReport) -> Result {
        self.reports.lock().push(report.clone());
        Ok(())
    }

    async fn record_quality(&self, entry: &QualityLogEntry) -> Result {
        self.quality.lock().push(entry.clone());
        Ok(())
    }
}
