//! Admission of the sends according to the cooldown and the rolling window
//! of the content kind in the channel.
use crate::content::{Channel, ChannelId, ContentKind, PostingSettings};
use crate::distribution::MessageId;
use crate::observability::metrics::GATE_BLOCKED_TOTAL;
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// The number of idle key locks after which the unused ones are pruned
const MAX_IDLE_LOCKS: usize = 1024;

/// Origin of the distribution request
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    /// An operator is testing the content, the gate is bypassed
    Manual,

    /// Scheduled sending, the gate is always enforced
    Automation,

    /// Request from the API, the gate is enforced
    Api,
}

impl Trigger {
    /// Automation wins if both flags are set, so an automated job can never
    /// bypass the gate.
    pub fn from_flags(is_manual: bool, is_automation: bool) -> Self {
        match (is_manual, is_automation) {
            (_, true) => Self::Automation,
            (true, false) => Self::Manual,
            (false, false) => Self::Api,
        }
    }

    fn bypasses_gate(self) -> bool {
        match self {
            Self::Manual => true,
            Self::Automation | Self::Api => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey {
    pub channel: ChannelId,
    pub kind: ContentKind,

    /// Optional sub-key, e.g. a fixture, so that unrelated updates of the
    /// same kind don't block each other
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateRecord {
    pub last_sent_at: Option<DateTime<Utc>>,

    /// Number of sends since the start of the rolling window
    pub sent_in_window: u32,
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Waits for the lock of the key. The lock is exclusive among all the
    /// processes that share the store, and it is released once it's dropped
    /// or the send is recorded through it.
    async fn lock(&self, key: &RateKey) -> Result<Box<dyn RateLock>>;
}

/// Exclusive access to the send history of a single [`RateKey`]
#[async_trait]
pub trait RateLock: Send {
    async fn load(&mut self, window_start: DateTime<Utc>) -> Result<RateRecord>;

    /// Persists the send and releases the lock
    async fn record(self: Box<Self>, message_id: MessageId, sent_at: DateTime<Utc>) -> Result;
}

/// Effective limits of the content kind in a specific channel
#[derive(Debug, Clone, Copy)]
struct GatePolicy {
    cooldown: Duration,
    window: Duration,
    max_per_window: u32,
}

impl GatePolicy {
    fn new(kind: ContentKind, posting: &PostingSettings) -> Self {
        let config = kind.config();
        Self {
            cooldown: posting
                .min_interval_minutes
                .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
                .unwrap_or(config.cooldown),
            window: config.window,
            max_per_window: posting.max_posts_per_window.unwrap_or(config.max_per_window),
        }
    }
}

#[derive(Debug)]
pub enum GateDecision {
    Allowed(SendPermit),
    Blocked { reason: String },
}

/// Proof of admission. It holds the lock of the key in the store until it
/// is recorded or dropped, so no other send of the same key can be admitted
/// meanwhile, even by another process.
pub struct SendPermit {
    key: RateKey,
    lock: Box<dyn RateLock>,

    /// Queues the checks of this process locally, so that they don't occupy
    /// the store while waiting for the key
    _guard: OwnedMutexGuard<()>,
}

impl fmt::Debug for SendPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendPermit")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SendPermit {
    pub fn key(&self) -> &RateKey {
        &self.key
    }

    /// Must be called only after the transport confirmed the send
    pub async fn record_sent(self, message_id: MessageId) -> Result {
        self.lock.record(message_id, Utc::now()).await
    }
}

pub struct SpamGate {
    store: Arc<dyn RateStore>,
    locks: parking_lot::Mutex<HashMap<RateKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SpamGate {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self {
            store,
            locks: Default::default(),
        }
    }

    fn key_lock(&self, key: &RateKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();

        if locks.len() > MAX_IDLE_LOCKS {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        locks.entry(key.clone()).or_default().clone()
    }

    #[instrument(skip_all, fields(channel = %channel.id, %kind, bucket, %trigger))]
    pub async fn check(
        &self,
        kind: ContentKind,
        channel: &Channel,
        bucket: Option<&str>,
        trigger: Trigger,
    ) -> Result<GateDecision> {
        let key = RateKey {
            channel: channel.id,
            kind,
            bucket: bucket.map(ToOwned::to_owned),
        };

        let guard = self.key_lock(&key).lock_owned().await;
        let mut lock = self.store.lock(&key).await?;

        if trigger.bypasses_gate() {
            debug!("Manual trigger bypasses the gate");
            return Ok(GateDecision::Allowed(SendPermit {
                key,
                lock,
                _guard: guard,
            }));
        }

        let policy = GatePolicy::new(kind, &channel.posting);
        let now = Utc::now();
        let record = lock.load(now.saturating_sub_std(policy.window)).await?;

        let Some(reason) = deny_reason(policy, &record, now) else {
            return Ok(GateDecision::Allowed(SendPermit {
                key,
                lock,
                _guard: guard,
            }));
        };

        info!(%reason, "Spam gate blocked the send");

        metrics::increment_counter!(GATE_BLOCKED_TOTAL, "kind" => kind.as_str());

        Ok(GateDecision::Blocked { reason })
    }

    /// Checks the channels in ascending order of their ids, so that two
    /// distributions that overlap in channels acquire the key locks in the
    /// same order. Duplicate channels are checked once.
    pub async fn check_all(
        &self,
        kind: ContentKind,
        mut channels: Vec<Channel>,
        bucket: Option<&str>,
        trigger: Trigger,
    ) -> Result<Vec<(Channel, GateDecision)>> {
        channels.sort_by_key(|channel| channel.id);
        channels.dedup_by_key(|channel| channel.id);

        let mut decisions = Vec::with_capacity(channels.len());
        for channel in channels {
            let decision = self.check(kind, &channel, bucket, trigger).await?;
            decisions.push((channel, decision));
        }
        Ok(decisions)
    }
}

fn deny_reason(policy: GatePolicy, record: &RateRecord, now: DateTime<Utc>) -> Option<String> {
    if let Some(last_sent_at) = record.last_sent_at {
        let elapsed = last_sent_at.elapsed_until(now);
        if elapsed < policy.cooldown {
            return Some(format!(
                "cooldown active, last sent {}s ago (cooldown {}s)",
                elapsed.as_secs(),
                policy.cooldown.as_secs()
            ));
        }
    }

    if record.sent_in_window >= policy.max_per_window {
        return Some(format!(
            "rolling window limit reached, {} sends in the last {}s (limit {})",
            record.sent_in_window,
            policy.window.as_secs(),
            policy.max_per_window
        ));
    }

    None
}
