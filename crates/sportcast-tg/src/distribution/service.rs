//! Entry point of the pipeline: resolve the channels, pass them through the
//! spam gate, prepare the payload once, dispatch it and report.
use crate::content::{ChannelId, ContentEnvelope, ContentKind, Language};
use crate::distribution::detect::detect;
use crate::distribution::dispatcher::{AdmittedChannel, Dispatcher, Payload, SendOutcome, Transport};
use crate::distribution::image::{ImageGenerator, ImageResolver};
use crate::distribution::keyboard::{build_keyboard, ButtonLinkConfig, ButtonsConfig};
use crate::distribution::resolver::{ChannelResolver, ChannelStore, ResolutionStep};
use crate::distribution::spam_gate::{GateDecision, RateStore, SpamGate, Trigger};
use crate::distribution::Config;
use crate::observability::metrics::DISTRIBUTIONS_TOTAL;
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

/// Analytics storage. Failures to record are logged and never fail the
/// distribution.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_distribution(&self, report: &DistributionReport) -> Result;

    async fn record_quality(&self, entry: &QualityLogEntry) -> Result;
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityLogEntry {
    pub envelope_id: String,
    pub kind: ContentKind,
    pub issue: QualityIssue,

    /// Language the content is distributed in
    pub language: Language,
    pub detected_language: Option<Language>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QualityIssue {
    LanguageMismatch,
    EmptyContent,
}

#[derive(Debug, Clone)]
pub struct DistributionRequest {
    pub envelope: ContentEnvelope,
    pub target_channels: Option<Vec<ChannelId>>,
    pub language: Option<String>,
    pub trigger: Trigger,

    /// Sub-key of the spam gate, e.g. a fixture id for the live updates
    pub bucket: Option<String>,
    pub include_images: bool,

    /// Channels not started before this instant are skipped
    pub deadline: Option<Instant>,
}

impl DistributionRequest {
    pub fn new(envelope: ContentEnvelope) -> Self {
        Self {
            envelope,
            target_channels: None,
            language: None,
            trigger: Trigger::Api,
            bucket: None,
            include_images: true,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DistributionStatus {
    /// At least one channel received the content
    Delivered,
    NoEligibleChannels,
    AllBlocked,

    /// Every admitted channel either failed or was skipped
    AllFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedChannel {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub envelope_id: String,
    pub kind: ContentKind,
    pub success: bool,
    pub status: DistributionStatus,
    pub language: Language,
    pub resolution_step: Option<ResolutionStep>,
    pub notes: Vec<String>,
    pub trigger: Trigger,

    /// Origin of the image that accompanied the content
    pub image: Option<&'static str>,
    pub channels_attempted: usize,
    pub success_count: usize,
    pub results: Vec<SendOutcome>,
    pub blocked: Vec<BlockedChannel>,
    pub skipped: Vec<ChannelId>,
    pub error: Option<String>,
}

/// Collaborators of the pipeline that talk to the outside world
pub struct Collaborators {
    pub channels: Arc<dyn ChannelStore>,
    pub rates: Arc<dyn RateStore>,
    pub usage: Arc<dyn UsageSink>,
    pub transport: Arc<dyn Transport>,
    pub image_generator: Option<Arc<dyn ImageGenerator>>,
}

pub struct DistributionService {
    resolver: ChannelResolver,
    gate: SpamGate,
    images: ImageResolver,
    dispatcher: Dispatcher,
    usage: Arc<dyn UsageSink>,
    buttons: ButtonLinkConfig,
}

impl DistributionService {
    pub fn new(config: &Config, buttons: ButtonsConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            channels,
            rates,
            usage,
            transport,
            image_generator,
        } = collaborators;

        Self {
            resolver: ChannelResolver::new(channels),
            gate: SpamGate::new(rates),
            images: ImageResolver::new(image_generator, config.fallback_image_base_url.clone()),
            dispatcher: Dispatcher::new(transport, config),
            usage,
            buttons: buttons.into(),
        }
    }

    /// Expected conditions such as no eligible channels, the spam gate
    /// denials and the send failures are reported, not returned as errors.
    pub async fn distribute(&self, request: DistributionRequest) -> Result<DistributionReport> {
        let span = info_span!(
            "distribute",
            kind = %request.envelope.kind,
            envelope_id = %request.envelope.id,
            trigger = %request.trigger,
        );

        let report = self.distribute_imp(request).instrument(span.clone()).await?;

        span.in_scope(|| {
            info!(
                status = %report.status,
                success_count = report.success_count,
                blocked = report.blocked.len(),
                skipped = report.skipped.len(),
                "Distribution finished"
            );
        });

        metrics::increment_counter!(
            DISTRIBUTIONS_TOTAL,
            "kind" => report.kind.as_str(),
            "status" => <&'static str>::from(report.status),
        );

        if let Err(err) = self.usage.record_distribution(&report).await {
            warn!(err = tracing_err(&err), "Failed to record the distribution report");
        }

        Ok(report)
    }

    async fn distribute_imp(&self, request: DistributionRequest) -> Result<DistributionReport> {
        let DistributionRequest {
            envelope,
            target_channels,
            language,
            trigger,
            bucket,
            include_images,
            deadline,
        } = request;

        let resolution = self
            .resolver
            .resolve(target_channels.as_deref(), language.as_deref())
            .await?;

        let language = resolution.language;

        let mut report = DistributionReport {
            envelope_id: envelope.id.clone(),
            kind: envelope.kind,
            success: false,
            status: DistributionStatus::NoEligibleChannels,
            language,
            resolution_step: resolution.step,
            notes: resolution.notes,
            trigger,
            image: None,
            channels_attempted: 0,
            success_count: 0,
            results: vec![],
            blocked: vec![],
            skipped: vec![],
            error: None,
        };

        self.check_quality(&envelope, language).await;

        if resolution.channels.is_empty() {
            report.error = Some("no eligible channels".to_owned());
            return Ok(report);
        }

        let decisions = self
            .gate
            .check_all(envelope.kind, resolution.channels, bucket.as_deref(), trigger)
            .await?;

        let now = Utc::now();
        let mut admitted = vec![];

        for (channel, decision) in decisions {
            match decision {
                GateDecision::Allowed(permit) => {
                    let buttons = self.buttons.with_overrides(&channel);
                    admitted.push(AdmittedChannel {
                        keyboard: build_keyboard(&envelope, language, &buttons, now),
                        channel,
                        permit,
                    });
                }
                GateDecision::Blocked { reason } => report.blocked.push(BlockedChannel {
                    channel_id: channel.id,
                    channel_name: channel.name,
                    reason,
                }),
            }
        }

        if admitted.is_empty() {
            report.status = DistributionStatus::AllBlocked;
            report.error = Some("all channels are blocked by the spam gate".to_owned());
            return Ok(report);
        }

        report.channels_attempted = admitted.len();

        let image = self.images.resolve(&envelope, language, include_images).await;
        report.image = image.as_ref().map(|image| image.origin.as_str());

        let payload = Payload::new(&envelope, language, image.as_ref().map(|image| &image.image));

        let summary = self.dispatcher.distribute(admitted, &payload, deadline).await;

        if let Some(image) = &image {
            self.images.cleanup(image).await;
        }

        report.success_count = summary.success_count;
        report.results = summary.outcomes;
        report.skipped = summary.skipped;
        report.success = report.success_count > 0;

        if report.success {
            report.status = DistributionStatus::Delivered;
        } else {
            report.status = DistributionStatus::AllFailed;
            report.error = Some("no channel received the content".to_owned());
        }

        Ok(report)
    }

    async fn check_quality(&self, envelope: &ContentEnvelope, language: Language) {
        let text = envelope.items.iter().map(|item| &item.body).join("\n");

        let issue = if text.non_blank().is_none() && envelope.valid_poll().is_none() {
            Some((QualityIssue::EmptyContent, None))
        } else {
            match detect(&text) {
                Some(detected) if detected != language => {
                    warn!(
                        %language,
                        %detected,
                        "Content seems to be in a different language than the channels"
                    );
                    Some((QualityIssue::LanguageMismatch, Some(detected)))
                }
                _ => None,
            }
        };

        let Some((issue, detected_language)) = issue else {
            return;
        };

        let entry = QualityLogEntry {
            envelope_id: envelope.id.clone(),
            kind: envelope.kind,
            issue,
            language,
            detected_language,
        };

        if let Err(err) = self.usage.record_quality(&entry).await {
            warn!(err = tracing_err(&err), "Failed to record the content quality issue");
        }
    }
}
