//! Turns a content envelope into the text of a Telegram message in the
//! HTML parse mode.
mod html;
mod truncate;

use crate::content::{ContentEnvelope, ContentKind, Language};
use crate::distribution::labels::Label;
use crate::prelude::*;
use itertools::Itertools;
use lazy_regex::regex_is_match;

pub(crate) use html::{escape_text, sanitize, strip_tags};
pub(crate) use truncate::split_message;

/// Number of non-empty lines kept in the news
const NEWS_MAX_LINES: usize = 12;

/// Number of predictions kept in the betting tips
const BETTING_MAX_PREDICTIONS: usize = 5;

/// Number of non-empty lines kept in the memes
const MEMES_MAX_LINES: usize = 3;

/// Text reshaped for the kind, and the footer that must survive truncation
struct Optimized {
    body: String,
    footer: Option<String>,
}

/// Formats the envelope into the text that fits the length limits of the
/// content kind. The caption limit applies if the text accompanies an image.
///
/// Analysis is never truncated, the caller must split it with
/// [`split_message`] if it exceeds the transport limit.
pub fn format(envelope: &ContentEnvelope, language: Language, has_image: bool) -> String {
    let kind = envelope.kind;
    let config = kind.config();

    let cleaned = sanitize(&raw_text(envelope));

    if cleaned.is_empty() {
        warn!(envelope_id = %envelope.id, %kind, "Content envelope has no text");
        return Label::NoContent.localize(language).to_owned();
    }

    let Optimized { body, footer } = optimize(kind, cleaned, language);

    let (body, prefix_len) = with_emoji(&body, config.emoji);

    let footer = footer
        .map(|footer| format!("\n\n{footer}"))
        .unwrap_or_default();

    let full = format!("{body}{footer}");

    if !config.truncate {
        return full;
    }

    let max_len = config.max_len(has_image);

    if full.tg_len() <= max_len {
        return full;
    }

    let tail = format!(
        "\n\n{}{footer}",
        Label::ContinueReading.localize(language)
    );

    let truncated = truncate::truncate_html(&body, max_len, &tail, prefix_len);

    debug!(
        %kind,
        original_len = full.tg_len(),
        truncated_len = truncated.tg_len(),
        max_len,
        "Truncated content"
    );

    truncated
}

/// Concatenates the items of the envelope into a single HTML document
fn raw_text(envelope: &ContentEnvelope) -> String {
    let items = envelope
        .items
        .iter()
        .filter_map(|item| {
            let title = item
                .title
                .as_deref()
                .and_then(|title| title.non_blank())
                .map(|title| format!("<b>{title}</b>"));

            let body = item.body.non_blank();

            match (title, body) {
                (Some(title), Some(body)) => Some(format!("{title}\n{body}")),
                (Some(title), None) => Some(title),
                (None, Some(body)) => Some(body.to_owned()),
                (None, None) => None,
            }
        })
        .join("\n\n");

    if !items.is_empty() {
        return items;
    }

    // Polls may come without any text other than the poll itself
    let Some(poll) = &envelope.poll else {
        return items;
    };

    let options = poll
        .options
        .iter()
        .filter_map(|option| option.non_blank())
        .map(|option| format!("• {}", escape_text(option)));

    std::iter::once(format!("<b>{}</b>", escape_text(poll.question.trim())))
        .chain(options)
        .join("\n")
}

fn with_emoji(body: &str, emoji: &str) -> (String, usize) {
    if body.starts_with(emoji) {
        return (body.to_owned(), emoji.len());
    }
    let prefix = format!("{emoji} ");
    (format!("{prefix}{body}"), prefix.len())
}

fn optimize(kind: ContentKind, text: String, language: Language) -> Optimized {
    let body = match kind {
        ContentKind::News => first_lines(&text, NEWS_MAX_LINES),
        ContentKind::Betting => {
            return Optimized {
                body: betting(&text),
                footer: Some(Label::GamblingDisclaimer.localize(language).to_owned()),
            }
        }
        ContentKind::Live => live(&text),
        ContentKind::DailySummary | ContentKind::WeeklySummary => summary(&text),
        ContentKind::Memes => first_lines(&text, MEMES_MAX_LINES),
        ContentKind::Analysis | ContentKind::Polls | ContentKind::Coupons => text,
    };

    Optimized { body, footer: None }
}

/// Keeps the first `max` non-empty lines along with the blank lines between them
fn first_lines(text: &str, max: usize) -> String {
    let mut non_empty = 0;
    let mut lines = text.lines().take_while(|line| {
        if line.trim().is_empty() {
            return true;
        }
        non_empty += 1;
        non_empty <= max
    });
    // Cutting the lines may leave the tags that span several lines open
    sanitize(&lines.join("\n"))
}

fn is_prediction(line: &str) -> bool {
    regex_is_match!(
        r"(?i)(\bvs?\b\.?|\btips?\b|\bpicks?\b|\bodds\b|\bprediction|@\s*\d|^\s*(•|-|\d+[.)])\s)",
        &strip_tags(line)
    )
}

/// Keeps the header and the top predictions
fn betting(text: &str) -> String {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let Some(header) = lines.next() else {
        return text.to_owned();
    };

    let rest: Vec<_> = lines.collect();

    let predictions: Vec<_> = rest
        .iter()
        .copied()
        .filter(|line| is_prediction(line))
        .take(BETTING_MAX_PREDICTIONS)
        .collect();

    let predictions = if predictions.is_empty() {
        rest.into_iter().take(BETTING_MAX_PREDICTIONS).collect()
    } else {
        predictions
    };

    sanitize(&std::iter::once(header).chain(predictions).join("\n"))
}

fn is_live_event(line: &str) -> bool {
    regex_is_match!(
        r"(?i)(\d+\s*[-:]\s*\d+|\d+\+?\d*'|⚽|🟨|🟥|🔄|\bgoal|\bcard\b|\bsubstitution|\bpenalty|\bkick-?off|\bhalf-?time|\bfull-?time|\bHT\b|\bFT\b)",
        &strip_tags(line)
    )
}

/// Keeps only the lines with the score or match events
fn live(text: &str) -> String {
    let events = text.lines().filter(|line| is_live_event(line)).join("\n");
    if events.trim().is_empty() {
        return text.to_owned();
    }
    sanitize(&events)
}

fn is_highlight(section: &str) -> bool {
    regex_is_match!(
        r"(?i)(🔥|⭐|🏆|✅|❗|\bhighlights?\b|\btop\b|\bkey\b|\bresults?\b|\bwinners?\b|\bgoals?\b)",
        &strip_tags(section)
    )
}

/// Keeps the header section and the sections with highlight markers
fn summary(text: &str) -> String {
    let mut sections = text.split("\n\n");

    let Some(header) = sections.next() else {
        return text.to_owned();
    };

    let highlights: Vec<_> = sections.filter(|section| is_highlight(section)).collect();

    if highlights.is_empty() {
        return text.to_owned();
    }

    sanitize(&std::iter::once(header).chain(highlights).join("\n\n"))
}

#[cfg(test)]
mod tests;
