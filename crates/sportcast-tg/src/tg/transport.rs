use super::{Bot, Config};
use crate::content::{Channel, ImageRef, PollSpec};
use crate::distribution::{ButtonAction, Keyboard, MessageId, Transport, TransportError};
use crate::prelude::*;
use async_trait::async_trait;
use std::collections::HashMap;
use teloxide::adaptors::throttle::Limits;
use teloxide::adaptors::trace::Settings;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto, ParseMode,
    Recipient,
};
use teloxide::RequestError;

/// Sends the messages on behalf of the bot that owns the channel
pub(crate) struct TgTransport {
    config: Config,

    /// Bots by their tokens. Each of them has its own throttling queue.
    bots: parking_lot::Mutex<HashMap<String, Bot>>,
}

impl TgTransport {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            bots: Default::default(),
        }
    }

    fn bot(&self, channel: &Channel) -> Bot {
        self.bots
            .lock()
            .entry(channel.bot.token.clone())
            .or_insert_with(|| {
                debug!(bot = channel.bot.id, "Creating a bot client");

                let mut bot = teloxide::Bot::new(&channel.bot.token);
                if let Some(api_url) = &self.config.api_url {
                    bot = bot.set_api_url(api_url.clone());
                }

                bot.throttle(Limits::default())
                    .parse_mode(ParseMode::Html)
                    .trace(Settings::TRACE_REQUESTS | Settings::TRACE_RESPONSES)
            })
            .clone()
    }
}

fn recipient(chat: &str) -> Recipient {
    if let Ok(id) = chat.parse() {
        return Recipient::Id(ChatId(id));
    }
    let handle = chat.trim_start_matches('@');
    Recipient::ChannelUsername(format!("@{handle}"))
}

fn input_file(image: &ImageRef) -> InputFile {
    match image {
        ImageRef::Url(url) => InputFile::url(url.clone()),
        ImageRef::File(path) => InputFile::file(path.clone()),
        ImageRef::TgFileId(id) => InputFile::file_id(id.clone()),
    }
}

fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows = keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                let label = button.label.clone();
                match &button.action {
                    ButtonAction::Url(url) | ButtonAction::Share(url) => {
                        InlineKeyboardButton::url(label, url.clone())
                    }
                    ButtonAction::Callback(data) => InlineKeyboardButton::callback(label, data.clone()),
                }
            })
            .collect::<Vec<_>>()
    });

    InlineKeyboardMarkup::new(rows)
}

fn classify(err: RequestError) -> TransportError {
    // Only the failures where Telegram surely didn't accept the request are
    // retried. Any other one could have posted the message already.
    match &err {
        RequestError::RetryAfter(retry_after) => TransportError::Transient {
            retry_after: Some(*retry_after),
            message: err.to_string(),
        },
        RequestError::Network(source) if source.is_connect() => TransportError::Transient {
            retry_after: None,
            message: err.to_string(),
        },
        _ => TransportError::Permanent {
            message: err.to_string(),
        },
    }
}

#[async_trait]
impl Transport for TgTransport {
    async fn send_text(
        &self,
        channel: &Channel,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut request = self
            .bot(channel)
            .send_message(recipient(&channel.chat), text)
            .disable_web_page_preview(true);

        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_keyboard(keyboard));
        }

        let message = request.await.map_err(classify)?;
        Ok(message.id.0)
    }

    async fn send_photo(
        &self,
        channel: &Channel,
        image: &ImageRef,
        caption: Option<&str>,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut request = self
            .bot(channel)
            .send_photo(recipient(&channel.chat), input_file(image));

        if let Some(caption) = caption {
            request = request.caption(caption);
        }

        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_keyboard(keyboard));
        }

        let message = request.await.map_err(classify)?;
        Ok(message.id.0)
    }

    async fn send_media_group(
        &self,
        channel: &Channel,
        images: &[ImageRef],
        caption: &str,
    ) -> Result<MessageId, TransportError> {
        let media = images.iter().enumerate().map(|(i, image)| {
            let photo = InputMediaPhoto::new(input_file(image));
            // Telegram shows the caption of the first item as the caption of the album
            let photo = if i == 0 {
                photo.caption(caption).parse_mode(ParseMode::Html)
            } else {
                photo
            };
            InputMedia::Photo(photo)
        });

        let messages = self
            .bot(channel)
            .send_media_group(recipient(&channel.chat), media)
            .await
            .map_err(classify)?;

        messages
            .first()
            .map(|message| message.id.0)
            .ok_or_else(|| TransportError::Permanent {
                message: "Telegram returned no messages for the media group".to_owned(),
            })
    }

    async fn send_poll(&self, channel: &Channel, poll: &PollSpec) -> Result<MessageId, TransportError> {
        let options = poll
            .options
            .iter()
            .filter_map(|option| option.non_blank())
            .map(ToOwned::to_owned);

        let message = self
            .bot(channel)
            .send_poll(recipient(&channel.chat), poll.question.trim(), options)
            .is_anonymous(poll.is_anonymous)
            .allows_multiple_answers(poll.allows_multiple_answers)
            .await
            .map_err(classify)?;

        Ok(message.id.0)
    }
}
