use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ButtonRequest, KeyboardButton, KeyboardMarkup};
use tracing::info;

use crate::handlers::Handlers;
use crate::traits::Outbound;
use crate::types::{
    AttachmentKind, AttachmentRef, ContactShare, FetchedFile, InboundEvent, UserIdentity,
};

/// Telegram transport: translates bot updates into `InboundEvent`s and
/// implements the `Outbound` reply/file interface over the bot API.
pub struct TelegramTransport {
    bot: Bot,
    bot_token: String,
    http: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Ok(Self {
            bot: Bot::new(bot_token),
            bot_token: bot_token.to_string(),
            http: crate::providers::build_http_client(Duration::from_secs(60))?,
        })
    }

    /// Run the dispatcher until shutdown, feeding every message through
    /// `Handlers::dispatch`.
    pub async fn run(self: Arc<Self>, handlers: Arc<Handlers>) {
        info!("Starting Telegram dispatcher");

        let handler = dptree::entry().branch(Update::filter_message().endpoint({
            move |msg: Message, _bot: Bot| {
                let handlers = Arc::clone(&handlers);
                async move {
                    if let Some((user, event)) = into_event(&msg) {
                        handlers.dispatch(user, event).await;
                    }
                    respond(())
                }
            }
        }));

        Dispatcher::builder(self.bot.clone(), handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

#[async_trait]
impl Outbound for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn request_contact(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        let keyboard = KeyboardMarkup::new(vec![vec![
            KeyboardButton::new("Verify Phone Number").request(ButtonRequest::Contact),
        ]])
        .resize_keyboard()
        .one_time_keyboard();

        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<FetchedFile> {
        let file = self.bot.get_file(file_id.to_string()).await?;

        // Download over HTTP, simpler than teloxide's Download trait.
        let download_url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot_token, file.path
        );
        let response = self.http.get(&download_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "failed to download file from Telegram: HTTP {}",
                response.status()
            );
        }
        let bytes = response.bytes().await?.to_vec();

        let filename = file
            .path
            .rsplit('/')
            .next()
            .unwrap_or("file")
            .to_string();

        Ok(FetchedFile { filename, bytes })
    }
}

/// Translate a Telegram message into a typed inbound event. Messages
/// without a sender, empty photo arrays, and unknown commands produce no
/// event.
fn into_event(msg: &Message) -> Option<(UserIdentity, InboundEvent)> {
    let from = msg.from.as_ref()?;
    let user = UserIdentity {
        chat_id: from.id.0 as i64,
        first_name: from.first_name.clone(),
        username: from.username.clone(),
    };

    if let Some(contact) = msg.contact() {
        let event = InboundEvent::Contact(ContactShare {
            user_id: contact.user_id.map(|id| id.0 as i64),
            phone_number: contact.phone_number.clone(),
            first_name: contact.first_name.clone(),
        });
        return Some((user, event));
    }

    if let Some(photos) = msg.photo() {
        // Size variants are ordered ascending; the last one is the
        // full-resolution photo.
        let photo = photos.last()?;
        let event = InboundEvent::Attachment(AttachmentRef {
            kind: AttachmentKind::Photo,
            file_id: photo.file.id.clone(),
            filename: Some("photo.jpg".to_string()),
            mime_type: Some("image/jpeg".to_string()),
        });
        return Some((user, event));
    }

    if let Some(doc) = msg.document() {
        let event = InboundEvent::Attachment(AttachmentRef {
            kind: AttachmentKind::Document,
            file_id: doc.file.id.clone(),
            filename: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
        });
        return Some((user, event));
    }

    let text = msg.text()?;
    let event = parse_text(text)?;
    Some((user, event))
}

/// Command surface: `/start`, `/websearch <query>`; any other command is
/// ignored and any non-command text becomes a `Text` event.
fn parse_text(text: &str) -> Option<InboundEvent> {
    let Some(rest) = text.strip_prefix('/') else {
        return Some(InboundEvent::Text {
            text: text.to_string(),
        });
    };

    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args),
        None => (rest, ""),
    };
    // Commands may be addressed to the bot: "/start@my_bot".
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "start" => Some(InboundEvent::Entry),
        "websearch" => Some(InboundEvent::Search {
            query: args.to_string(),
        }),
        _ => None,
    }
}
