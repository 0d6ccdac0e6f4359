use std::collections::VecDeque;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use intake_core::config::ChatConfig;
use intake_core::dialog::action::CallbackAction;
use intake_core::dialog::states::{Button, Keyboard};

use crate::events::{chunk_text, InboundEvent, InboundKind, OutboundMessage, MAX_MESSAGE_LEN};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat service returned status {0}")]
    Status(u16),
    #[error("could not decode chat response: {0}")]
    Decode(String),
}

/// Boundary to the chat service. `next_event` blocks on the long poll and
/// returns `Ok(None)` only when the transport has shut down for good.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError>;

    async fn send(&self, user: &str, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Transport that accepts every send and never produces events. Useful when
/// wiring components that need a transport but must not talk to anyone.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopChatTransport;

#[async_trait]
impl ChatTransport for NoopChatTransport {
    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
        Ok(None)
    }

    async fn send(&self, _user: &str, _message: OutboundMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Long-polling Bot API client. Updates arrive in batches; decoded events
/// are queued and handed out one at a time.
pub struct BotApiTransport {
    client: reqwest::Client,
    base_url: String,
    poll_timeout_secs: u64,
    offset: Mutex<i64>,
    queue: Mutex<VecDeque<InboundEvent>>,
}

impl BotApiTransport {
    pub fn new(config: &ChatConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let base_url = format!(
            "{}/bot{}",
            config.api_base_url.trim_end_matches('/'),
            config.bot_token.expose_secret()
        );

        Ok(Self {
            client,
            base_url,
            poll_timeout_secs: config.poll_timeout_secs,
            offset: Mutex::new(0),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response.json::<Value>().await.map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn poll_updates(&self) -> Result<(), TransportError> {
        let offset = *self.offset.lock().await;
        let raw = self
            .call("getUpdates", json!({ "offset": offset, "timeout": self.poll_timeout_secs }))
            .await?;
        let parsed: UpdatesResponse =
            serde_json::from_value(raw).map_err(|err| TransportError::Decode(err.to_string()))?;

        let mut queue = self.queue.lock().await;
        let mut next_offset = offset;
        for update in parsed.result {
            next_offset = next_offset.max(update.update_id + 1);
            if let Some(event) = self.decode_update(update).await {
                queue.push_back(event);
            }
        }
        drop(queue);

        *self.offset.lock().await = next_offset;
        Ok(())
    }

    async fn decode_update(&self, update: Update) -> Option<InboundEvent> {
        if let Some(message) = update.message {
            let text = message.text?;
            return Some(InboundEvent {
                user: message.chat.id.to_string(),
                kind: InboundKind::Text(text),
            });
        }

        if let Some(callback) = update.callback_query {
            // Stop the client-side spinner whether or not the data decodes.
            if let Err(err) =
                self.call("answerCallbackQuery", json!({ "callback_query_id": callback.id })).await
            {
                warn!(error = %err, "failed to answer a callback query");
            }

            let user = callback
                .message
                .map(|message| message.chat.id)
                .unwrap_or(callback.from.id)
                .to_string();
            let data = callback.data.unwrap_or_default();
            return match CallbackAction::decode(&data) {
                Some(action) => Some(InboundEvent { user, kind: InboundKind::Action(action) }),
                None => {
                    warn!(data, "discarding callback with malformed data");
                    None
                }
            };
        }

        None
    }
}

#[async_trait]
impl ChatTransport for BotApiTransport {
    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
        loop {
            if let Some(event) = self.queue.lock().await.pop_front() {
                return Ok(Some(event));
            }
            self.poll_updates().await?;
            if self.queue.lock().await.is_empty() {
                // Empty long poll; go straight back to waiting.
                debug!("long poll returned no updates");
            }
        }
    }

    async fn send(&self, user: &str, message: OutboundMessage) -> Result<(), TransportError> {
        let parts = chunk_text(&message.text, MAX_MESSAGE_LEN);
        let last = parts.len().saturating_sub(1);

        for (position, part) in parts.into_iter().enumerate() {
            let mut body = json!({ "chat_id": user, "text": part });
            // The keyboard rides on the final part only.
            if position == last {
                if let Some(keyboard) = &message.keyboard {
                    body["reply_markup"] = render_keyboard(keyboard);
                }
            }
            self.call("sendMessage", body).await?;
        }

        Ok(())
    }
}

/// Reply keyboards and inline keyboards are different wire shapes; a
/// keyboard with any callback button is rendered inline.
fn render_keyboard(keyboard: &Keyboard) -> Value {
    let inline = keyboard
        .rows
        .iter()
        .flatten()
        .any(|button| matches!(button, Button::Callback { .. }));

    if inline {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match button {
                        Button::Callback { label, action } => {
                            json!({ "text": label, "callback_data": action.encode() })
                        }
                        Button::Reply { label } => json!({ "text": label, "callback_data": label }),
                    })
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    } else {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match button {
                        Button::Reply { label } | Button::Callback { label, .. } => {
                            json!({ "text": label })
                        }
                    })
                    .collect()
            })
            .collect();
        json!({ "keyboard": rows, "resize_keyboard": true })
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: Sender,
    data: Option<String>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
}
