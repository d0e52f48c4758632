//! Message shortcut payloads (`type: message_action`).

use serde::Deserialize;
use serde_json::Value;

use stf_core::{
    domain::{ChannelId, ShortcutEvent, Ts, UserId},
    errors::Error,
    Result,
};

const MESSAGE_ACTION: &str = "message_action";

#[derive(Debug, Deserialize)]
struct MessageActionPayload {
    callback_id: String,
    channel: IdRef,
    user: IdRef,
    message: ActedMessage,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ActedMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
}

/// Extract a forward shortcut from an interactivity payload.
///
/// Returns `Ok(None)` for payloads that are not a message shortcut with
/// `callback_id` (other shortcuts, block actions, view submissions).
pub fn parse_shortcut(payload: &Value, callback_id: &str) -> Result<Option<ShortcutEvent>> {
    let kind = payload.get("type").and_then(Value::as_str).unwrap_or("");
    if kind != MESSAGE_ACTION {
        return Ok(None);
    }
    if payload.get("callback_id").and_then(Value::as_str) != Some(callback_id) {
        return Ok(None);
    }

    let p: MessageActionPayload = serde_json::from_value(payload.clone())
        .map_err(|e| Error::Payload(format!("message_action: {e}")))?;

    Ok(Some(ShortcutEvent {
        callback_id: p.callback_id,
        channel: ChannelId(p.channel.id),
        user: UserId(p.user.id),
        message_ts: Ts(p.message.ts),
        message_author: p.message.user.map(UserId),
    }))
}
