//! Rendering of fetched messages into destination-channel text.

use std::str::FromStr;

use crate::{domain::Message, errors::Error, Result};

const FENCE: &str = "```";

/// Strategy used to turn a source message into forwarded text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageSerializer {
    /// Message text only.
    PlainText,
    /// Full message record as pretty JSON in a code block, so author,
    /// reactions and attachment metadata survive the forward.
    #[default]
    StructuredDump,
}

impl MessageSerializer {
    pub fn render(&self, message: &Message) -> String {
        match self {
            MessageSerializer::PlainText => plain_text(message),
            MessageSerializer::StructuredDump => structured_dump(message),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageSerializer::PlainText => "text",
            MessageSerializer::StructuredDump => "dump",
        }
    }
}

impl FromStr for MessageSerializer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" | "plain_text" => Ok(MessageSerializer::PlainText),
            "dump" | "json" | "structured" => Ok(MessageSerializer::StructuredDump),
            other => Err(Error::Config(format!(
                "FORWARD_FORMAT must be `dump` or `text`, got `{other}`"
            ))),
        }
    }
}

fn plain_text(message: &Message) -> String {
    message.text.clone().unwrap_or_default()
}

fn structured_dump(message: &Message) -> String {
    // Pretty-printing a serde_json::Value cannot fail.
    let body = serde_json::to_string_pretty(&message.raw).unwrap_or_else(|_| "{}".to_string());
    format!("{FENCE}\n{body}\n{FENCE}")
}

/// Recover the embedded record from a structured dump.
pub fn parse_structured_dump(text: &str) -> Result<serde_json::Value> {
    let inner = text
        .trim()
        .strip_prefix(FENCE)
        .and_then(|s| s.strip_suffix(FENCE))
        .ok_or_else(|| Error::Payload("structured dump is not fenced".to_string()))?;
    Ok(serde_json::from_str(inner.trim())?)
}
