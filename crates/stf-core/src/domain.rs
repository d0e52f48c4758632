use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Slack user id (`U…` / `W…`).
    UserId
);
string_id!(
    /// Slack conversation id (`C…`, `G…`, `D…`).
    ChannelId
);
string_id!(
    /// Slack user group id (`S…`).
    GroupId
);
string_id!(
    /// Message timestamp identifier. Unique within a channel and ordered by send time.
    Ts
);

/// A stable reference to a Slack message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub ts: Ts,
}

/// A single fetched chat message.
///
/// `raw` keeps the full record exactly as the platform returned it so the
/// structured dump can show fields we don't model (reactions, files, blocks).
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub ts: Ts,
    pub user: Option<UserId>,
    pub text: Option<String>,
    pub raw: serde_json::Value,
}

impl Message {
    /// Build a message from a raw platform record. Returns `None` when the
    /// record has no `ts`, which Slack never omits for real messages.
    pub fn from_raw(raw: serde_json::Value) -> Option<Self> {
        let ts = raw.get("ts").and_then(|v| v.as_str()).map(Ts::from)?;
        let user = raw.get("user").and_then(|v| v.as_str()).map(UserId::from);
        let text = raw
            .get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Some(Self {
            ts,
            user,
            text,
            raw,
        })
    }
}

/// Root message followed by its replies in chronological order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Thread {
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn root(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn replies(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or(&[])
    }
}

/// A "forward this message" shortcut invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortcutEvent {
    pub callback_id: String,
    pub channel: ChannelId,
    pub user: UserId,
    pub message_ts: Ts,
    /// Author of the acted-upon message (may be absent for bot/system messages).
    pub message_author: Option<UserId>,
}

impl ShortcutEvent {
    pub fn source(&self) -> MessageRef {
        MessageRef {
            channel: self.channel.clone(),
            ts: self.message_ts.clone(),
        }
    }
}
