/// Core error type for the forwarder.
///
/// Adapter crates should map their specific errors into this type so the
/// shortcut handler can classify and log failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to fetch source thread: {0}")]
    Fetch(String),

    #[error("failed to post message {position} of forwarded thread: {reason}")]
    Post { position: usize, reason: String },

    #[error("failed to list members of group {group}: {reason}")]
    GroupLookup { group: String, reason: String },

    #[error("failed to add reaction: {0}")]
    Reaction(String),

    #[error("slack {method} failed: {code}")]
    Api { method: String, code: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("request signature rejected: {0}")]
    Signature(String),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Slack error code carried by an API failure, if any.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Error::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
