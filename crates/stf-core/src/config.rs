use std::{env, fs, net::IpAddr, path::Path};

use crate::{
    domain::{ChannelId, GroupId, UserId},
    errors::Error,
    formatting::MessageSerializer,
    security::AllowList,
    Result,
};

pub const DEFAULT_CALLBACK_ID: &str = "forward_thread";
pub const DEFAULT_REACTION: &str = "blue_book";
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_PORT: u16 = 3000;

/// How inbound events reach the process. Does not affect forwarding logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Long-lived Socket Mode WebSocket.
    Socket,
    /// Request/response HTTP endpoint (serverless-style deployment).
    Http,
}

/// Typed configuration, read once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct Config {
    // Slack credentials
    pub slack_bot_token: String,
    pub slack_app_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_api_base: String,

    // Forwarding
    pub forward_to_channel: ChannelId,
    pub callback_id: String,
    pub serializer: MessageSerializer,
    pub reaction: Option<String>,

    // Authorization
    pub allow_list: AllowList,

    // Transport
    pub mode: Mode,
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Config {
    /// Load from the process environment, after applying `./.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let slack_bot_token = get("SLACK_BOT_TOKEN").ok_or_else(|| {
            Error::Config("SLACK_BOT_TOKEN environment variable is required".to_string())
        })?;
        let forward_to_channel = get("FORWARD_TO_CHANNEL").map(ChannelId).ok_or_else(|| {
            Error::Config("FORWARD_TO_CHANNEL environment variable is required".to_string())
        })?;

        let slack_app_token = get("SLACK_APP_TOKEN");
        let slack_signing_secret = get("SLACK_SIGNING_SECRET");
        let slack_api_base = get("SLACK_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        // Transport
        let mode = match get("STF_MODE") {
            Some(raw) => parse_mode(&raw)?,
            // Local development runs over Socket Mode.
            None => match get("NODE_ENV").as_deref().map(str::trim) {
                Some("development") => Mode::Socket,
                _ => Mode::Http,
            },
        };
        match mode {
            Mode::Socket if slack_app_token.is_none() => {
                return Err(Error::Config(
                    "SLACK_APP_TOKEN is required for socket mode".to_string(),
                ))
            }
            Mode::Http if slack_signing_secret.is_none() => {
                return Err(Error::Config(
                    "SLACK_SIGNING_SECRET is required for http mode".to_string(),
                ))
            }
            _ => {}
        }

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("PORT must be a port number: {e}")))?,
            None => DEFAULT_PORT,
        };
        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| Error::Config(format!("BIND_ADDR must be an IP address: {e}")))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        // Forwarding behavior
        let serializer = match get("FORWARD_FORMAT") {
            Some(raw) => raw.parse::<MessageSerializer>()?,
            None => MessageSerializer::default(),
        };
        let callback_id = get("SHORTCUT_CALLBACK_ID")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_CALLBACK_ID.to_string());
        let reaction = match lookup("FORWARD_REACTION") {
            None => Some(DEFAULT_REACTION.to_string()),
            Some(raw) => {
                let name = raw.trim().trim_matches(':').to_string();
                if name.is_empty() || name.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(name)
                }
            }
        };

        // Allow-list (opt-in)
        let allow_list = AllowList::new(
            parse_csv(get("ALLOWED_USER_IDS")).map(UserId),
            parse_csv(get("ALLOWED_GROUP_IDS")).map(GroupId),
        );

        Ok(Self {
            slack_bot_token,
            slack_app_token,
            slack_signing_secret,
            slack_api_base,
            forward_to_channel,
            callback_id,
            serializer,
            reaction,
            allow_list,
            mode,
            bind_addr,
            port,
        })
    }
}

fn parse_mode(raw: &str) -> Result<Mode> {
    match raw.trim().to_lowercase().as_str() {
        "socket" | "socket_mode" | "socket-mode" => Ok(Mode::Socket),
        "http" | "lambda" | "serverless" => Ok(Mode::Http),
        other => Err(Error::Config(format!(
            "STF_MODE must be `socket` or `http`, got `{other}`"
        ))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_csv(v: Option<String>) -> impl Iterator<Item = String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
