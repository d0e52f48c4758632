//! Slack adapter.
//!
//! This crate implements the `stf-core` ChatPlatform over the Slack Web API and
//! delivers shortcut events to the forwarder over Socket Mode or HTTP.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

pub mod http_receiver;
pub mod router;
pub mod shortcut;
pub mod signature;
pub mod socket_mode;

use stf_core::{
    domain::{ChannelId, GroupId, Message, MessageRef, Thread, Ts, UserId},
    errors::Error,
    messaging::{port::ChatPlatform, types::ReactionOutcome},
    Result,
};

/// Upper bound on `conversations.replies` pages (200 messages each).
const MAX_REPLY_PAGES: usize = 50;
const REPLIES_PAGE_LIMIT: &str = "200";

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesResponse {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsergroupUsersResponse {
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    url: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    app_token: Option<String>,
}

impl SlackClient {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        app_token: Option<String>,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("slack-thread-forwarder"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Http(format!("failed to build slack http client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into().trim().to_string(),
            app_token: app_token.map(|t| t.trim().to_string()),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// Send a Web API request and unwrap Slack's `{ "ok": …, "error": … }` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Http(format!("slack {method} request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "slack {method} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("slack {method} json error: {e}")))?;
        parse_envelope(method, v)
    }

    /// Call `apps.connections.open` to obtain a Socket Mode WebSocket URL.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let app_token = self
            .app_token
            .as_deref()
            .ok_or_else(|| Error::Config("SLACK_APP_TOKEN is required for socket mode".into()))?;

        let resp: ConnectionsOpenResponse = self
            .call(
                "apps.connections.open",
                self.http
                    .post(self.url("apps.connections.open"))
                    .bearer_auth(app_token),
            )
            .await?;

        resp.url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Payload("apps.connections.open returned no url".to_string()))
    }

    async fn fetch_replies_page(
        &self,
        channel: &ChannelId,
        root_ts: &Ts,
        cursor: Option<&str>,
    ) -> Result<RepliesResponse> {
        let mut form = vec![
            ("channel", channel.as_str()),
            ("ts", root_ts.as_str()),
            ("limit", REPLIES_PAGE_LIMIT),
        ];
        if let Some(cursor) = cursor {
            form.push(("cursor", cursor));
        }

        self.call(
            "conversations.replies",
            self.http
                .post(self.url("conversations.replies"))
                .bearer_auth(&self.bot_token)
                .form(&form),
        )
        .await
    }
}

fn parse_envelope<T: DeserializeOwned>(method: &str, v: Value) -> Result<T> {
    if v.get("ok").and_then(Value::as_bool) != Some(true) {
        let code = v
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(Error::Api {
            method: method.to_string(),
            code,
        });
    }
    Ok(serde_json::from_value(v)?)
}

fn next_cursor(page: &RepliesResponse) -> Option<String> {
    page.response_metadata
        .as_ref()
        .and_then(|m| m.next_cursor.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Append a page of raw records, skipping any `ts` already collected (the
/// parent can be repeated across pages).
fn append_page(out: &mut Vec<Message>, seen: &mut HashSet<String>, raw: Vec<Value>) {
    for record in raw {
        let Some(msg) = Message::from_raw(record) else {
            tracing::debug!("skipping thread record without ts");
            continue;
        };
        if seen.insert(msg.ts.0.clone()) {
            out.push(msg);
        }
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn fetch_thread(&self, channel: &ChannelId, root_ts: &Ts) -> Result<Thread> {
        let mut messages = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_REPLY_PAGES {
            let page = self
                .fetch_replies_page(channel, root_ts, cursor.as_deref())
                .await?;
            cursor = next_cursor(&page);
            append_page(&mut messages, &mut seen, page.messages);
            if cursor.is_none() {
                break;
            }
        }
        if cursor.is_some() {
            tracing::warn!(%channel, %root_ts, pages = MAX_REPLY_PAGES, "thread truncated at page limit");
        }

        Ok(Thread::new(messages))
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&Ts>,
    ) -> Result<Ts> {
        let mut payload = json!({
            "channel": channel.as_str(),
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.0.clone());
        }

        let resp: PostMessageResponse = self
            .call(
                "chat.postMessage",
                self.http
                    .post(self.url("chat.postMessage"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload),
            )
            .await?;

        resp.ts
            .map(Ts)
            .ok_or_else(|| Error::Payload("chat.postMessage response missing ts".to_string()))
    }

    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<UserId>> {
        let resp: UsergroupUsersResponse = self
            .call(
                "usergroups.users.list",
                self.http
                    .post(self.url("usergroups.users.list"))
                    .bearer_auth(&self.bot_token)
                    .form(&[("usergroup", group.as_str())]),
            )
            .await
            .map_err(|e| Error::GroupLookup {
                group: group.to_string(),
                reason: e.to_string(),
            })?;

        Ok(resp.users.into_iter().map(UserId).collect())
    }

    async fn add_reaction(&self, msg: &MessageRef, name: &str) -> Result<ReactionOutcome> {
        let payload = json!({
            "channel": msg.channel.as_str(),
            "timestamp": msg.ts.as_str(),
            "name": name,
        });

        let result: Result<Value> = self
            .call(
                "reactions.add",
                self.http
                    .post(self.url("reactions.add"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload),
            )
            .await;

        match result {
            Ok(_) => Ok(ReactionOutcome::Added),
            Err(e) if e.api_code() == Some("already_reacted") => Ok(ReactionOutcome::AlreadyPresent),
            Err(e) => Err(e),
        }
    }
}
