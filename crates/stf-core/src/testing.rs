//! In-memory `ChatPlatform` used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GroupId, Message, MessageRef, Thread, Ts, UserId},
    errors::Error,
    messaging::{
        port::{ChatPlatform, EventAck},
        types::ReactionOutcome,
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub channel: String,
    pub text: String,
    pub thread_ts: Option<String>,
    pub assigned_ts: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub enum ReactionBehavior {
    #[default]
    Add,
    AlreadyReacted,
    Fail,
}

#[derive(Default)]
pub struct FakePlatform {
    threads: HashMap<(String, String), Vec<serde_json::Value>>,
    groups: HashMap<String, Vec<String>>,
    failing_groups: HashSet<String>,
    fail_post_at: Option<usize>,
    reaction: ReactionBehavior,

    calls: Mutex<Vec<String>>,
    posts: Mutex<Vec<Post>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePlatform {
    pub fn with_thread(mut self, channel: &str, ts: &str, raw: Vec<serde_json::Value>) -> Self {
        self.threads
            .insert((channel.to_string(), ts.to_string()), raw);
        self
    }

    pub fn with_group(mut self, group: &str, members: &[&str]) -> Self {
        self.groups.insert(
            group.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_failing_group(mut self, group: &str) -> Self {
        self.failing_groups.insert(group.to_string());
        self
    }

    /// Fail the post at zero-based `position` (0 is the new root).
    pub fn failing_post_at(mut self, position: usize) -> Self {
        self.fail_post_at = Some(position);
        self
    }

    pub fn with_reaction(mut self, behavior: ReactionBehavior) -> Self {
        self.reaction = behavior;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_thread(&self, channel: &ChannelId, root_ts: &Ts) -> Result<Thread> {
        self.record(format!("fetch_thread {channel} {root_ts}"));
        let raw = self
            .threads
            .get(&(channel.0.clone(), root_ts.0.clone()))
            .ok_or_else(|| Error::Api {
                method: "conversations.replies".to_string(),
                code: "thread_not_found".to_string(),
            })?;
        Ok(Thread::new(
            raw.iter().cloned().filter_map(Message::from_raw).collect(),
        ))
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&Ts>,
    ) -> Result<Ts> {
        let position = self.posts.lock().unwrap().len();
        self.record(format!(
            "post_message {channel} thread={}",
            thread_ts.map(|t| t.as_str()).unwrap_or("-")
        ));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_post_at == Some(position) {
            return Err(Error::Api {
                method: "chat.postMessage".to_string(),
                code: "msg_too_long".to_string(),
            });
        }

        let assigned_ts = format!("9000.{:06}", position + 1);
        self.posts.lock().unwrap().push(Post {
            channel: channel.0.clone(),
            text: text.to_string(),
            thread_ts: thread_ts.map(|t| t.0.clone()),
            assigned_ts: assigned_ts.clone(),
        });
        Ok(Ts(assigned_ts))
    }

    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<UserId>> {
        self.record(format!("list_group_members {group}"));
        if self.failing_groups.contains(group.as_str()) {
            return Err(Error::Api {
                method: "usergroups.users.list".to_string(),
                code: "no_such_subteam".to_string(),
            });
        }
        Ok(self
            .groups
            .get(group.as_str())
            .map(|m| m.iter().map(|id| UserId::from(id.as_str())).collect())
            .unwrap_or_default())
    }

    async fn add_reaction(&self, msg: &MessageRef, name: &str) -> Result<ReactionOutcome> {
        self.record(format!("add_reaction {} {} {name}", msg.channel, msg.ts));
        match self.reaction {
            ReactionBehavior::Add => Ok(ReactionOutcome::Added),
            ReactionBehavior::AlreadyReacted => Ok(ReactionOutcome::AlreadyPresent),
            ReactionBehavior::Fail => Err(Error::Api {
                method: "reactions.add".to_string(),
                code: "missing_scope".to_string(),
            }),
        }
    }
}

/// Acknowledger that records into the platform's call log.
pub struct RecordingAck<'a> {
    platform: &'a FakePlatform,
    fail: bool,
}

impl FakePlatform {
    pub fn ack(&self) -> RecordingAck<'_> {
        RecordingAck {
            platform: self,
            fail: false,
        }
    }

    pub fn failing_ack(&self) -> RecordingAck<'_> {
        RecordingAck {
            platform: self,
            fail: true,
        }
    }
}

#[async_trait]
impl EventAck for RecordingAck<'_> {
    async fn ack(self) -> Result<()> {
        self.platform.record("ack".to_string());
        if self.fail {
            return Err(Error::External("ack transport closed".to_string()));
        }
        Ok(())
    }
}
