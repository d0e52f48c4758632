use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GroupId, MessageRef, Thread, Ts, UserId},
    messaging::types::ReactionOutcome,
    Result,
};

/// Outbound chat platform port.
///
/// Slack is the only implementation; the forwarder and the authorization gate
/// depend on this trait so they can be exercised with in-memory fakes.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Root message plus replies, oldest first.
    async fn fetch_thread(&self, channel: &ChannelId, root_ts: &Ts) -> Result<Thread>;

    /// Post `text` to `channel`, optionally as a reply under `thread_ts`.
    /// Returns the timestamp assigned to the new message.
    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&Ts>,
    ) -> Result<Ts>;

    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<UserId>>;

    async fn add_reaction(&self, msg: &MessageRef, name: &str) -> Result<ReactionOutcome>;
}

/// Per-event acknowledgment handle.
///
/// Consumed on use so each inbound event is acknowledged at most once.
#[async_trait]
pub trait EventAck: Send {
    async fn ack(self) -> Result<()>;
}
