//! Shortcut handling and ordered thread replication.

use std::sync::Arc;

use crate::{
    config::Config,
    domain::{ChannelId, ShortcutEvent, Thread},
    errors::Error,
    formatting::MessageSerializer,
    messaging::{
        port::{ChatPlatform, EventAck},
        types::{ForwardOutcome, ReactionOutcome},
    },
    Result,
};

/// Entry point for "forward this thread" shortcuts.
///
/// Holds only read-only state, so one instance is shared by every in-flight
/// event.
#[derive(Clone)]
pub struct ThreadForwarder {
    cfg: Arc<Config>,
    platform: Arc<dyn ChatPlatform>,
}

impl ThreadForwarder {
    pub fn new(cfg: Arc<Config>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { cfg, platform }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Handle one shortcut invocation end to end.
    ///
    /// The event is acknowledged before anything else. Failures are logged
    /// here and reported as [`ForwardOutcome::Failed`]; nothing propagates to
    /// the transport.
    pub async fn handle<A: EventAck>(&self, event: ShortcutEvent, ack: A) -> ForwardOutcome {
        if let Err(e) = ack.ack().await {
            tracing::warn!(error = %e, callback_id = %event.callback_id, "failed to acknowledge shortcut");
        }

        let author = event.message_author.as_ref().map_or("-", |u| u.as_str());
        match self.forward(&event).await {
            Ok(outcome) => {
                tracing::info!(
                    channel = %event.channel,
                    ts = %event.message_ts,
                    user = %event.user,
                    author,
                    ?outcome,
                    "shortcut handled"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(
                    channel = %event.channel,
                    ts = %event.message_ts,
                    user = %event.user,
                    author,
                    error = %e,
                    "error forwarding thread"
                );
                ForwardOutcome::Failed
            }
        }
    }

    async fn forward(&self, event: &ShortcutEvent) -> Result<ForwardOutcome> {
        let destination = &self.cfg.forward_to_channel;

        if &event.channel == destination {
            tracing::error!(channel = %event.channel, "attempting to forward message to the same channel");
            return Ok(ForwardOutcome::SameChannel);
        }

        let allow_list = &self.cfg.allow_list;
        if allow_list.is_configured() && !allow_list.permits(&event.user, self.platform.as_ref()).await
        {
            tracing::warn!(user = %event.user, "user is not authorized to forward messages");
            return Ok(ForwardOutcome::Unauthorized);
        }

        let thread = self
            .platform
            .fetch_thread(&event.channel, &event.message_ts)
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let outcome =
            replicate_thread(self.platform.as_ref(), destination, &thread, self.cfg.serializer)
                .await?;

        if matches!(outcome, ForwardOutcome::Forwarded { .. }) {
            self.mark_source(event).await;
        }

        Ok(outcome)
    }

    /// Best-effort acknowledgment reaction on the source message.
    async fn mark_source(&self, event: &ShortcutEvent) {
        let Some(name) = self.cfg.reaction.as_deref() else {
            return;
        };

        match self.platform.add_reaction(&event.source(), name).await {
            Ok(ReactionOutcome::Added) => {
                tracing::debug!(channel = %event.channel, ts = %event.message_ts, name, "marked source message");
            }
            Ok(ReactionOutcome::AlreadyPresent) => {
                tracing::debug!(channel = %event.channel, ts = %event.message_ts, name, "source message already marked");
            }
            Err(e) => {
                let e = Error::Reaction(e.to_string());
                tracing::warn!(channel = %event.channel, ts = %event.message_ts, error = %e, "could not mark source message");
            }
        }
    }
}

/// Re-post `thread` into `destination` as a new thread, oldest first.
///
/// Posts are issued one at a time; each reply is sent only after the previous
/// post returned. A failed post stops replication and leaves earlier posts in
/// place.
pub async fn replicate_thread(
    platform: &dyn ChatPlatform,
    destination: &ChannelId,
    thread: &Thread,
    serializer: MessageSerializer,
) -> Result<ForwardOutcome> {
    let Some(root) = thread.root() else {
        tracing::error!(%destination, "no messages in thread");
        return Ok(ForwardOutcome::EmptyThread);
    };

    let root_ts = platform
        .post_message(destination, &serializer.render(root), None)
        .await
        .map_err(|e| Error::Post {
            position: 0,
            reason: e.to_string(),
        })?;

    for (idx, reply) in thread.replies().iter().enumerate() {
        platform
            .post_message(destination, &serializer.render(reply), Some(&root_ts))
            .await
            .map_err(|e| Error::Post {
                position: idx + 1,
                reason: e.to_string(),
            })?;
    }

    Ok(ForwardOutcome::Forwarded {
        root_ts,
        posted: thread.len(),
    })
}
