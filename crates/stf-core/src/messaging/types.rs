use crate::domain::Ts;

/// Result of adding a reaction to a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionOutcome {
    Added,
    /// The bot had already left this reaction on the message.
    AlreadyPresent,
}

/// Terminal state of one shortcut invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Source channel is the forward target; nothing was done.
    SameChannel,
    /// Allow-list is configured and the triggering user is not on it.
    Unauthorized,
    /// The fetched thread had no messages; nothing was posted.
    EmptyThread,
    /// Thread replicated into the destination channel.
    Forwarded {
        /// Timestamp of the new root message in the destination channel.
        root_ts: Ts,
        posted: usize,
    },
    /// Processing failed; the error was logged at the handler boundary.
    Failed,
}
