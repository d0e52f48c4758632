use std::{net::SocketAddr, sync::Arc};

use stf_core::{
    config::{Config, Mode},
    forwarder::ThreadForwarder,
    messaging::port::ChatPlatform,
};

use crate::{http_receiver, socket_mode, SlackClient};

/// Wire the Slack client into a forwarder and run the configured transport.
pub async fn run(cfg: Arc<Config>, client: SlackClient) -> anyhow::Result<()> {
    let platform: Arc<dyn ChatPlatform> = Arc::new(client.clone());
    let forwarder = ThreadForwarder::new(cfg.clone(), platform);

    // Basic startup info (no secrets).
    tracing::info!(
        mode = ?cfg.mode,
        destination = %cfg.forward_to_channel,
        callback_id = %cfg.callback_id,
        format = cfg.serializer.name(),
        reaction = cfg.reaction.as_deref().unwrap_or("none"),
        "stf started"
    );
    if cfg.allow_list.is_configured() {
        tracing::info!(
            users = cfg.allow_list.user_count(),
            groups = cfg.allow_list.groups().len(),
            "allow list enabled"
        );
    } else {
        tracing::info!("allow list empty; every user may forward");
    }

    match cfg.mode {
        Mode::Socket => socket_mode::run(forwarder, client).await,
        Mode::Http => {
            let Some(secret) = cfg.slack_signing_secret.as_deref() else {
                anyhow::bail!("SLACK_SIGNING_SECRET is required for http mode");
            };
            let addr = SocketAddr::new(cfg.bind_addr, cfg.port);
            http_receiver::serve(forwarder, secret, addr).await
        }
    }
}
