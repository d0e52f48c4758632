use std::sync::Arc;

use stf_core::config::Config;
use stf_slack::SlackClient;

#[tokio::main]
async fn main() -> Result<(), stf_core::Error> {
    stf_core::logging::init("stf")?;

    let cfg = Arc::new(Config::load()?);

    let client = SlackClient::new(
        cfg.slack_api_base.clone(),
        cfg.slack_bot_token.clone(),
        cfg.slack_app_token.clone(),
    )?;

    stf_slack::router::run(cfg, client)
        .await
        .map_err(|e| stf_core::Error::External(format!("slack forwarder failed: {e}")))?;

    Ok(())
}
