//! Socket Mode transport: a long-lived WebSocket that delivers envelopes.

use std::{
    sync::Once,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{tungstenite::Message as WsMsg, MaybeTlsStream, WebSocketStream};

use stf_core::{
    domain::ShortcutEvent, errors::Error, forwarder::ThreadForwarder, messaging::port::EventAck,
    Result,
};

use crate::{shortcut::parse_shortcut, SlackClient};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const HEARTBEAT_CHECK: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

/// Socket Mode envelope received over the WebSocket connection.
#[derive(Debug, Deserialize)]
struct SocketModeEnvelope {
    envelope_id: String,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug)]
enum Frame {
    Hello,
    Disconnect(String),
    Envelope(SocketModeEnvelope),
    Other(String),
}

#[derive(Debug, PartialEq)]
enum Route {
    Forward(ShortcutEvent),
    AckOnly,
}

/// Acknowledges one envelope by writing `{"envelope_id": …}` back to the socket.
pub struct SocketAck {
    envelope_id: String,
    out: mpsc::UnboundedSender<WsMsg>,
}

#[async_trait]
impl EventAck for SocketAck {
    async fn ack(self) -> Result<()> {
        let frame = serde_json::json!({ "envelope_id": self.envelope_id });
        self.out
            .send(WsMsg::Text(frame.to_string().into()))
            .map_err(|_| Error::External("socket mode connection closed before ack".to_string()))
    }
}

/// Run Socket Mode until the process is stopped, reconnecting on connection loss.
pub async fn run(forwarder: ThreadForwarder, client: SlackClient) -> anyhow::Result<()> {
    loop {
        match listen(&forwarder, &client).await {
            Ok(()) => tracing::info!("socket mode connection ended; reconnecting"),
            Err(Error::Config(msg)) => anyhow::bail!("socket mode misconfigured: {msg}"),
            Err(e) => tracing::error!(error = %e, "socket mode connection failed; reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// One connection lifetime. Returns on disconnect (caller reconnects).
async fn listen(forwarder: &ThreadForwarder, client: &SlackClient) -> Result<()> {
    let wss_url = client.open_socket_connection().await?;
    validate_wss_url(&wss_url)?;
    tracing::info!("socket mode connecting...");

    let ws_stream = connect(&wss_url).await?;
    let (mut write, mut read) = ws_stream.split();
    tracing::info!("socket mode connected");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMsg>();
    let mut timeout_check = tokio::time::interval(HEARTBEAT_CHECK);
    timeout_check.tick().await; // consume immediate tick
    let mut last_recv = Instant::now();

    loop {
        tokio::select! {
            _ = timeout_check.tick() => {
                if last_recv.elapsed() > HEARTBEAT_TIMEOUT {
                    tracing::warn!("socket mode heartbeat timeout");
                    break;
                }
            }

            Some(out) = out_rx.recv() => {
                if let Err(e) = write.send(out).await {
                    tracing::warn!(error = %e, "socket mode write failed");
                    break;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMsg::Text(text))) => {
                        last_recv = Instant::now();
                        match classify_frame(text.as_str()) {
                            Ok(Frame::Hello) => tracing::info!("socket mode hello received"),
                            Ok(Frame::Disconnect(reason)) => {
                                tracing::info!(%reason, "socket mode disconnect requested");
                                break;
                            }
                            Ok(Frame::Envelope(envelope)) => {
                                dispatch(forwarder, envelope, &out_tx);
                            }
                            Ok(Frame::Other(kind)) => tracing::debug!(%kind, "ignoring socket mode frame"),
                            Err(e) => tracing::warn!(error = %e, "unparseable socket mode frame"),
                        }
                    }
                    Some(Ok(WsMsg::Ping(d))) => {
                        last_recv = Instant::now();
                        if let Err(e) = write.send(WsMsg::Pong(d)).await {
                            tracing::warn!(error = %e, "socket mode write failed");
                            break;
                        }
                    }
                    Some(Ok(WsMsg::Close(_))) => {
                        tracing::info!("socket mode closed by server");
                        break;
                    }
                    Some(Ok(_)) => {
                        last_recv = Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "socket mode read error");
                        break;
                    }
                    None => {
                        tracing::info!("socket mode stream ended");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// rustls needs a process-level crypto provider before the first TLS handshake.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Err means another provider is already installed; either way one exists.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

async fn connect(url: &str) -> Result<WsStream> {
    install_crypto_provider();
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::External(format!("socket mode connect failed: {e}")))?;
    Ok(ws_stream)
}

/// Hand an envelope to the forwarder on its own task, or ack and drop it.
fn dispatch(
    forwarder: &ThreadForwarder,
    envelope: SocketModeEnvelope,
    out: &mpsc::UnboundedSender<WsMsg>,
) {
    let callback_id = forwarder.config().callback_id.as_str();
    let route = route_envelope(&envelope, callback_id);
    let ack = SocketAck {
        envelope_id: envelope.envelope_id,
        out: out.clone(),
    };

    match route {
        Route::Forward(event) => {
            let forwarder = forwarder.clone();
            tokio::spawn(async move {
                forwarder.handle(event, ack).await;
            });
        }
        Route::AckOnly => {
            tokio::spawn(async move {
                if let Err(e) = ack.ack().await {
                    tracing::debug!(error = %e, "failed to ack ignored envelope");
                }
            });
        }
    }
}

fn route_envelope(envelope: &SocketModeEnvelope, callback_id: &str) -> Route {
    if envelope.envelope_type != "interactive" {
        tracing::debug!(kind = %envelope.envelope_type, "ignoring envelope");
        return Route::AckOnly;
    }

    match parse_shortcut(&envelope.payload, callback_id) {
        Ok(Some(event)) => Route::Forward(event),
        Ok(None) => Route::AckOnly,
        Err(e) => {
            tracing::warn!(error = %e, "malformed shortcut payload");
            Route::AckOnly
        }
    }
}

fn classify_frame(text: &str) -> Result<Frame> {
    let raw: Value = serde_json::from_str(text)?;
    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    match kind.as_str() {
        "hello" => Ok(Frame::Hello),
        "disconnect" => Ok(Frame::Disconnect(
            raw.get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        )),
        _ if raw.get("envelope_id").is_some() => Ok(Frame::Envelope(serde_json::from_value(raw)?)),
        _ => Ok(Frame::Other(kind)),
    }
}

/// Socket Mode URLs must be wss:// on a Slack host.
fn validate_wss_url(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("wss://") else {
        return Err(Error::Payload(format!(
            "socket mode url must use wss://, got `{}`",
            url.split("://").next().unwrap_or("unknown")
        )));
    };
    let host = rest
        .split('/')
        .next()
        .and_then(|host_port| host_port.split(':').next())
        .unwrap_or("");
    if host != "slack.com" && !host.ends_with(".slack.com") {
        return Err(Error::Payload(format!(
            "socket mode url host must be *.slack.com, got `{host}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: &str, payload: Value) -> SocketModeEnvelope {
        SocketModeEnvelope {
            envelope_id: "env-1".to_string(),
            envelope_type: kind.to_string(),
            payload,
        }
    }

    fn shortcut_payload(callback_id: &str) -> Value {
        json!({
            "type": "message_action",
            "callback_id": callback_id,
            "user": {"id": "U1"},
            "channel": {"id": "CSRC"},
            "message": {"ts": "1.0", "user": "U2", "text": "hi"}
        })
    }

    #[test]
    fn classifies_control_frames() {
        assert!(matches!(
            classify_frame(r#"{"type":"hello","num_connections":1}"#).unwrap(),
            Frame::Hello
        ));
        match classify_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#).unwrap() {
            Frame::Disconnect(reason) => assert_eq!(reason, "refresh_requested"),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(classify_frame("not json").is_err());
    }

    #[test]
    fn classifies_envelopes() {
        let text = json!({
            "envelope_id": "abc-123",
            "type": "interactive",
            "payload": shortcut_payload("forward_thread"),
            "accepts_response_payload": false
        })
        .to_string();
        match classify_frame(&text).unwrap() {
            Frame::Envelope(env) => {
                assert_eq!(env.envelope_id, "abc-123");
                assert_eq!(env.envelope_type, "interactive");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn routes_matching_shortcut_to_forwarder() {
        let env = envelope("interactive", shortcut_payload("forward_thread"));
        match route_envelope(&env, "forward_thread") {
            Route::Forward(ev) => {
                assert_eq!(ev.channel.as_str(), "CSRC");
                assert_eq!(ev.user.as_str(), "U1");
            }
            Route::AckOnly => panic!("shortcut should be forwarded"),
        }
    }

    #[test]
    fn other_envelopes_are_only_acked() {
        let env = envelope("interactive", shortcut_payload("other"));
        assert_eq!(route_envelope(&env, "forward_thread"), Route::AckOnly);

        let env = envelope("events_api", json!({"event": {"type": "message"}}));
        assert_eq!(route_envelope(&env, "forward_thread"), Route::AckOnly);

        let env = envelope("interactive", json!({"type": "message_action", "callback_id": "forward_thread"}));
        assert_eq!(route_envelope(&env, "forward_thread"), Route::AckOnly);
    }

    #[tokio::test]
    async fn ack_writes_envelope_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        SocketAck {
            envelope_id: "env-42".to_string(),
            out: tx,
        }
        .ack()
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            WsMsg::Text(text) => {
                let v: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(v, json!({"envelope_id": "env-42"}));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ack_fails_when_connection_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let res = SocketAck {
            envelope_id: "env-1".to_string(),
            out: tx,
        }
        .ack()
        .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn tls_connect_failure_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            // Accept and hang up without speaking TLS.
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let res = connect(&format!("wss://localhost:{port}/link")).await;
        assert!(matches!(res, Err(Error::External(_))));

        server.abort();
    }

    #[test]
    fn wss_url_must_be_slack() {
        assert!(validate_wss_url("wss://wss-primary.slack.com/link/?ticket=abc").is_ok());
        assert!(validate_wss_url("ws://wss-primary.slack.com/link").is_err());
        assert!(validate_wss_url("wss://evil.example.com/link").is_err());
        assert!(validate_wss_url("wss://slack.com.evil.io/link").is_err());
    }
}
