//! HTTP transport: Slack posts signed requests to `/slack/events` and `/slack/actions`.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};

use stf_core::{errors::Error, forwarder::ThreadForwarder, messaging::port::EventAck, Result};

use crate::{
    shortcut::parse_shortcut,
    signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};

#[derive(Clone)]
struct ReceiverState {
    forwarder: ThreadForwarder,
    signing_secret: Arc<str>,
}

/// Acknowledges a shortcut by releasing the pending HTTP 200.
pub struct HttpAck {
    tx: oneshot::Sender<()>,
}

#[async_trait]
impl EventAck for HttpAck {
    async fn ack(self) -> Result<()> {
        self.tx
            .send(())
            .map_err(|_| Error::External("http request closed before ack".to_string()))
    }
}

/// Bind `addr` and serve Slack requests until ctrl-c.
pub async fn serve(
    forwarder: ThreadForwarder,
    signing_secret: &str,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    tracing::info!(%local_addr, "http receiver listening");

    axum::serve(listener, build_router(forwarder, signing_secret))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http receiver exited unexpectedly")?;
    Ok(())
}

pub fn build_router(forwarder: ThreadForwarder, signing_secret: &str) -> Router {
    let state = ReceiverState {
        forwarder,
        signing_secret: Arc::from(signing_secret),
    };
    Router::new()
        .route("/slack/events", post(handle_slack_request))
        .route("/slack/actions", post(handle_slack_request))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn handle_slack_request(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if let Err(e) = signature::verify(
        &state.signing_secret,
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
        &body,
        chrono::Utc::now().timestamp(),
    ) {
        tracing::warn!(error = %e, "rejected slack request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match classify_body(&body) {
        Ok(Inbound::SslCheck) => StatusCode::OK.into_response(),
        Ok(Inbound::UrlVerification(challenge)) => {
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        Ok(Inbound::Interaction(payload)) => handle_interaction(&state, &payload).await,
        Ok(Inbound::Other) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable slack request");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn handle_interaction(state: &ReceiverState, payload: &Value) -> Response {
    let callback_id = state.forwarder.config().callback_id.as_str();
    let event = match parse_shortcut(payload, callback_id) {
        Ok(Some(event)) => event,
        Ok(None) => return StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "malformed shortcut payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let (tx, rx) = oneshot::channel();
    let forwarder = state.forwarder.clone();
    tokio::spawn(async move {
        forwarder.handle(event, HttpAck { tx }).await;
    });

    // The handler acks before doing any work; a dropped sender still gets a 200.
    if rx.await.is_err() {
        tracing::debug!("shortcut handler finished without acknowledging");
    }
    StatusCode::OK.into_response()
}

#[derive(Debug, PartialEq)]
enum Inbound {
    SslCheck,
    UrlVerification(String),
    Interaction(Value),
    Other,
}

fn classify_body(body: &[u8]) -> Result<Inbound> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::Payload(format!("request body is not utf-8: {e}")))?;

    if text.trim_start().starts_with('{') {
        let v: Value = serde_json::from_str(text)?;
        if v.get("type").and_then(Value::as_str) == Some("url_verification") {
            let challenge = v
                .get("challenge")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Payload("url_verification without challenge".into()))?;
            return Ok(Inbound::UrlVerification(challenge.to_string()));
        }
        return Ok(Inbound::Other);
    }

    let form = parse_form(text)?;
    if form.contains_key("ssl_check") {
        return Ok(Inbound::SslCheck);
    }
    match form.get("payload") {
        Some(raw) => Ok(Inbound::Interaction(serde_json::from_str(raw)?)),
        None => Ok(Inbound::Other),
    }
}

fn parse_form(body: &str) -> Result<HashMap<String, String>> {
    let decode = |s: &str| {
        urlencoding::decode(&s.replace('+', " "))
            .map(|c| c.into_owned())
            .map_err(|e| Error::Payload(format!("invalid form encoding: {e}")))
    };

    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(String, String)> {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode(k)?, decode(v)?))
        })
        .collect()
}
