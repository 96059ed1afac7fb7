//! Axum adapter exposing relay sessions as `GET /rtp/:udp_addr`.
//!
//! The handler carries no relay logic: it creates a [`RelaySession`], runs it
//! on its own task with a [`ChannelSink`](crate::http::ChannelSink), and turns
//! whatever happens first into the response:
//!
//! | Event | Response |
//! |-------|----------|
//! | prologue sent by the session | `200`, content type of the first frame, chunked body |
//! | session ended before that | `500`, error text |

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::{response_channel, ResponseChannel};
use crate::session::{RelayContext, RelaySession, SessionSummary};
use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use log::{error, info};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_stream::wrappers::ReceiverStream;

/// Payload chunks buffered between a session and its HTTP body.
const BODY_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
struct ServerState {
    config: Arc<RelayConfig>,
    relay: RelayContext,
}

pub struct RelayServer {
    bind_addr: SocketAddr,
    state: ServerState,
}

impl RelayServer {
    pub fn new(bind_addr: SocketAddr, config: RelayConfig, relay: RelayContext) -> Self {
        Self {
            bind_addr,
            state: ServerState {
                config: Arc::new(config),
                relay,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/rtp/:udp_addr", get(relay_handler))
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown token of the relay context is cancelled.
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.bind_addr))?;
        info!("starting server on {}", self.bind_addr);

        let shutdown = self.state.relay.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("server terminated unexpectedly")?;

        info!("server stopped");
        Ok(())
    }
}

async fn relay_handler(
    Path(udp_addr): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    let session = match RelaySession::new(&state.config, &udp_addr, &state.relay) {
        Ok(session) => session,
        Err(e) => return failure(e.to_string()),
    };

    let (sink, ResponseChannel { prologue, body }) = response_channel(BODY_CHANNEL_CAPACITY);
    let task = tokio::spawn(session.run(sink));

    match prologue.await {
        Ok(content) => {
            let stream = ReceiverStream::new(body).map(Ok::<_, Infallible>);
            (
                [(header::CONTENT_TYPE, content.mime())],
                Body::from_stream(stream),
            )
                .into_response()
        }
        // the sink is gone without a prologue, so the session has ended
        Err(_) => failure(pre_stream_error(task.await)),
    }
}

fn pre_stream_error(result: Result<Result<SessionSummary, RelayError>, JoinError>) -> String {
    match result {
        Ok(Err(e)) => e.to_string(),
        Ok(Ok(summary)) => format!("stream ended before any data ({:?})", summary.end),
        Err(e) => {
            error!("relay session task failed: {}", e);
            e.to_string()
        }
    }
}

fn failure(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}
