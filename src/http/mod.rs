//! HTTP side of a relay session.
//!
//! This module provides the [`ResponseSink`] abstraction the sender task
//! writes to, so that a session does not depend on a particular HTTP
//! framework. [`ChannelSink`] is the sink used by the axum adapter in
//! [`server`]; tests plug in their own sinks.

pub mod sender;
pub mod server;

use crate::rtp::ContentClassification;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, ErrorKind};
use tokio::sync::{mpsc, oneshot};

/// Destination of a session's response.
#[async_trait]
pub trait ResponseSink: Send + 'static {
    /// Send the status line and headers. Called once, before any write.
    async fn start(&mut self, content: ContentClassification) -> io::Result<()>;

    /// Write payload bytes, returning how many were accepted.
    async fn write(&mut self, payload: Bytes) -> io::Result<usize>;

    /// Resolves once the client is known to be gone.
    ///
    /// Sinks that cannot tell never resolve and only report a hangup from
    /// [`write`](ResponseSink::write).
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Sink that hands the prologue and body chunks to an HTTP handler.
pub struct ChannelSink {
    prologue: Option<oneshot::Sender<ContentClassification>>,
    body: mpsc::Sender<Bytes>,
}

/// Handler-side ends of a [`ChannelSink`].
pub struct ResponseChannel {
    pub prologue: oneshot::Receiver<ContentClassification>,
    pub body: mpsc::Receiver<Bytes>,
}

pub fn response_channel(capacity: usize) -> (ChannelSink, ResponseChannel) {
    let (prologue_tx, prologue_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity);
    (
        ChannelSink {
            prologue: Some(prologue_tx),
            body: body_tx,
        },
        ResponseChannel {
            prologue: prologue_rx,
            body: body_rx,
        },
    )
}

fn client_gone() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "client disconnected")
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn start(&mut self, content: ContentClassification) -> io::Result<()> {
        let prologue = self
            .prologue
            .take()
            .ok_or_else(|| io::Error::other("response already started"))?;
        prologue.send(content).map_err(|_| client_gone())
    }

    async fn write(&mut self, payload: Bytes) -> io::Result<usize> {
        let len = payload.len();
        self.body.send(payload).await.map_err(|_| client_gone())?;
        Ok(len)
    }

    async fn closed(&mut self) {
        self.body.closed().await
    }
}
