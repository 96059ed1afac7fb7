//! One relay session per HTTP request.
//!
//! A session goes `Idle -> Joining -> Streaming -> Closed`:
//!
//! 1. [`RelaySession::new`] parses the multicast target and resolves the
//!    configured interface.
//! 2. [`RelaySession::join`] opens the multicast socket.
//! 3. [`RelaySession::stream`] starts the receiver and the sender on their own
//!    tasks, waits until one of them cancels the session, then releases the
//!    socket.
//!
//! Sessions never share sockets, queues or tokens with each other.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::http::sender::{Sender, SenderExit, SenderReport};
use crate::http::ResponseSink;
use crate::relay_info_bridge::{RelayInfoBridge, SessionState, SessionTraffic};
use crate::rtp::ContentClassification;
use crate::udp::multicast::{join_multicast, parse_target, resolve_interface};
use crate::udp::receiver::{Receiver, ReceiverExit, ReceiverReport};
use crate::udp::{packet_queue, DatagramSource};
use chrono::{DateTime, Local};
use enum_as_inner::EnumAsInner;
use log::{debug, error, info, warn};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Process-wide dependencies handed to every session.
#[derive(Clone, Default)]
pub struct RelayContext {
    pub bridge: RelayInfoBridge,
    /// Cancelled when the process is asked to stop.
    pub shutdown: CancellationToken,
    next_session_id: Arc<AtomicU64>,
}

impl RelayContext {
    pub fn new(bridge: RelayInfoBridge, shutdown: CancellationToken) -> Self {
        Self {
            bridge,
            shutdown,
            next_session_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn session_tag(&self, target: &str) -> Arc<str> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("[{}#{}]", target, id).into()
    }
}

/// What the workers of one session share: a log tag and the one-shot
/// cancellation signal.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub tag: Arc<str>,
    pub cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(tag: Arc<str>, cancel: CancellationToken) -> Self {
        Self { tag, cancel }
    }
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumAsInner)]
pub enum SessionEnd {
    ClientDisconnected,
    SourceEnded,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub end: SessionEnd,
    pub traffic: SessionTraffic,
    pub content: Option<ContentClassification>,
    pub started_at: DateTime<Local>,
}

pub struct RelaySession {
    target: SocketAddrV4,
    interface: Ipv4Addr,
    presence_timeout: Duration,
    queue_capacity: usize,
    ctx: SessionContext,
    bridge: RelayInfoBridge,
    state: SessionState,
    started_at: DateTime<Local>,
}

impl RelaySession {
    /// Resolve the target and the interface of a new session.
    ///
    /// The session token is a child of the process shutdown token.
    pub fn new(config: &RelayConfig, target: &str, relay: &RelayContext) -> Result<Self> {
        let tag = relay.session_tag(target);
        info!("{} got request", tag);
        relay.bridge.post_state(&tag, SessionState::Idle);

        let resolved = parse_target(target)
            .and_then(|group| Ok((group, resolve_interface(&config.interface)?)));
        let (group, interface) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("{} {}", tag, e);
                relay.bridge.post_state(&tag, SessionState::Closed);
                return Err(e);
            }
        };

        let mut session = Self {
            target: group,
            interface,
            presence_timeout: config.presence_timeout,
            queue_capacity: config.queue_capacity,
            ctx: SessionContext::new(tag, relay.shutdown.child_token()),
            bridge: relay.bridge.clone(),
            state: SessionState::Idle,
            started_at: Local::now(),
        };
        session.transition(SessionState::Joining);
        Ok(session)
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    pub fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tag(&self) -> &str {
        &self.ctx.tag
    }

    /// Signal that ends this session; cancelling it stops both workers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Open the multicast socket. A failure closes the session.
    pub fn join(&mut self) -> Result<UdpSocket> {
        match join_multicast(self.target, self.interface) {
            Ok(socket) => {
                info!(
                    "{} joined {} on {}",
                    self.ctx.tag, self.target, self.interface
                );
                Ok(socket)
            }
            Err(e) => {
                error!("{} {}", self.ctx.tag, e);
                self.transition(SessionState::Closed);
                Err(e)
            }
        }
    }

    /// Join the group and relay it into `sink` until the session ends.
    pub async fn run<K: ResponseSink>(mut self, sink: K) -> Result<SessionSummary> {
        let socket = self.join()?;
        self.stream(socket, sink).await
    }

    /// Relay datagrams from `source` into `sink` until either worker stops.
    ///
    /// `source` is dropped exactly once, after both workers have returned.
    pub async fn stream<S, K>(mut self, source: S, sink: K) -> Result<SessionSummary>
    where
        S: DatagramSource,
        K: ResponseSink,
    {
        // abandoning this future must still stop the workers
        let _cancel_on_drop = self.ctx.cancel.clone().drop_guard();
        let source = Arc::new(source);
        let (queue_tx, queue_rx) = packet_queue(self.queue_capacity);
        let receiver = Receiver::new(
            source.clone(),
            queue_tx,
            self.presence_timeout,
            self.ctx.clone(),
        );
        let sender = Sender::new(queue_rx, sink, self.ctx.clone());

        self.transition(SessionState::Streaming);
        let receiver = tokio::spawn(receiver.run());
        let sender = tokio::spawn(sender.run());

        self.ctx.cancel.cancelled().await;
        let receiver = receiver.await;
        let sender = sender.await;

        drop(source);
        debug!("{} socket released", self.ctx.tag);

        let result = self.conclude(receiver, sender);
        self.transition(SessionState::Closed);
        result
    }

    fn conclude(
        &self,
        receiver: std::result::Result<ReceiverReport, JoinError>,
        sender: std::result::Result<SenderReport, JoinError>,
    ) -> Result<SessionSummary> {
        let mut traffic = SessionTraffic::default();
        let mut content = None;

        let receiver = match receiver {
            Ok(report) => {
                traffic.rx_dgrams = report.rx_dgrams;
                traffic.rx_bytes = report.rx_bytes;
                report.outcome
            }
            Err(e) => Err(RelayError::Worker(e.to_string())),
        };
        let sender = match sender {
            Ok(report) => {
                traffic.tx_frames = report.tx_frames;
                traffic.tx_bytes = report.tx_bytes;
                content = report.content;
                report.outcome
            }
            Err(e) => Err(RelayError::Worker(e.to_string())),
        };

        self.bridge.post_traffic(&self.ctx.tag, &traffic);
        info!(
            "{} closed, received {} datagrams ({} bytes), sent {} bytes",
            self.ctx.tag, traffic.rx_dgrams, traffic.rx_bytes, traffic.tx_bytes
        );

        let end = match (receiver, sender) {
            (Err(e), _) => return Err(e),
            (_, Err(e)) if e.is_client_gone() => SessionEnd::ClientDisconnected,
            (_, Err(e)) => return Err(e),
            (Ok(ReceiverExit::EndOfStream), Ok(SenderExit::Drained)) => SessionEnd::SourceEnded,
            _ => SessionEnd::Cancelled,
        };

        Ok(SessionSummary {
            end,
            traffic,
            content,
            started_at: self.started_at,
        })
    }

    fn transition(&mut self, state: SessionState) {
        debug!("{} {:?} -> {:?}", self.ctx.tag, self.state, state);
        self.state = state;
        self.bridge.post_state(&self.ctx.tag, state);
    }
}
