//! Receiver worker: reads the multicast socket into the packet queue.

use crate::error::{RelayError, Result};
use crate::session::SessionContext;
use crate::udp::{DatagramSource, PacketSender, RawDatagram, MAX_DATAGRAM_SIZE};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Why a receiver stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    Cancelled,
    EndOfStream,
    QueueClosed,
}

#[derive(Debug)]
pub struct ReceiverReport {
    pub rx_dgrams: u64,
    pub rx_bytes: u64,
    pub outcome: Result<ReceiverExit>,
}

/// Reads datagrams from the session's socket and feeds the packet queue.
///
/// The first read is bounded by the presence timeout, later reads are not.
/// Every exit except a clean end of stream cancels the session; on end of
/// stream the queue is closed instead so the sender can drain it.
pub struct Receiver<S: DatagramSource> {
    source: Arc<S>,
    queue: PacketSender,
    presence_timeout: Duration,
    ctx: SessionContext,
}

impl<S: DatagramSource> Receiver<S> {
    pub fn new(
        source: Arc<S>,
        queue: PacketSender,
        presence_timeout: Duration,
        ctx: SessionContext,
    ) -> Self {
        Self {
            source,
            queue,
            presence_timeout,
            ctx,
        }
    }

    pub async fn run(self) -> ReceiverReport {
        let cancel_on_exit = self.ctx.cancel.clone().drop_guard();
        let mut report = ReceiverReport {
            rx_dgrams: 0,
            rx_bytes: 0,
            outcome: Ok(ReceiverExit::Cancelled),
        };

        let outcome = self.receive(&mut report.rx_dgrams, &mut report.rx_bytes).await;
        report.outcome = outcome;
        match &report.outcome {
            Ok(ReceiverExit::EndOfStream) => {
                info!("{} source reached end of stream", self.ctx.tag);
                cancel_on_exit.disarm();
            }
            Ok(exit) => debug!("{} receiver stopped: {:?}", self.ctx.tag, exit),
            Err(e) => warn!("{} receiver failed: {}", self.ctx.tag, e),
        }
        report
    }

    async fn receive(&self, rx_dgrams: &mut u64, rx_bytes: &mut u64) -> Result<ReceiverExit> {
        let cancel = &self.ctx.cancel;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let first = tokio::select! {
            _ = cancel.cancelled() => return Ok(ReceiverExit::Cancelled),
            r = time::timeout(self.presence_timeout, self.source.recv(&mut buf)) => r,
        };
        let mut len = match first {
            Err(_) => return Err(RelayError::PresenceTimeout(self.presence_timeout)),
            Ok(Err(e)) => return Err(RelayError::Receive(e)),
            Ok(Ok(len)) => len,
        };
        info!("{} got first datagram, {} bytes", self.ctx.tag, len);

        loop {
            *rx_dgrams += 1;
            *rx_bytes += len as u64;

            let datagram = RawDatagram::copy_from(&buf[..len]);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(ReceiverExit::Cancelled),
                r = self.queue.send(datagram) => {
                    if r.is_err() {
                        return Ok(ReceiverExit::QueueClosed);
                    }
                }
            }

            len = tokio::select! {
                _ = cancel.cancelled() => return Ok(ReceiverExit::Cancelled),
                r = self.source.recv(&mut buf) => match r {
                    Ok(len) => len,
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        return Ok(ReceiverExit::EndOfStream);
                    }
                    Err(e) => return Err(RelayError::Receive(e)),
                },
            };
        }
    }
}
