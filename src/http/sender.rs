//! Sender worker: turns queued datagrams into the HTTP response body.

use crate::error::{RelayError, Result};
use crate::http::ResponseSink;
use crate::rtp::{self, ContentClassification};
use crate::session::SessionContext;
use crate::udp::PacketReceiver;
use log::{debug, info, warn};
use std::io::ErrorKind;

/// Why a sender stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    Cancelled,
    /// The receiver closed the queue and everything queued was sent.
    Drained,
}

#[derive(Debug)]
pub struct SenderReport {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub content: Option<ContentClassification>,
    pub outcome: Result<SenderExit>,
}

/// Drains the packet queue into the response sink.
///
/// The content type is decided from the first frame and never revisited.
/// A client hangup is noticed while the queue is idle, not only on the next
/// write. Any exit cancels the session.
pub struct Sender<K: ResponseSink> {
    queue: PacketReceiver,
    sink: K,
    ctx: SessionContext,
}

impl<K: ResponseSink> Sender<K> {
    pub fn new(queue: PacketReceiver, sink: K, ctx: SessionContext) -> Self {
        Self { queue, sink, ctx }
    }

    pub async fn run(mut self) -> SenderReport {
        let _cancel_on_exit = self.ctx.cancel.clone().drop_guard();
        let mut report = SenderReport {
            tx_frames: 0,
            tx_bytes: 0,
            content: None,
            outcome: Ok(SenderExit::Cancelled),
        };

        let outcome = self.send(&mut report).await;
        report.outcome = outcome;
        match &report.outcome {
            Ok(exit) => debug!("{} sender stopped: {:?}", self.ctx.tag, exit),
            Err(e) if e.is_client_gone() => info!("{} client went away", self.ctx.tag),
            Err(e) => warn!("{} sender failed: {}", self.ctx.tag, e),
        }
        report
    }

    async fn send(&mut self, report: &mut SenderReport) -> Result<SenderExit> {
        let cancel = self.ctx.cancel.clone();
        loop {
            let datagram = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SenderExit::Cancelled),
                _ = self.sink.closed() => {
                    return Err(RelayError::Write(ErrorKind::BrokenPipe.into()));
                }
                datagram = self.queue.recv() => match datagram {
                    Some(datagram) => datagram,
                    None => return Ok(SenderExit::Drained),
                },
            };

            let frame = rtp::decode(&datagram.payload)?;

            if report.content.is_none() {
                let content = ContentClassification::from_payload_type(frame.payload_type);
                self.sink.start(content).await.map_err(RelayError::Write)?;
                info!(
                    "{} streaming as {} (payload type {})",
                    self.ctx.tag,
                    content.mime(),
                    frame.payload_type
                );
                report.content = Some(content);
            }

            let expected = frame.payload.len();
            if expected > 0 {
                let written = tokio::select! {
                    _ = cancel.cancelled() => return Ok(SenderExit::Cancelled),
                    r = self.sink.write(frame.payload) => r.map_err(RelayError::Write)?,
                };
                if written < expected {
                    return Err(RelayError::ShortWrite { written, expected });
                }
            }

            report.tx_frames += 1;
            report.tx_bytes += expected as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udp::{packet_queue, PacketSender, RawDatagram};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorded {
        content: Option<ContentClassification>,
        body: Vec<u8>,
    }

    struct RecordingSink {
        recorded: Arc<Mutex<Recorded>>,
        /// Accept at most this many bytes per write.
        limit: usize,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn start(&mut self, content: ContentClassification) -> io::Result<()> {
            self.recorded.lock().unwrap().content = Some(content);
            Ok(())
        }

        async fn write(&mut self, payload: Bytes) -> io::Result<usize> {
            let n = payload.len().min(self.limit);
            self.recorded.lock().unwrap().body.extend_from_slice(&payload[..n]);
            Ok(n)
        }
    }

    fn rtp(pt: u8, payload: &[u8]) -> RawDatagram {
        let mut data = vec![0x80, pt, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        data.extend_from_slice(payload);
        RawDatagram::copy_from(&data)
    }

    fn sender(
        limit: usize,
    ) -> (
        PacketSender,
        Sender<RecordingSink>,
        Arc<Mutex<Recorded>>,
        CancellationToken,
    ) {
        let (tx, rx) = packet_queue(8);
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let sink = RecordingSink {
            recorded: recorded.clone(),
            limit,
        };
        let cancel = CancellationToken::new();
        let ctx = SessionContext::new("test".into(), cancel.clone());
        (tx, Sender::new(rx, sink, ctx), recorded, cancel)
    }

    #[tokio::test]
    async fn test_payloads_written_in_order_with_first_content_type() {
        let (tx, sender, recorded, cancel) = sender(usize::MAX);
        tx.send(rtp(96, b"ab")).await.unwrap();
        tx.send(rtp(33, b"cd")).await.unwrap();
        tx.send(rtp(33, b"")).await.unwrap();
        drop(tx);

        let report = sender.run().await;
        assert_eq!(report.outcome.unwrap(), SenderExit::Drained);
        assert_eq!(report.tx_frames, 3);
        assert_eq!(report.tx_bytes, 4);
        assert_eq!(report.content, Some(ContentClassification::Binary));
        assert!(cancel.is_cancelled());

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.content, Some(ContentClassification::Binary));
        assert_eq!(recorded.body, b"abcd");
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal() {
        let (tx, sender, recorded, cancel) = sender(usize::MAX);
        tx.send(rtp(33, b"ok")).await.unwrap();
        tx.send(RawDatagram::copy_from(&[0x80, 33, 0])).await.unwrap();
        tx.send(rtp(33, b"never")).await.unwrap();

        let report = sender.run().await;
        assert!(matches!(report.outcome, Err(RelayError::Decode(_))));
        assert!(cancel.is_cancelled());
        assert_eq!(recorded.lock().unwrap().body, b"ok");
    }

    #[tokio::test]
    async fn test_short_write_is_fatal() {
        let (tx, sender, _recorded, _cancel) = sender(3);
        tx.send(rtp(33, b"0123456789")).await.unwrap();

        let report = sender.run().await;
        assert!(matches!(
            report.outcome,
            Err(RelayError::ShortWrite {
                written: 3,
                expected: 10
            })
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_without_draining() {
        let (tx, sender, recorded, cancel) = sender(usize::MAX);
        tx.send(rtp(33, b"queued")).await.unwrap();
        cancel.cancel();

        let report = sender.run().await;
        assert_eq!(report.outcome.unwrap(), SenderExit::Cancelled);
        assert!(recorded.lock().unwrap().content.is_none());
    }
}
