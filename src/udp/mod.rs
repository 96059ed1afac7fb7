//! UDP side of a relay session: the multicast socket, the receiver task and
//! the packet queue it feeds.

pub mod multicast;
pub mod receiver;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Large enough for any UDP payload, so reads never truncate.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// One datagram as read from the socket.
///
/// Owns a copy of the bytes; the receive buffer is reused for the next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDatagram {
    pub payload: Bytes,
}

impl RawDatagram {
    pub fn copy_from(buf: &[u8]) -> Self {
        Self {
            payload: Bytes::copy_from_slice(buf),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Producer half of the packet queue.
pub type PacketSender = Sender<RawDatagram>;
/// Consumer half of the packet queue.
pub type PacketReceiver = Receiver<RawDatagram>;

/// Bounded FIFO between the receiver and the sender of one session.
pub fn packet_queue(capacity: usize) -> (PacketSender, PacketReceiver) {
    mpsc::channel(capacity)
}

/// Anything a receiver can read datagrams from.
///
/// A read failing with `UnexpectedEof` is a clean end of stream.
#[async_trait]
pub trait DatagramSource: Send + Sync + 'static {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }
}
