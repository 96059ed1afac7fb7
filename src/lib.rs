//! Relays one RTP multicast stream per HTTP request.
//!
//! A request for `/rtp/<group>:<port>` joins the multicast group on the
//! configured interface, waits a bounded time for the first datagram, then
//! forwards every RTP payload to the client as a chunked body. Each request
//! runs its own [`RelaySession`]: a receiver task reading the socket and a
//! sender task writing the response, linked by a bounded packet queue and a
//! one-shot cancellation token.

pub mod config;
pub mod error;
pub mod http;
pub mod relay_info_bridge;
pub mod rtp;
pub mod session;
pub mod udp;

pub use config::{parse_duration, ConfigError, RelayConfig};
pub use error::RelayError;
pub use http::server::RelayServer;
pub use http::{response_channel, ChannelSink, ResponseChannel, ResponseSink};
pub use relay_info_bridge::{RelayInfoBridge, SessionState, SessionTraffic};
pub use rtp::{decode, ContentClassification, DecodeError, DecodedFrame};
pub use session::{RelayContext, RelaySession, SessionEnd, SessionSummary};
pub use udp::{DatagramSource, RawDatagram};
