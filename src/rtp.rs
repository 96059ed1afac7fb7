//! RTP framing.
//!
//! Parses one UDP datagram as one RFC 3550 RTP packet and strips the framing
//! so only the media payload is forwarded to the HTTP client.

use bytes::Bytes;
use thiserror::Error;

/// Length of the fixed RTP header.
pub const RTP_HEADER_LEN: usize = 12;
/// Payload type conventionally used for MPEG-2 transport streams.
pub const RTP_PAYLOAD_MP2T: u8 = 33;

/// Media type announced for MPEG-2 transport streams.
pub const CONTENT_TYPE_MP2T: &str = "video/MP2T";
/// Media type announced for everything else.
pub const CONTENT_TYPE_DEFAULT: &str = "application/octet-stream";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram of {0} bytes is shorter than the RTP header")]
    TooShort(usize),
    #[error("RTP header of {header_len} bytes exceeds datagram of {len} bytes")]
    Truncated { header_len: usize, len: usize },
    #[error("RTP padding of {padding} bytes exceeds payload of {available} bytes")]
    BadPadding { padding: usize, available: usize },
}

/// Fixed part of an RTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    /// Payload type (0-127)
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < RTP_HEADER_LEN {
            return Err(DecodeError::TooShort(data.len()));
        }

        Ok(RtpHeader {
            version: data[0] >> 6,
            padding: data[0] & 0x20 != 0,
            extension: data[0] & 0x10 != 0,
            csrc_count: data[0] & 0x0F,
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }

    /// Header size including the CSRC list, without any extension.
    pub fn header_size(&self) -> usize {
        RTP_HEADER_LEN + self.csrc_count as usize * 4
    }
}

/// Payload of one RTP packet plus the payload type it was tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub payload_type: u8,
    pub payload: Bytes,
}

/// Strip RTP framing from `raw`.
///
/// The returned payload shares `raw`'s storage; nothing is copied.
pub fn decode(raw: &Bytes) -> Result<DecodedFrame, DecodeError> {
    let header = RtpHeader::parse(raw)?;
    let len = raw.len();

    let mut offset = header.header_size();
    if header.extension {
        if len < offset + 4 {
            return Err(DecodeError::Truncated {
                header_len: offset + 4,
                len,
            });
        }
        // extension length counts 32-bit words after the 4-byte preamble
        let words = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;
        offset += 4 + words * 4;
    }
    if offset > len {
        return Err(DecodeError::Truncated {
            header_len: offset,
            len,
        });
    }

    let mut end = len;
    if header.padding {
        // the last byte counts the padding, itself included
        let available = len - offset;
        let padding = raw[offset..].last().map_or(0, |&count| count as usize);
        if available == 0 || padding > available {
            return Err(DecodeError::BadPadding { padding, available });
        }
        end -= padding;
    }

    Ok(DecodedFrame {
        payload_type: header.payload_type,
        payload: raw.slice(offset..end),
    })
}

/// Content type of a session, decided once from its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClassification {
    TransportStream,
    Binary,
}

impl ContentClassification {
    pub fn from_payload_type(payload_type: u8) -> Self {
        if payload_type == RTP_PAYLOAD_MP2T {
            ContentClassification::TransportStream
        } else {
            ContentClassification::Binary
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentClassification::TransportStream => CONTENT_TYPE_MP2T,
            ContentClassification::Binary => CONTENT_TYPE_DEFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(first: u8, pt: u8, rest: &[u8]) -> Bytes {
        let mut data = vec![first, pt, 0x04, 0xD2, 0x00, 0x00, 0x16, 0x2E, 0xDE, 0xAD, 0xBE, 0xEF];
        data.extend_from_slice(rest);
        Bytes::from(data)
    }

    #[test]
    fn test_header_parse() {
        let raw = packet(0x80, 0x80 | 96, &[]);
        let header = RtpHeader::parse(&raw).unwrap();
        assert_eq!(header.version, 2);
        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence, 1234);
        assert_eq!(header.timestamp, 5678);
        assert_eq!(header.ssrc, 0xDEADBEEF);
    }

    #[test]
    fn test_decode_plain_packet() {
        let raw = packet(0x80, 33, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let frame = decode(&raw).unwrap();
        assert_eq!(frame.payload_type, 33);
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(frame.payload.len(), raw.len() - RTP_HEADER_LEN);
    }

    #[test]
    fn test_decode_header_only() {
        let frame = decode(&packet(0x80, 33, &[])).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_decode_rejects_short_datagram() {
        let raw = Bytes::from_static(&[0x80, 33, 0, 1]);
        assert_eq!(decode(&raw), Err(DecodeError::TooShort(4)));
        assert_eq!(decode(&Bytes::new()), Err(DecodeError::TooShort(0)));
    }

    #[test]
    fn test_decode_does_not_check_version() {
        let raw = packet(0x40, 33, &[0xAA]);
        let frame = decode(&raw).unwrap();
        assert_eq!(RtpHeader::parse(&raw).unwrap().version, 1);
        assert_eq!(&frame.payload[..], &[0xAA]);
    }

    #[test]
    fn test_decode_skips_csrc_list() {
        // CC=2
        let raw = packet(0x82, 33, &[0, 0, 0, 1, 0, 0, 0, 2, 0x47, 0x11]);
        let frame = decode(&raw).unwrap();
        assert_eq!(&frame.payload[..], &[0x47, 0x11]);
    }

    #[test]
    fn test_decode_skips_extension() {
        // X=1, profile 0xBEDE, one word of extension data
        let raw = packet(0x90, 33, &[0xBE, 0xDE, 0x00, 0x01, 9, 9, 9, 9, 0x47]);
        let frame = decode(&raw).unwrap();
        assert_eq!(&frame.payload[..], &[0x47]);
    }

    #[test]
    fn test_decode_rejects_truncated_extension() {
        let raw = packet(0x90, 33, &[0xBE, 0xDE, 0x00, 0x04, 9, 9]);
        assert!(matches!(decode(&raw), Err(DecodeError::Truncated { .. })));

        let raw = packet(0x83, 33, &[0, 0, 0, 1]);
        assert!(matches!(decode(&raw), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_decode_strips_padding() {
        let raw = packet(0xA0, 96, &[0x47, 0x48, 0, 0, 3]);
        let frame = decode(&raw).unwrap();
        assert_eq!(frame.payload_type, 96);
        assert_eq!(&frame.payload[..], &[0x47, 0x48]);
    }

    #[test]
    fn test_decode_accepts_zero_padding_count() {
        let raw = packet(0xA0, 33, &[0x47, 0x48, 0]);
        let frame = decode(&raw).unwrap();
        assert_eq!(&frame.payload[..], &[0x47, 0x48, 0]);

        let raw = packet(0xA0, 33, &[]);
        assert_eq!(
            decode(&raw),
            Err(DecodeError::BadPadding {
                padding: 0,
                available: 0
            })
        );
    }

    #[test]
    fn test_decode_rejects_oversized_padding() {
        let raw = packet(0xA0, 96, &[0x47, 9]);
        assert_eq!(
            decode(&raw),
            Err(DecodeError::BadPadding {
                padding: 9,
                available: 2
            })
        );
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            ContentClassification::from_payload_type(33).mime(),
            "video/MP2T"
        );
        assert_eq!(
            ContentClassification::from_payload_type(96).mime(),
            "application/octet-stream"
        );
        assert_eq!(
            ContentClassification::from_payload_type(0),
            ContentClassification::Binary
        );
    }
}
