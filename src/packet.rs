//! 패킷 코덱
//!
//! 와이어 포맷 (리틀 엔디언, 고정 12바이트 헤더):
//!
//! ```text
//! [protocol_id:4][sequence:2][ack:2][ack_bits:4][payload:≤(packet_size-12)]
//! ```
//!
//! 이 계층은 길이와 프로토콜 ID만 검증함. 시퀀스/ACK 의미는 신뢰성 계층 담당

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, HEADER_SIZE};

/// 전송 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// 프로토콜 ID
    pub protocol_id: u32,

    /// 송신측 시퀀스 번호 (16비트 순환)
    pub sequence: u16,

    /// 상대로부터 받은 가장 최근 시퀀스
    pub ack: u16,

    /// ack 이전 32개 시퀀스 수신 비트맵 (bit i = ack - 1 - i)
    pub ack_bits: u32,
}

/// 헤더 + 페이로드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// 바이트로 직렬화
    pub fn encode(header: &PacketHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        bincode::serialize_into(&mut buf, header)?;
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// 바이트에서 역직렬화
    ///
    /// 헤더보다 짧거나 프로토콜 ID가 다르면 실패
    pub fn decode(bytes: &[u8], protocol_id: u32) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::PacketTooShort { len: bytes.len() });
        }

        let header: PacketHeader = bincode::deserialize(&bytes[..HEADER_SIZE])?;
        if header.protocol_id != protocol_id {
            return Err(Error::InvalidProtocolId {
                expected: protocol_id,
                got: header.protocol_id,
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_ID;

    fn header(sequence: u16, ack: u16, ack_bits: u32) -> PacketHeader {
        PacketHeader {
            protocol_id: PROTOCOL_ID,
            sequence,
            ack,
            ack_bits,
        }
    }

    #[test]
    fn test_packet_serialization() {
        let h = header(42, 41, 0b1011);
        let bytes = Packet::encode(&h, b"hello").unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let packet = Packet::decode(&bytes, PROTOCOL_ID).unwrap();
        assert_eq!(packet.header, h);
        assert_eq!(packet.payload.as_ref(), b"hello");
    }

    #[test]
    fn test_wire_layout_is_little_endian() {
        let bytes = Packet::encode(&header(0x0102, 0x0304, 0x0506_0708), &[]).unwrap();
        assert_eq!(&bytes[0..4], &PROTOCOL_ID.to_le_bytes());
        assert_eq!(&bytes[4..6], &[0x02, 0x01]);
        assert_eq!(&bytes[6..8], &[0x04, 0x03]);
        assert_eq!(&bytes[8..12], &[0x08, 0x07, 0x06, 0x05]);
    }

    #[test]
    fn test_short_packet_rejected() {
        let err = Packet::decode(&[0u8; HEADER_SIZE - 1], PROTOCOL_ID).unwrap_err();
        assert!(matches!(err, Error::PacketTooShort { len } if len == HEADER_SIZE - 1));
        assert!(err.is_transport());
    }

    #[test]
    fn test_protocol_id_mismatch_rejected() {
        let mut h = header(1, 0, 0);
        h.protocol_id = 0xDEAD_BEEF;
        let bytes = Packet::encode(&h, b"x").unwrap();

        let err = Packet::decode(&bytes, PROTOCOL_ID).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidProtocolId { expected, got } if expected == PROTOCOL_ID && got == 0xDEAD_BEEF
        ));
    }

    #[test]
    fn test_header_only_packet_has_empty_payload() {
        let bytes = Packet::encode(&header(7, 6, 0), &[]).unwrap();
        let packet = Packet::decode(&bytes, PROTOCOL_ID).unwrap();
        assert!(packet.payload.is_empty());
    }
}
