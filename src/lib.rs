//! # RFT (Reliable File Transfer)
//!
//! UDP 위에 순서 번호/ACK 기반 신뢰성 계층을 얹고, 그 위에서 파일을 전송하는 프로토콜
//!
//! ## 핵심 특징
//! - **ACK 비트필드**: 패킷마다 최근 33개 시퀀스의 수신 여부를 피기백
//! - **RTT 추정**: 지수 이동 평균 기반 왕복 시간 추정, 손실/대역폭 통계
//! - **흐름 제어**: RTT 기반 Good/Bad 두 단계 전송률 조절
//! - **파일 전송**: 메타데이터 프레이밍 + 청크 전송 + CRC32 전체 파일 검증
//! - **고정 타임스텝**: 단일 스레드 협력형 틱 루프, 블로킹 없음

pub mod chunk;
pub mod config;
pub mod connection;
pub mod error;
pub mod flow;
pub mod integrity;
pub mod metadata;
pub mod node;
pub mod packet;
pub mod receiver;
pub mod reliability;
pub mod sender;
pub mod sim;
pub mod socket;
pub mod stats;
pub mod transfer;

pub use config::Config;
pub use connection::{ConnectionState, Mode, ReliableConnection};
pub use error::{Error, Result};
pub use flow::{FlowControl, FlowMode};
pub use metadata::FileMetadata;
pub use node::{Node, NodeStatus};
pub use packet::PacketHeader;
pub use receiver::FileReceiver;
pub use reliability::ReliabilitySystem;
pub use sender::FileSender;
pub use socket::DatagramSocket;
pub use stats::{ConnectionStats, TransferReport};
pub use transfer::Transfer;

/// 프로토콜 ID (불일치 패킷은 폐기)
pub const PROTOCOL_ID: u32 = 0x1122_3344;

/// 전송 헤더 크기 (바이트)
/// protocol_id(4) + sequence(2) + ack(2) + ack_bits(4)
pub const HEADER_SIZE: usize = 12;

/// 기본 패킷 크기 (헤더 포함, 바이트)
pub const DEFAULT_PACKET_SIZE: usize = 256;

/// 서버(수신자) 기본 포트
pub const SERVER_PORT: u16 = 30000;

/// 클라이언트(송신자) 기본 포트
pub const CLIENT_PORT: u16 = 30001;

/// 시퀀스 번호 최대값 (16비트 순환)
pub const MAX_SEQUENCE: u16 = u16::MAX;
