//! 에러 타입 정의

use thiserror::Error;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("패킷이 헤더보다 짧음: {len} bytes")]
    PacketTooShort { len: usize },

    #[error("유효하지 않은 프로토콜 ID: expected {expected:08X}, got {got:08X}")]
    InvalidProtocolId { expected: u32, got: u32 },

    #[error("패킷 크기 초과: {size} bytes (최대 {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("연결되지 않음")]
    NotConnected,

    #[error("연결이 시작되지 않음")]
    NotRunning,

    #[error("연결 실패")]
    ConnectFailed,

    #[error("파일 이름이 너무 김: {len} bytes (최대 {max})")]
    FilenameTooLong { len: usize, max: usize },

    #[error("유효하지 않은 파일 이름")]
    InvalidFilename,

    #[error("유효하지 않은 메타데이터: {0}")]
    InvalidMetadata(String),

    #[error("버퍼 오버플로우: 최대 크기 {max_size} 초과")]
    BufferOverflow { max_size: usize },

    #[error("메모리 할당 실패: {size} bytes")]
    AllocationFailed { size: u64 },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 조용히 폐기해야 하는 전송 계층 에러인지 여부
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::PacketTooShort { .. } | Error::InvalidProtocolId { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
