//! 프로토콜 설정

use std::path::PathBuf;

use crate::{Error, Result, CLIENT_PORT, DEFAULT_PACKET_SIZE, HEADER_SIZE, PROTOCOL_ID, SERVER_PORT};

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65507;

/// RFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 프로토콜 ID (양쪽이 동일해야 함)
    pub protocol_id: u32,

    /// 패킷 크기 (헤더 포함, 바이트)
    pub packet_size: usize,

    /// 고정 타임스텝 (초)
    pub delta_time: f64,

    /// 무수신 타임아웃 (초)
    pub timeout: f64,

    /// 재전송 지평선: 이 시간 안에 ACK 되지 않으면 손실로 간주 (초)
    pub rtt_maximum: f64,

    /// 송신이 없을 때 keepalive 패킷 간격 (초)
    pub keepalive_interval: f64,

    /// Bad 모드 전환 RTT 임계값 (밀리초)
    pub rtt_threshold_ms: f64,

    /// Good 모드 전송률 (패킷/초)
    pub good_send_rate: f64,

    /// Bad 모드 전송률 (패킷/초)
    pub bad_send_rate: f64,

    /// 통계 출력 주기 (초)
    pub stats_interval: f64,

    /// 서버 포트
    pub server_port: u16,

    /// 클라이언트 포트
    pub client_port: u16,

    /// 수신 파일 이름 접두어
    pub output_prefix: String,

    /// 수신 파일 저장 디렉터리
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            packet_size: DEFAULT_PACKET_SIZE,
            delta_time: 1.0 / 30.0,        // 30Hz
            timeout: 10.0,                 // 10초
            rtt_maximum: 1.0,              // 1초
            keepalive_interval: 0.1,       // 100ms
            rtt_threshold_ms: 250.0,
            good_send_rate: 30.0,
            bad_send_rate: 10.0,
            stats_interval: 0.25,
            server_port: SERVER_PORT,
            client_port: CLIENT_PORT,
            output_prefix: "received_".into(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 패킷당 페이로드 크기 (헤더 제외)
    pub fn payload_size(&self) -> usize {
        self.packet_size.saturating_sub(HEADER_SIZE)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.packet_size <= HEADER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "packet_size {} 는 헤더 {} bytes 보다 커야 함",
                self.packet_size, HEADER_SIZE
            )));
        }
        if self.packet_size > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "packet_size {} 가 데이터그램 최대 크기 {} 초과",
                self.packet_size, MAX_DATAGRAM_SIZE
            )));
        }
        if self.delta_time <= 0.0
            || self.timeout <= 0.0
            || self.rtt_maximum <= 0.0
            || self.keepalive_interval <= 0.0
            || self.stats_interval <= 0.0
        {
            return Err(Error::InvalidConfig("시간 값은 0보다 커야 함".into()));
        }
        if self.good_send_rate <= 0.0 || self.bad_send_rate <= 0.0 {
            return Err(Error::InvalidConfig("전송률은 0보다 커야 함".into()));
        }
        Ok(())
    }

    /// LAN용 설정 (큰 패킷, 짧은 타임아웃)
    pub fn lan() -> Self {
        Self {
            packet_size: 1400,
            timeout: 5.0,
            rtt_maximum: 0.5,
            keepalive_interval: 0.05,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy() -> Self {
        Self {
            timeout: 20.0,
            rtt_maximum: 2.0,
            keepalive_interval: 0.2,
            stats_interval: 1.0,
            ..Self::default()
        }
    }
}
