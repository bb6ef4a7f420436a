//! 신뢰성 연결
//!
//! - Listen/Connect/Connected/ConnectFail/Disconnected 상태 관리
//! - 무수신 타임아웃, keepalive
//! - 신뢰성 시스템이 모든 송수신 패킷의 헤더를 채우고 검증

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::packet::{Packet, PacketHeader};
use crate::reliability::ReliabilitySystem;
use crate::socket::DatagramSocket;
use crate::stats::ConnectionStats;
use crate::{Config, Error, Result, HEADER_SIZE};

/// 수신 버퍼 크기 (UDP 최대 페이로드)
const RECV_BUFFER_SIZE: usize = 65536;

/// 연결 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    None,
    Client,
    Server,
}

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Listening,
    Connecting,
    ConnectFail,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// 소켓 + 신뢰성 시스템을 소유하는 연결
pub struct ReliableConnection<S: DatagramSocket> {
    socket: S,
    protocol_id: u32,
    packet_size: usize,
    timeout: f64,
    keepalive_interval: f64,

    running: bool,
    mode: Mode,
    state: ConnectionState,
    address: Option<SocketAddr>,

    /// 마지막 유효 수신 이후 경과 시간
    timeout_accumulator: f64,
    /// 마지막 송신 이후 경과 시간
    keepalive_accumulator: f64,

    reliability: ReliabilitySystem,
    recv_buf: Vec<u8>,
}

impl<S: DatagramSocket> ReliableConnection<S> {
    /// 바인드된 소켓으로 연결 생성 (실행 중, 역할 없음)
    pub fn new(socket: S, config: &Config) -> Self {
        Self {
            socket,
            protocol_id: config.protocol_id,
            packet_size: config.packet_size,
            timeout: config.timeout,
            keepalive_interval: config.keepalive_interval,
            running: true,
            mode: Mode::None,
            state: ConnectionState::Disconnected,
            address: None,
            timeout_accumulator: 0.0,
            keepalive_accumulator: 0.0,
            reliability: ReliabilitySystem::new(config.rtt_maximum),
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// 서버 역할: 첫 유효 패킷의 송신자를 상대로 고정
    pub fn listen(&mut self) {
        info!("server listening for connection");
        self.clear_data();
        self.mode = Mode::Server;
        self.state = ConnectionState::Listening;
    }

    /// 클라이언트 역할: 대상 주소로 연결 요청
    pub fn connect(&mut self, address: SocketAddr) {
        info!("client connecting to {}", address);
        self.clear_data();
        self.mode = Mode::Client;
        self.state = ConnectionState::Connecting;
        self.address = Some(address);
    }

    /// 명시적 정지
    pub fn stop(&mut self) {
        if self.running {
            info!("stop connection");
        }
        self.clear_data();
        self.running = false;
        self.mode = Mode::None;
    }

    fn clear_data(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.timeout_accumulator = 0.0;
        self.keepalive_accumulator = 0.0;
        self.address = None;
        self.reliability.reset();
    }

    // 호출 위치: 매 타임스텝
    pub fn update(&mut self, dt: f64) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        self.timeout_accumulator += dt;
        self.keepalive_accumulator += dt;

        if self.timeout_accumulator > self.timeout {
            match self.state {
                ConnectionState::Connecting => {
                    info!("connect timed out");
                    self.clear_data();
                    self.state = ConnectionState::ConnectFail;
                }
                ConnectionState::Connected => {
                    info!("connection timed out");
                    self.clear_data();
                }
                _ => {}
            }
        }

        self.reliability.update(dt);

        let needs_keepalive = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) && self.keepalive_accumulator >= self.keepalive_interval;
        if needs_keepalive {
            self.transmit(&[])?;
        }

        Ok(())
    }

    /// 애플리케이션 페이로드 송신 (Connected 상태에서만)
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        if !self.running {
            return Err(Error::NotRunning);
        }
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let max = self.max_payload();
        if payload.len() > max {
            return Err(Error::PacketTooLarge {
                size: payload.len(),
                max,
            });
        }
        self.transmit(payload)
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<()> {
        let address = self.address.ok_or(Error::NotConnected)?;

        let sequence = self.reliability.packet_sent(HEADER_SIZE + payload.len());
        let header = PacketHeader {
            protocol_id: self.protocol_id,
            sequence,
            ack: self.reliability.ack(),
            ack_bits: self.reliability.ack_bits(),
        };
        let bytes = Packet::encode(&header, payload)?;
        self.socket.send_to(&bytes, address)?;
        self.keepalive_accumulator = 0.0;

        trace!("송신: seq={}, {} bytes", sequence, payload.len());
        Ok(())
    }

    /// 다음 애플리케이션 페이로드 수신
    ///
    /// 대기 중인 데이터그램을 비울 때까지 읽음. 잘못된 패킷, keepalive,
    /// 중복 시퀀스는 내부에서 소비하고 건너뜀. 더 없으면 `Ok(None)`
    pub fn receive_packet(&mut self) -> Result<Option<Bytes>> {
        if !self.running {
            return Ok(None);
        }

        loop {
            let received = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                // 일부 플랫폼은 ICMP port unreachable을 recv 에러로 전달
                Err(e) if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
                ) =>
                {
                    trace!("수신 에러 무시: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some((len, from)) = received else {
                return Ok(None);
            };
            if len > self.packet_size {
                trace!("패킷 크기 초과 폐기: {} bytes from {}", len, from);
                continue;
            }

            let packet = match Packet::decode(&self.recv_buf[..len], self.protocol_id) {
                Ok(packet) => packet,
                Err(e) if e.is_transport() => {
                    trace!("패킷 폐기 ({}): {}", from, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(payload) = self.accept(packet, from, len) {
                return Ok(Some(payload));
            }
        }
    }

    fn accept(&mut self, packet: Packet, from: SocketAddr, len: usize) -> Option<Bytes> {
        if self.mode == Mode::Server && self.state == ConnectionState::Listening {
            info!("client connected from {}", from);
            self.reliability.reset();
            self.state = ConnectionState::Connected;
            self.address = Some(from);
        }

        if self.address != Some(from) {
            trace!("알 수 없는 송신자 무시: {}", from);
            return None;
        }

        if self.mode == Mode::Client && self.state == ConnectionState::Connecting {
            info!("client completes connection with server");
            self.state = ConnectionState::Connected;
        }
        if self.state != ConnectionState::Connected {
            return None;
        }

        self.timeout_accumulator = 0.0;

        let header = packet.header;
        let fresh = self.reliability.packet_received(header.sequence, len);
        self.reliability.process_ack(header.ack, header.ack_bits);

        if !fresh {
            debug!("중복 패킷 폐기: seq={}", header.sequence);
            return None;
        }
        if packet.payload.is_empty() {
            return None;
        }
        Some(packet.payload)
    }

    /// 패킷당 최대 페이로드
    pub fn max_payload(&self) -> usize {
        self.packet_size - HEADER_SIZE
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    pub fn is_listening(&self) -> bool {
        self.state == ConnectionState::Listening
    }

    pub fn connect_failed(&self) -> bool {
        self.state == ConnectionState::ConnectFail
    }

    /// 상대 주소
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn reliability(&self) -> &ReliabilitySystem {
        &self.reliability
    }

    pub fn reliability_mut(&mut self) -> &mut ReliabilitySystem {
        &mut self.reliability
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats::from_reliability(&self.reliability)
    }
}
