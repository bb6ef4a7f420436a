//! 엔드포인트 틱 드라이버
//!
//! 한 틱의 순서:
//! 1. 연결 중이면 흐름 제어 갱신 (현재 RTT)
//! 2. 연결/끊김/연결 실패 전환 감지
//! 3. 전송률에 맞춰 송신 틱 실행
//! 4. 수신 패킷을 모두 꺼내 전송 상태 기계로 전달
//! 5. 연결 갱신 (타임아웃, 신뢰성 통계, keepalive)
//! 6. 주기적 통계 출력

use std::net::SocketAddr;

use tracing::{debug, info, trace, warn};

use crate::chunk::FileSource;
use crate::connection::{Mode, ReliableConnection};
use crate::flow::FlowControl;
use crate::receiver::FileReceiver;
use crate::sender::FileSender;
use crate::socket::DatagramSocket;
use crate::stats::TransferReport;
use crate::transfer::Transfer;
use crate::{Config, Result};

/// 틱 결과
#[derive(Debug, Clone, PartialEq)]
pub enum NodeStatus {
    /// 진행 중
    Running,
    /// 전송 완료
    Completed(TransferReport),
    /// 연결 시도 타임아웃
    ConnectFailed,
    /// 송신자 연결 끊김
    Disconnected,
}

/// 연결 + 흐름 제어 + 전송 상태 기계를 묶은 엔드포인트
pub struct Node<S: DatagramSocket> {
    config: Config,
    connection: ReliableConnection<S>,
    flow: FlowControl,
    transfer: Transfer,

    /// 이전 틱의 연결 여부
    connected: bool,
    send_accumulator: f64,
    stats_accumulator: f64,
}

impl<S: DatagramSocket> Node<S> {
    /// 수신자 (서버): listen 상태로 시작
    pub fn server(socket: S, config: Config) -> Result<Self> {
        config.validate()?;
        let receiver = FileReceiver::new(config.output_dir.clone(), config.output_prefix.clone());
        let mut node = Self::with_transfer(socket, config, Transfer::Receive(receiver));
        node.connection.listen();
        Ok(node)
    }

    /// 송신자 (클라이언트): 서버 주소로 연결 시도
    pub fn client(socket: S, config: Config, server: SocketAddr, source: FileSource) -> Result<Self> {
        config.validate()?;
        let sender = FileSender::new(source, config.payload_size());
        let mut node = Self::with_transfer(socket, config, Transfer::Send(sender));
        node.connection.connect(server);
        Ok(node)
    }

    fn with_transfer(socket: S, config: Config, transfer: Transfer) -> Self {
        Self {
            connection: ReliableConnection::new(socket, &config),
            flow: FlowControl::new(&config),
            transfer,
            connected: false,
            send_accumulator: 0.0,
            stats_accumulator: 0.0,
            config,
        }
    }

    /// 고정 타임스텝 한 번 진행
    pub fn tick(&mut self, dt: f64) -> Result<NodeStatus> {
        if self.connection.is_connected() {
            let rtt_ms = self.connection.reliability().round_trip_time() * 1000.0;
            self.flow.update(dt, rtt_ms);
        }
        let send_rate = self.flow.send_rate();

        if let Some(status) = self.detect_transitions() {
            return Ok(status);
        }

        self.send_accumulator += dt;
        let send_interval = 1.0 / send_rate;
        while self.send_accumulator > send_interval {
            if self.connected {
                self.transfer.on_send_tick(&mut self.connection)?;
            }
            self.send_accumulator -= send_interval;
        }

        while let Some(payload) = self.connection.receive_packet()? {
            self.transfer.on_packet(&payload)?;
        }

        let acks = self.connection.reliability_mut().take_acks();
        if !acks.is_empty() {
            trace!("acked: {:?}", acks);
        }

        self.connection.update(dt)?;
        self.report_stats(dt);

        match self.transfer.report() {
            Some(report) if self.transfer.is_completed() => Ok(NodeStatus::Completed(report.clone())),
            _ => Ok(NodeStatus::Running),
        }
    }

    fn detect_transitions(&mut self) -> Option<NodeStatus> {
        let now_connected = self.connection.is_connected();

        if !self.connected && now_connected {
            info!(
                "{} connected to {:?}",
                self.transfer.role(),
                self.connection.peer_addr()
            );
        }

        if self.connected && !now_connected {
            info!("reset flow control");
            self.flow.reset();
            self.transfer.on_disconnect();
            self.connected = false;

            if self.connection.mode() == Mode::Server {
                self.connection.listen();
            } else {
                warn!("connection to server lost");
                return Some(NodeStatus::Disconnected);
            }
        }
        self.connected = now_connected;

        if !self.connected && self.connection.connect_failed() {
            return Some(NodeStatus::ConnectFailed);
        }
        None
    }

    fn report_stats(&mut self, dt: f64) {
        self.stats_accumulator += dt;
        while self.stats_accumulator >= self.config.stats_interval {
            if self.connected {
                debug!(
                    "[{}] {}, flow {:?} {:.0} pkt/s",
                    self.transfer.role(),
                    self.connection.stats().summary(),
                    self.flow.mode(),
                    self.flow.send_rate()
                );
            }
            self.stats_accumulator -= self.config.stats_interval;
        }
    }

    /// 명시적 종료
    pub fn stop(&mut self) {
        self.connection.stop();
    }

    pub fn connection(&self) -> &ReliableConnection<S> {
        &self.connection
    }

    pub fn flow(&self) -> &FlowControl {
        &self.flow
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowMode;
    use crate::sim::{LinkConfig, SimNetwork, SimSocket};
    use crate::ConnectionState;

    const DT: f64 = 1.0 / 30.0;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn nodes(
        config: &Config,
        data: Vec<u8>,
    ) -> (SimNetwork, Node<SimSocket>, Node<SimSocket>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            ..config.clone()
        };
        let net = SimNetwork::new(LinkConfig::default());
        let server = Node::server(net.bind(addr(30000)), config.clone()).unwrap();
        let source = FileSource::from_bytes("node.bin", data).unwrap();
        let client = Node::client(net.bind(addr(30001)), config, addr(30000), source).unwrap();
        (net, server, client, dir)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let net = SimNetwork::new(LinkConfig::default());
        let config = Config {
            packet_size: 4,
            ..Config::default()
        };
        assert!(Node::server(net.bind(addr(30000)), config).is_err());
    }

    #[test]
    fn test_connect_failure_reported() {
        let config = Config {
            timeout: 1.0,
            ..Config::default()
        };
        let net = SimNetwork::new(LinkConfig::default());
        let source = FileSource::from_bytes("x", vec![1u8]).unwrap();
        let mut client = Node::client(net.bind(addr(30001)), config, addr(30000), source).unwrap();

        let mut status = NodeStatus::Running;
        for _ in 0..60 {
            status = client.tick(DT).unwrap();
            net.advance();
            if status != NodeStatus::Running {
                break;
            }
        }
        assert_eq!(status, NodeStatus::ConnectFailed);
    }

    #[test]
    fn test_small_transfer_completes_on_both_sides() {
        let config = Config {
            keepalive_interval: 0.05,
            ..Config::default()
        };
        let data = vec![0xA5u8; 700];
        let (net, mut server, mut client, dir) = nodes(&config, data.clone());

        let mut received = None;
        for _ in 0..300 {
            client.tick(DT).unwrap();
            if let NodeStatus::Completed(report) = server.tick(DT).unwrap() {
                received = Some(report);
                break;
            }
            net.advance();
        }

        let report = received.expect("transfer did not complete");
        assert_eq!(report.bytes, 700);
        assert!(client.transfer().is_completed());
        assert_eq!(std::fs::read(dir.path().join("received_node.bin")).unwrap(), data);
    }

    #[test]
    fn test_disconnect_resets_flow_and_relistens() {
        let config = Config {
            keepalive_interval: 0.05,
            timeout: 1.0,
            ..Config::default()
        };
        let (net, mut server, mut client, _dir) = nodes(&config, vec![1u8; 100_000]);

        // RTT가 임계값 이하로 4초 이상 유지되면 Good 모드
        for _ in 0..180 {
            client.tick(DT).unwrap();
            server.tick(DT).unwrap();
            net.advance();
        }
        assert_eq!(client.flow().mode(), FlowMode::Good);

        // Good 진입 직후 지연 급증 → Bad 로 떨어지며 페널티 2배
        net.set_latency(10);
        for _ in 0..90 {
            client.tick(DT).unwrap();
            server.tick(DT).unwrap();
            net.advance();
            if client.flow().mode() == FlowMode::Bad {
                break;
            }
        }
        assert_eq!(client.flow().mode(), FlowMode::Bad);
        assert_eq!(client.flow().penalty_time(), 8.0);
        assert!(!server.transfer().is_completed());

        net.set_latency(1);
        net.set_partitioned(true);
        let mut client_status = NodeStatus::Running;
        for _ in 0..90 {
            if client_status == NodeStatus::Running {
                client_status = client.tick(DT).unwrap();
            }
            server.tick(DT).unwrap();
            net.advance();
        }

        assert_eq!(client_status, NodeStatus::Disconnected);
        assert_eq!(client.flow().mode(), FlowMode::Bad);
        assert_eq!(client.flow().penalty_time(), 4.0);
        assert_eq!(server.flow().mode(), FlowMode::Bad);
        assert_eq!(server.connection().state(), ConnectionState::Listening);
        assert!(server.transfer().report().is_none());
    }
}
