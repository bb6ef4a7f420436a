//! 모의 네트워크
//!
//! 메모리 상에서 엔드포인트를 주소로 연결하고 손실/중복/지연을 흉내냄.
//! 틱 단위로 진행하므로 결정적으로 재현 가능 (시드 고정)

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::DatagramSocket;

/// 링크 특성
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// 손실 확률 (0.0 ~ 1.0)
    pub drop_rate: f64,

    /// 중복 확률 (0.0 ~ 1.0)
    pub duplicate_rate: f64,

    /// 전달 지연 (틱)
    pub latency_ticks: u64,

    /// 난수 시드
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            latency_ticks: 1,
            seed: 0x5EED,
        }
    }
}

/// 전송 중인 데이터그램
#[derive(Debug)]
struct InFlight {
    deliver_at: u64,
    from: SocketAddr,
    to: SocketAddr,
    data: Vec<u8>,
}

#[derive(Debug)]
struct NetworkInner {
    config: LinkConfig,
    now: u64,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    inboxes: HashMap<SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>>,
    /// 경로 차단 여부 (연결 끊김 모의)
    partitioned: bool,
    delivered: u64,
    dropped: u64,
}

/// 모의 네트워크 핸들
#[derive(Debug, Clone)]
pub struct SimNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl SimNetwork {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NetworkInner {
                rng: StdRng::seed_from_u64(config.seed),
                config,
                now: 0,
                in_flight: Vec::new(),
                inboxes: HashMap::new(),
                partitioned: false,
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// 엔드포인트 생성
    pub fn bind(&self, addr: SocketAddr) -> SimSocket {
        self.inner.lock().inboxes.entry(addr).or_default();
        SimSocket {
            addr,
            network: self.clone(),
        }
    }

    /// 한 틱 진행: 도착 시간이 된 데이터그램을 수신함으로 이동
    pub fn advance(&self) {
        let mut inner = self.inner.lock();
        inner.now += 1;
        let now = inner.now;

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.in_flight)
            .into_iter()
            .partition(|p| p.deliver_at <= now);
        inner.in_flight = pending;

        for packet in due {
            if let Some(inbox) = inner.inboxes.get_mut(&packet.to) {
                inbox.push_back((packet.from, packet.data));
                inner.delivered += 1;
            }
        }
    }

    /// 경로 차단/복구
    pub fn set_partitioned(&self, partitioned: bool) {
        self.inner.lock().partitioned = partitioned;
    }

    /// 이후 송신분의 손실 확률 변경
    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.inner.lock().config.drop_rate = drop_rate;
    }

    /// 이후 송신분의 전달 지연 변경 (이미 전송 중인 데이터그램은 그대로)
    pub fn set_latency(&self, latency_ticks: u64) {
        self.inner.lock().config.latency_ticks = latency_ticks;
    }

    /// 수신함에 전달된 데이터그램 수
    pub fn delivered(&self) -> u64 {
        self.inner.lock().delivered
    }

    /// 손실된 데이터그램 수
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// 임의의 데이터그램 직접 주입 (잘못된 패킷 시험용)
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let mut inner = self.inner.lock();
        if let Some(inbox) = inner.inboxes.get_mut(&to) {
            inbox.push_back((from, data.to_vec()));
        }
    }

    fn send(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let mut inner = self.inner.lock();
        if inner.partitioned {
            inner.dropped += 1;
            return;
        }

        let config = inner.config;
        if inner.rng.gen_bool(config.drop_rate) {
            inner.dropped += 1;
            return;
        }

        let copies = if inner.rng.gen_bool(config.duplicate_rate) { 2 } else { 1 };
        let deliver_at = inner.now + config.latency_ticks;
        for _ in 0..copies {
            inner.in_flight.push(InFlight {
                deliver_at,
                from,
                to,
                data: data.to_vec(),
            });
        }
    }

    fn recv(&self, addr: SocketAddr) -> Option<(SocketAddr, Vec<u8>)> {
        self.inner.lock().inboxes.get_mut(&addr)?.pop_front()
    }
}

/// 모의 엔드포인트
#[derive(Debug, Clone)]
pub struct SimSocket {
    addr: SocketAddr,
    network: SimNetwork,
}

impl DatagramSocket for SimSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.network.send(self.addr, addr, buf);
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some((from, data)) = self.network.recv(self.addr) else {
            return Ok(None);
        };
        // 실제 UDP와 동일하게 버퍼보다 긴 데이터그램은 잘림
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(Some((len, from)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
