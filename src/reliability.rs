//! 신뢰성 시스템
//!
//! - 송신 시퀀스 기록 및 ACK 처리
//! - ACK 비트필드 생성
//! - RTT 지수 이동 평균, 손실/대역폭 통계
//!
//! 손실 판정은 통계 전용. 자동 재전송 없음 (파일 계층이 CRC로 보완)

use std::collections::VecDeque;

use tracing::trace;

/// 시간 비교 여유값
const EPSILON: f64 = 0.001;

/// 수신 기록 유지 개수 (ack 자체 + 비트필드 32개 + 여유 1)
const RECEIVED_WINDOW: u16 = 34;

/// RTT 이동 평균 계수
const RTT_SMOOTHING: f64 = 0.1;

/// s1이 s2보다 최근 시퀀스인지 (16비트 순환 고려)
pub fn sequence_more_recent(s1: u16, s2: u16) -> bool {
    const HALF: u16 = u16::MAX / 2;
    (s1 > s2 && s1 - s2 <= HALF) || (s2 > s1 && s2 - s1 > HALF)
}

/// ack 기준 비트 인덱스 (ack - 1 → 0, ack - 2 → 1, ...)
pub fn bit_index_for_sequence(sequence: u16, ack: u16) -> u32 {
    u32::from(ack.wrapping_sub(sequence).wrapping_sub(1))
}

/// 시퀀스별 기록
#[derive(Debug, Clone, Copy)]
struct PacketData {
    sequence: u16,
    /// 기록 후 경과 시간 (초)
    time: f64,
    /// 데이터그램 크기 (바이트)
    size: usize,
}

/// 시퀀스 기록 큐
#[derive(Debug, Default)]
struct PacketQueue {
    entries: VecDeque<PacketData>,
}

impl PacketQueue {
    fn exists(&self, sequence: u16) -> bool {
        self.entries.iter().any(|p| p.sequence == sequence)
    }

    fn push(&mut self, data: PacketData) {
        self.entries.push_back(data);
    }

    fn advance(&mut self, dt: f64) {
        for entry in self.entries.iter_mut() {
            entry.time += dt;
        }
    }

    fn total_size(&self) -> usize {
        self.entries.iter().map(|p| p.size).sum()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 연결당 신뢰성 상태
#[derive(Debug)]
pub struct ReliabilitySystem {
    /// 재전송 지평선 (초)
    rtt_maximum: f64,

    /// 마지막으로 할당한 로컬 시퀀스
    local_sequence: u16,

    /// 상대로부터 받은 가장 최근 시퀀스
    remote_sequence: u16,

    sent_packets: u32,
    recv_packets: u32,
    lost_packets: u32,
    acked_packets: u32,

    sent_bandwidth: f64,
    acked_bandwidth: f64,

    /// 평활 RTT (초)
    rtt: f64,

    /// 마지막 폴링 이후 새로 ACK 된 시퀀스
    acks: Vec<u16>,

    /// 대역폭 계산용 송신 기록
    sent_queue: PacketQueue,
    /// ACK 대기 중인 송신 기록
    pending_ack_queue: PacketQueue,
    /// 비트필드 생성용 수신 기록
    received_queue: PacketQueue,
    /// 대역폭 계산용 ACK 기록
    acked_queue: PacketQueue,
}

impl ReliabilitySystem {
    pub fn new(rtt_maximum: f64) -> Self {
        Self {
            rtt_maximum,
            local_sequence: 0,
            remote_sequence: 0,
            sent_packets: 0,
            recv_packets: 0,
            lost_packets: 0,
            acked_packets: 0,
            sent_bandwidth: 0.0,
            acked_bandwidth: 0.0,
            rtt: 0.0,
            acks: Vec::new(),
            sent_queue: PacketQueue::default(),
            pending_ack_queue: PacketQueue::default(),
            received_queue: PacketQueue::default(),
            acked_queue: PacketQueue::default(),
        }
    }

    /// 모든 상태 초기화 (연결/해제 시)
    pub fn reset(&mut self) {
        *self = Self::new(self.rtt_maximum);
    }

    /// 다음 송신 시퀀스 할당 및 기록
    ///
    /// 호출 위치: 패킷 송신 직전. 반환된 시퀀스를 헤더에 기록
    pub fn packet_sent(&mut self, size: usize) -> u16 {
        self.local_sequence = self.local_sequence.wrapping_add(1);
        let sequence = self.local_sequence;

        // 순환 후 아직 남은 기록이면 중복 등록하지 않음
        if !self.sent_queue.exists(sequence) {
            let data = PacketData {
                sequence,
                time: 0.0,
                size,
            };
            self.sent_queue.push(data);
            self.pending_ack_queue.push(data);
        }
        self.sent_packets += 1;
        sequence
    }

    /// 수신 시퀀스 기록
    ///
    /// 중복 수신은 무시 (통계에도 반영하지 않음). 새 시퀀스면 true
    pub fn packet_received(&mut self, sequence: u16, size: usize) -> bool {
        if self.received_queue.exists(sequence) {
            trace!("중복 수신 무시: seq={}", sequence);
            return false;
        }

        self.recv_packets += 1;
        self.received_queue.push(PacketData {
            sequence,
            time: 0.0,
            size,
        });
        if sequence_more_recent(sequence, self.remote_sequence) {
            self.remote_sequence = sequence;
        }

        let minimum = self.remote_sequence.wrapping_sub(RECEIVED_WINDOW);
        self.received_queue
            .entries
            .retain(|p| sequence_more_recent(p.sequence, minimum));
        true
    }

    /// 헤더에 실을 ack 값
    pub fn ack(&self) -> u16 {
        self.remote_sequence
    }

    /// 헤더에 실을 ack 비트필드
    pub fn ack_bits(&self) -> u32 {
        let ack = self.remote_sequence;
        self.received_queue
            .entries
            .iter()
            .filter(|p| p.sequence != ack && !sequence_more_recent(p.sequence, ack))
            .map(|p| bit_index_for_sequence(p.sequence, ack))
            .filter(|&index| index <= 31)
            .fold(0u32, |bits, index| bits | (1 << index))
    }

    /// 상대가 보낸 ack/비트필드 처리
    pub fn process_ack(&mut self, ack: u16, ack_bits: u32) {
        let mut newly_acked = Vec::new();

        self.pending_ack_queue.entries.retain(|p| {
            let acked = if p.sequence == ack {
                true
            } else if !sequence_more_recent(p.sequence, ack) {
                let index = bit_index_for_sequence(p.sequence, ack);
                index <= 31 && (ack_bits >> index) & 1 == 1
            } else {
                false
            };

            if acked {
                newly_acked.push(*p);
            }
            !acked
        });

        for p in newly_acked {
            self.rtt += (p.time - self.rtt) * RTT_SMOOTHING;
            self.acked_queue.push(PacketData { time: 0.0, ..p });
            self.acks.push(p.sequence);
            self.acked_packets += 1;
            trace!("ACK: seq={}, rtt={:.1}ms", p.sequence, self.rtt * 1000.0);
        }
    }

    /// 타임스텝 갱신: 기록 노화, 손실 판정, 대역폭 계산
    pub fn update(&mut self, dt: f64) {
        self.sent_queue.advance(dt);
        self.received_queue.advance(dt);
        self.pending_ack_queue.advance(dt);
        self.acked_queue.advance(dt);

        let horizon = self.rtt_maximum;
        self.sent_queue
            .entries
            .retain(|p| p.time <= horizon + EPSILON);
        self.acked_queue
            .entries
            .retain(|p| p.time <= horizon * 2.0 - EPSILON);

        let before = self.pending_ack_queue.len();
        self.pending_ack_queue
            .entries
            .retain(|p| p.time <= horizon + EPSILON);
        let lost = before - self.pending_ack_queue.len();
        if lost > 0 {
            self.lost_packets += lost as u32;
            trace!("손실 판정: {} packets", lost);
        }

        self.sent_bandwidth = self.sent_queue.total_size() as f64 / horizon;
        self.acked_bandwidth = self.acked_queue.total_size() as f64 / horizon;
    }

    /// 새로 ACK 된 시퀀스 목록 (호출 시 비움)
    pub fn take_acks(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.acks)
    }

    /// 평활 RTT (초)
    pub fn round_trip_time(&self) -> f64 {
        self.rtt
    }

    pub fn local_sequence(&self) -> u16 {
        self.local_sequence
    }

    pub fn remote_sequence(&self) -> u16 {
        self.remote_sequence
    }

    pub fn sent_packets(&self) -> u32 {
        self.sent_packets
    }

    pub fn received_packets(&self) -> u32 {
        self.recv_packets
    }

    pub fn acked_packets(&self) -> u32 {
        self.acked_packets
    }

    pub fn lost_packets(&self) -> u32 {
        self.lost_packets
    }

    /// 송신 대역폭 (bytes/sec)
    pub fn sent_bandwidth(&self) -> f64 {
        self.sent_bandwidth
    }

    /// ACK 대역폭 (bytes/sec)
    pub fn acked_bandwidth(&self) -> f64 {
        self.acked_bandwidth
    }

    /// ACK 대기 중인 패킷 수
    pub fn pending_acks(&self) -> usize {
        self.pending_ack_queue.len()
    }
}
