//! 전송 통계

use std::time::Duration;

use crate::reliability::ReliabilitySystem;

/// 연결 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectionStats {
    /// 평활 RTT (밀리초)
    pub rtt_ms: f64,

    /// 송신 패킷 수
    pub sent_packets: u32,

    /// 수신 패킷 수 (중복 제외)
    pub received_packets: u32,

    /// ACK 된 패킷 수
    pub acked_packets: u32,

    /// 손실 판정 패킷 수
    pub lost_packets: u32,

    /// 송신 대역폭 (bytes/sec)
    pub sent_bandwidth: f64,

    /// ACK 대역폭 (bytes/sec)
    pub acked_bandwidth: f64,
}

impl ConnectionStats {
    pub fn from_reliability(rs: &ReliabilitySystem) -> Self {
        Self {
            rtt_ms: rs.round_trip_time() * 1000.0,
            sent_packets: rs.sent_packets(),
            received_packets: rs.received_packets(),
            acked_packets: rs.acked_packets(),
            lost_packets: rs.lost_packets(),
            sent_bandwidth: rs.sent_bandwidth(),
            acked_bandwidth: rs.acked_bandwidth(),
        }
    }

    /// 손실률 (%)
    pub fn loss_percent(&self) -> f64 {
        if self.sent_packets == 0 {
            return 0.0;
        }
        self.lost_packets as f64 / self.sent_packets as f64 * 100.0
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "rtt {:.1}ms, sent {}, acked {}, lost {} ({:.1}%), sent bandwidth = {:.1}kbps, acked bandwidth = {:.1}kbps",
            self.rtt_ms,
            self.sent_packets,
            self.acked_packets,
            self.lost_packets,
            self.loss_percent(),
            self.sent_bandwidth * 8.0 / 1000.0,
            self.acked_bandwidth * 8.0 / 1000.0,
        )
    }
}

/// 완료된 파일 전송 보고
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    /// 파일 이름
    pub file_name: String,

    /// 전송 바이트
    pub bytes: u64,

    /// 소요 시간
    pub elapsed: Duration,
}

impl TransferReport {
    /// 처리율 (Mbps)
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 * 8.0 / 1_000_000.0 / secs
    }

    /// 보고 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "{} | {} bytes | {:.2}s | {:.2} Mbps",
            self.file_name,
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.throughput_mbps(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_percent() {
        let stats = ConnectionStats {
            sent_packets: 200,
            lost_packets: 5,
            ..Default::default()
        };
        assert!((stats.loss_percent() - 2.5).abs() < 1e-9);
        assert_eq!(ConnectionStats::default().loss_percent(), 0.0);
    }

    #[test]
    fn test_summary_renders_kbps() {
        let stats = ConnectionStats {
            rtt_ms: 42.0,
            sent_bandwidth: 1000.0,
            ..Default::default()
        };
        let line = stats.summary();
        assert!(line.contains("rtt 42.0ms"));
        assert!(line.contains("sent bandwidth = 8.0kbps"));
    }

    #[test]
    fn test_throughput_mbps() {
        let report = TransferReport {
            file_name: "a.bin".into(),
            bytes: 1_000_000,
            elapsed: Duration::from_secs(2),
        };
        assert!((report.throughput_mbps() - 4.0).abs() < 1e-9);

        let instant = TransferReport {
            elapsed: Duration::ZERO,
            ..report
        };
        assert_eq!(instant.throughput_mbps(), 0.0);
    }
}
