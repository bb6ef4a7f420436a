//! 송신자 (클라이언트측)
//!
//! Idle → SendingMetadata → SendingFile → Completed
//!
//! - 메타데이터 레코드를 조각으로 한 번에 전송 (조각별 ACK 없음)
//! - 이후 전송률 틱마다 청크 하나씩 전송
//! - 바이트 수 소진이 곧 전송 완료 (별도 종료 마커 없음)

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::chunk::{ChunkCursor, FileSource};
use crate::stats::TransferReport;
use crate::transfer::PacketSink;
use crate::Result;

/// 송신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    SendingMetadata,
    SendingFile,
    Completed,
}

/// 파일 송신 상태 기계
#[derive(Debug)]
pub struct FileSender {
    state: SenderState,
    source: FileSource,
    cursor: ChunkCursor,

    /// 패킷당 페이로드 크기 (메타데이터 조각, 청크 공통)
    payload_size: usize,

    started_at: Option<Instant>,
    report: Option<TransferReport>,
}

impl FileSender {
    pub fn new(source: FileSource, payload_size: usize) -> Self {
        Self {
            state: SenderState::Idle,
            source,
            cursor: ChunkCursor::new(payload_size),
            payload_size,
            started_at: None,
            report: None,
        }
    }

    // 호출 위치: 연결 중 전송률 틱마다
    pub fn tick(&mut self, sink: &mut impl PacketSink) -> Result<()> {
        match self.state {
            SenderState::Idle | SenderState::SendingMetadata => {
                self.started_at.get_or_insert_with(Instant::now);
                self.state = SenderState::SendingMetadata;
                self.send_metadata(sink)?;
            }
            SenderState::SendingFile => self.send_next_chunk(sink)?,
            SenderState::Completed => {}
        }
        Ok(())
    }

    fn send_metadata(&mut self, sink: &mut impl PacketSink) -> Result<()> {
        let fragments = self.source.metadata().fragments(self.payload_size)?;
        for fragment in &fragments {
            sink.send_packet(fragment)?;
        }
        info!(
            "Sent metadata for file: {} ({} bytes, crc {:08X}, {} fragments)",
            self.source.name(),
            self.source.len(),
            self.source.crc(),
            fragments.len()
        );

        self.state = SenderState::SendingFile;
        if self.source.is_empty() {
            self.complete();
        }
        Ok(())
    }

    fn send_next_chunk(&mut self, sink: &mut impl PacketSink) -> Result<()> {
        // 송신 성공 후에만 오프셋 전진
        let mut cursor = self.cursor.clone();
        if let Some(chunk) = cursor.next_chunk(self.source.data()) {
            sink.send_packet(&chunk)?;
            self.cursor = cursor;
            debug!("Sending progress: {:.2}%", self.progress() * 100.0);
        }

        if self.cursor.offset() >= self.source.len() {
            self.complete();
        }
        Ok(())
    }

    fn complete(&mut self) {
        let elapsed = self
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let report = TransferReport {
            file_name: self.source.name().to_string(),
            bytes: self.source.len() as u64,
            elapsed,
        };
        info!("Transfer completed: {}", report.summary());

        self.report = Some(report);
        self.state = SenderState::Completed;
    }

    /// 진행률 (0.0 ~ 1.0)
    pub fn progress(&self) -> f64 {
        if self.source.is_empty() {
            return if self.is_completed() { 1.0 } else { 0.0 };
        }
        self.cursor.offset() as f64 / self.source.len() as f64
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == SenderState::Completed
    }

    pub fn report(&self) -> Option<&TransferReport> {
        self.report.as_ref()
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }
}
