//! 수신자 (서버측)
//!
//! ReceivingMetadata → ReceivingFile → Completed
//!
//! - 메타데이터 조각 조립 후 파일 크기만큼 버퍼 확보
//! - 도착 순서대로 이어 붙임 (재정렬 없음)
//! - 크기 도달 시 CRC 검증, 일치하면 저장
//! - 불일치면 버퍼 폐기 후 메타데이터 대기로 복귀

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::chunk::ReceiveBuffer;
use crate::integrity;
use crate::metadata::{FileMetadata, MetadataAssembler};
use crate::stats::TransferReport;
use crate::Result;

/// 수신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    ReceivingMetadata,
    ReceivingFile,
    Completed,
}

/// 수신 중인 파일
#[derive(Debug)]
struct Incoming {
    metadata: FileMetadata,
    file_name: String,
    buffer: ReceiveBuffer,
    started_at: Instant,
}

/// 파일 수신 상태 기계
#[derive(Debug)]
pub struct FileReceiver {
    state: ReceiverState,
    assembler: MetadataAssembler,
    incoming: Option<Incoming>,

    /// 저장 디렉터리
    output_dir: PathBuf,

    /// 저장 파일 이름 접두사
    output_prefix: String,

    report: Option<TransferReport>,
    saved_path: Option<PathBuf>,
    crc_failures: u32,
}

impl FileReceiver {
    pub fn new(output_dir: impl Into<PathBuf>, output_prefix: impl Into<String>) -> Self {
        Self {
            state: ReceiverState::ReceivingMetadata,
            assembler: MetadataAssembler::new(),
            incoming: None,
            output_dir: output_dir.into(),
            output_prefix: output_prefix.into(),
            report: None,
            saved_path: None,
            crc_failures: 0,
        }
    }

    /// 수신 페이로드 처리
    ///
    /// 에러는 할당 실패/저장 실패 같은 치명적 상황만 반환
    pub fn on_packet(&mut self, payload: &[u8]) -> Result<()> {
        match self.state {
            ReceiverState::ReceivingMetadata => self.on_metadata_fragment(payload),
            ReceiverState::ReceivingFile => self.on_chunk(payload),
            ReceiverState::Completed => {
                debug!("전송 완료 후 패킷 무시: {} bytes", payload.len());
                Ok(())
            }
        }
    }

    fn on_metadata_fragment(&mut self, payload: &[u8]) -> Result<()> {
        let metadata = match self.assembler.push(payload) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("메타데이터 파싱 실패, 폐기: {}", e);
                return Ok(());
            }
        };

        let file_name = match metadata.safe_file_name() {
            Ok(name) => name,
            Err(e) => {
                warn!("잘못된 파일 이름 {:?}: {}", metadata.filename, e);
                return Ok(());
            }
        };

        info!(
            "Received metadata for file: {} ({} bytes, crc {:08X})",
            file_name, metadata.file_size, metadata.crc
        );

        let buffer = ReceiveBuffer::allocate(metadata.file_size)?;
        self.incoming = Some(Incoming {
            metadata,
            file_name,
            buffer,
            started_at: Instant::now(),
        });
        self.state = ReceiverState::ReceivingFile;

        // 빈 파일은 청크 없이 바로 완료
        self.finish_if_complete()
    }

    fn on_chunk(&mut self, payload: &[u8]) -> Result<()> {
        let Some(incoming) = self.incoming.as_mut() else {
            self.restart();
            return Ok(());
        };

        if let Err(e) = incoming.buffer.append(payload) {
            warn!(
                "버퍼 경계 초과 패킷 무시 ({} + {} bytes): {}",
                incoming.buffer.len(),
                payload.len(),
                e
            );
            return Ok(());
        }

        debug!(
            "Receiving progress: {:.2}%",
            incoming.buffer.len() as f64 / incoming.buffer.expected() as f64 * 100.0
        );

        self.finish_if_complete()
    }

    fn finish_if_complete(&mut self) -> Result<()> {
        match &self.incoming {
            Some(incoming) if incoming.buffer.is_complete() => {}
            _ => return Ok(()),
        }
        let Some(incoming) = self.incoming.take() else {
            return Ok(());
        };

        if let Err(e) = integrity::check(incoming.buffer.as_slice(), incoming.metadata.crc) {
            self.crc_failures += 1;
            warn!(
                "CRC verification failed for {}: {}. 버퍼 폐기 후 재수신 대기",
                incoming.file_name, e
            );
            self.restart();
            return Ok(());
        }
        info!("CRC verification passed for file: {}", incoming.file_name);

        let path = self
            .output_dir
            .join(format!("{}{}", self.output_prefix, incoming.file_name));
        persist(&path, incoming.buffer.as_slice())?;

        let report = TransferReport {
            file_name: incoming.file_name,
            bytes: incoming.metadata.file_size,
            elapsed: incoming.started_at.elapsed(),
        };
        info!("File saved: {} ({})", path.display(), report.summary());

        self.saved_path = Some(path);
        self.report = Some(report);
        self.state = ReceiverState::Completed;
        Ok(())
    }

    /// 진행 중 전송을 버리고 메타데이터 대기로 복귀
    pub fn restart(&mut self) {
        self.assembler.reset();
        self.incoming = None;
        self.report = None;
        self.saved_path = None;
        self.state = ReceiverState::ReceivingMetadata;
    }

    /// 진행률 (0.0 ~ 1.0)
    pub fn progress(&self) -> f64 {
        match (&self.state, &self.incoming) {
            (ReceiverState::Completed, _) => 1.0,
            (_, Some(incoming)) if incoming.buffer.expected() > 0 => {
                incoming.buffer.len() as f64 / incoming.buffer.expected() as f64
            }
            _ => 0.0,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == ReceiverState::Completed
    }

    pub fn report(&self) -> Option<&TransferReport> {
        self.report.as_ref()
    }

    /// 저장된 파일 경로
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_path.as_deref()
    }

    /// 수신 중인 파일 메타데이터
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.incoming.as_ref().map(|incoming| &incoming.metadata)
    }

    /// CRC 불일치 횟수
    pub fn crc_failures(&self) -> u32 {
        self.crc_failures
    }
}

/// 파일 저장. 실패 시 부분 파일 제거
fn persist(path: &Path, data: &[u8]) -> Result<()> {
    if let Err(e) = std::fs::write(path, data) {
        warn!("파일 저장 실패 {}: {}", path.display(), e);
        let _ = std::fs::remove_file(path);
        return Err(e.into());
    }
    Ok(())
}

impl Default for FileReceiver {
    fn default() -> Self {
        Self::new(".", "received_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RECORD_SIZE;
    use crate::Error;

    fn record(meta: &FileMetadata) -> Vec<u8> {
        meta.to_bytes().unwrap().to_vec()
    }

    fn feed(receiver: &mut FileReceiver, meta: &FileMetadata, data: &[u8], chunk: usize) {
        for fragment in meta.fragments(244).unwrap() {
            receiver.on_packet(&fragment).unwrap();
        }
        for piece in data.chunks(chunk) {
            receiver.on_packet(piece).unwrap();
        }
    }

    #[test]
    fn test_receive_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        let meta = FileMetadata::new("photo.jpg", 1000, integrity::crc32(&data));

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        for fragment in meta.fragments(244).unwrap() {
            receiver.on_packet(&fragment).unwrap();
        }
        assert_eq!(receiver.state(), ReceiverState::ReceivingFile);
        assert_eq!(receiver.metadata(), Some(&meta));

        for piece in data.chunks(244) {
            receiver.on_packet(piece).unwrap();
        }
        assert!(receiver.is_completed());

        let path = dir.path().join("received_photo.jpg");
        assert_eq!(receiver.saved_path(), Some(path.as_path()));
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(receiver.report().unwrap().bytes, 1000);
        assert_eq!(receiver.progress(), 1.0);
    }

    #[test]
    fn test_empty_file_completes_on_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let meta = FileMetadata::new("empty.txt", 0, integrity::crc32(&[]));

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        receiver.on_packet(&record(&meta)).unwrap();

        assert!(receiver.is_completed());
        let saved = std::fs::read(dir.path().join("received_empty.txt")).unwrap();
        assert!(saved.is_empty());
    }

    #[test]
    fn test_crc_mismatch_restarts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0x5Au8; 500];
        let meta = FileMetadata::new("bad.bin", 500, integrity::crc32(&data));

        let mut corrupted = data.clone();
        corrupted[123] ^= 0x01;

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        feed(&mut receiver, &meta, &corrupted, 244);

        assert_eq!(receiver.state(), ReceiverState::ReceivingMetadata);
        assert_eq!(receiver.crc_failures(), 1);
        assert!(receiver.report().is_none());
        assert!(!dir.path().join("received_bad.bin").exists());

        // 재전송된 정상 데이터는 통과
        feed(&mut receiver, &meta, &data, 244);
        assert!(receiver.is_completed());
        assert_eq!(std::fs::read(dir.path().join("received_bad.bin")).unwrap(), data);
    }

    #[test]
    fn test_overflowing_chunk_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"0123456789".to_vec();
        let meta = FileMetadata::new("ten.bin", 10, integrity::crc32(&data));

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        receiver.on_packet(&record(&meta)).unwrap();
        receiver.on_packet(b"01234567").unwrap();
        // 8 + 5 > 10 → 무시
        receiver.on_packet(b"89xyz").unwrap();
        assert_eq!(receiver.state(), ReceiverState::ReceivingFile);
        assert!((receiver.progress() - 0.8).abs() < 1e-9);

        receiver.on_packet(b"89").unwrap();
        assert!(receiver.is_completed());
    }

    #[test]
    fn test_metadata_split_across_small_packets() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![1u8, 2, 3];
        let meta = FileMetadata::new("tiny", 3, integrity::crc32(&data));

        let mut receiver = FileReceiver::new(dir.path(), "out_");
        for piece in record(&meta).chunks(10) {
            assert_eq!(receiver.state(), ReceiverState::ReceivingMetadata);
            receiver.on_packet(piece).unwrap();
        }
        assert_eq!(receiver.state(), ReceiverState::ReceivingFile);
        receiver.on_packet(&data).unwrap();
        assert!(dir.path().join("out_tiny").exists());
    }

    #[test]
    fn test_path_components_stripped_from_name() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"secret".to_vec();
        let meta = FileMetadata::new("../escape.txt", 6, integrity::crc32(&data));

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        feed(&mut receiver, &meta, &data, 244);
        assert!(dir.path().join("received_escape.txt").exists());
    }

    #[test]
    fn test_invalid_name_stays_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let meta = FileMetadata::new("..", 4, 0);

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        receiver.on_packet(&record(&meta)).unwrap();
        assert_eq!(receiver.state(), ReceiverState::ReceivingMetadata);
    }

    #[test]
    fn test_persist_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no").join("such").join("dir");
        let data = vec![3u8; 8];
        let meta = FileMetadata::new("lost.bin", 8, integrity::crc32(&data));

        let mut receiver = FileReceiver::new(&missing, "received_");
        receiver.on_packet(&record(&meta)).unwrap();
        let err = receiver.on_packet(&data).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!missing.join("received_lost.bin").exists());
    }

    #[test]
    fn test_oversized_allocation_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let meta = FileMetadata::new("huge.bin", u64::MAX, 0);

        let mut receiver = FileReceiver::new(dir.path(), "received_");
        let err = receiver.on_packet(&record(&meta)).unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { .. }));
        assert_eq!(record(&meta).len(), RECORD_SIZE);
    }
}
