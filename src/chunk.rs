//! 파일 청크 분할과 조립
//!
//! - FileSource: 송신할 파일 전체 + 이름 + CRC
//! - ChunkCursor: 패킷 크기 단위로 다음 청크를 잘라냄
//! - ReceiveBuffer: 수신측 파일 버퍼 (크기 고정, 경계 검사)

use std::path::Path;

use bytes::Bytes;

use crate::integrity;
use crate::metadata::{file_name_of, FileMetadata, MAX_FILENAME_LEN};
use crate::{Error, Result};

/// 송신할 파일
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    data: Bytes,
    crc: u32,
}

impl FileSource {
    /// 디스크에서 파일 로드
    pub fn load(path: &Path) -> Result<Self> {
        let name = file_name_of(path)?;
        let data = std::fs::read(path)?;
        Self::from_bytes(name, data)
    }

    /// 메모리 데이터로 생성
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        if name.len() > MAX_FILENAME_LEN {
            return Err(Error::FilenameTooLong {
                len: name.len(),
                max: MAX_FILENAME_LEN,
            });
        }
        let data = data.into();
        let crc = integrity::crc32(&data);
        Ok(Self { name, data, crc })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// 전송할 메타데이터 레코드
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata::new(self.name.clone(), self.data.len() as u64, self.crc)
    }
}

/// 청크 커서 (송신측)
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    offset: usize,
    chunk_size: usize,
}

impl ChunkCursor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            offset: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// 다음 청크 (min(chunk_size, 남은 바이트)). 끝이면 None
    pub fn next_chunk(&mut self, data: &Bytes) -> Option<Bytes> {
        if self.offset >= data.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(data.len());
        let chunk = data.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// 수신 파일 버퍼
///
/// 메타데이터의 file_size 만큼 한 번에 확보하고, 완료/실패 시 소유자와 함께 해제
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    expected: usize,
}

impl ReceiveBuffer {
    /// 버퍼 확보. 할당 실패는 치명적 에러로 보고
    pub fn allocate(size: u64) -> Result<Self> {
        let expected = usize::try_from(size).map_err(|_| Error::AllocationFailed { size })?;
        let mut data = Vec::new();
        data.try_reserve_exact(expected)
            .map_err(|_| Error::AllocationFailed { size })?;
        Ok(Self { data, expected })
    }

    /// 현재 오프셋에 이어 붙임. file_size 초과 시 거부 (버퍼는 그대로)
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data.len() + bytes.len() > self.expected {
            return Err(Error::BufferOverflow {
                max_size: self.expected,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.data.len() == self.expected
    }

    /// 현재 오프셋
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
