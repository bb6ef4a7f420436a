//! 파일 메타데이터 레코드
//!
//! 고정 269바이트 레이아웃:
//!
//! ```text
//! [filename:256, NUL 패딩][file_size:8 LE][crc:4 LE][is_last:1]
//! ```
//!
//! 패킷 하나보다 클 수 있으므로 여러 조각으로 나눠 전송하고 수신측에서 조립

use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::{Error, Result};

/// 파일 이름 필드 크기
pub const FILENAME_FIELD_SIZE: usize = 256;

/// 파일 이름 최대 길이 (NUL 종단 1바이트 제외)
pub const MAX_FILENAME_LEN: usize = FILENAME_FIELD_SIZE - 1;

/// 직렬화된 레코드 크기
pub const RECORD_SIZE: usize = FILENAME_FIELD_SIZE + 8 + 4 + 1;

/// 파일 메타데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// 파일 이름 (경로 제외)
    pub filename: String,

    /// 전체 파일 크기 (바이트)
    pub file_size: u64,

    /// 전체 파일 CRC32
    pub crc: u32,

    /// 마지막 청크 여부
    pub is_last: bool,
}

impl FileMetadata {
    pub fn new(filename: impl Into<String>, file_size: u64, crc: u32) -> Self {
        Self {
            filename: filename.into(),
            file_size,
            crc,
            is_last: false,
        }
    }

    /// 레코드로 직렬화
    pub fn to_bytes(&self) -> Result<Bytes> {
        let name = self.filename.as_bytes();
        if name.len() > MAX_FILENAME_LEN {
            return Err(Error::FilenameTooLong {
                len: name.len(),
                max: MAX_FILENAME_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        buf.put_slice(name);
        buf.put_bytes(0, FILENAME_FIELD_SIZE - name.len());
        buf.put_u64_le(self.file_size);
        buf.put_u32_le(self.crc);
        buf.put_u8(u8::from(self.is_last));
        debug_assert_eq!(buf.len(), RECORD_SIZE);

        Ok(buf.freeze())
    }

    /// 레코드에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(Error::InvalidMetadata(format!(
                "레코드 크기 {} (기대값 {})",
                bytes.len(),
                RECORD_SIZE
            )));
        }

        let (name_field, mut rest) = bytes.split_at(FILENAME_FIELD_SIZE);
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_FIELD_SIZE);
        let filename = std::str::from_utf8(&name_field[..name_len])
            .map_err(|_| Error::InvalidMetadata("파일 이름이 UTF-8 아님".into()))?
            .to_string();

        let file_size = rest.get_u64_le();
        let crc = rest.get_u32_le();
        let is_last = rest.get_u8() != 0;

        Ok(Self {
            filename,
            file_size,
            crc,
            is_last,
        })
    }

    /// 레코드를 fragment_size 단위 조각으로 분할
    pub fn fragments(&self, fragment_size: usize) -> Result<Vec<Bytes>> {
        let record = self.to_bytes()?;
        let fragment_size = fragment_size.max(1);
        Ok((0..record.len())
            .step_by(fragment_size)
            .map(|start| record.slice(start..(start + fragment_size).min(record.len())))
            .collect())
    }

    /// 저장에 안전한 파일 이름 (디렉터리 성분 제거)
    pub fn safe_file_name(&self) -> Result<String> {
        file_name_of(Path::new(&self.filename))
    }
}

/// 경로의 마지막 성분을 파일 이름으로 추출
pub fn file_name_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(Error::InvalidFilename)?;
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidFilename);
    }
    Ok(name.to_string())
}

/// 메타데이터 조각 조립기
///
/// 수신자 인스턴스가 소유. 조각 경계와 무관하게 RECORD_SIZE 바이트가 모이면 완성
#[derive(Debug, Default)]
pub struct MetadataAssembler {
    buf: BytesMut,
}

impl MetadataAssembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(RECORD_SIZE),
        }
    }

    /// 조각 추가. 레코드가 완성되면 파싱 결과 반환
    pub fn push(&mut self, data: &[u8]) -> Result<Option<FileMetadata>> {
        let take = (RECORD_SIZE - self.buf.len()).min(data.len());
        self.buf.put_slice(&data[..take]);
        if take < data.len() {
            debug!("메타데이터 잉여 바이트 폐기: {} bytes", data.len() - take);
        }

        if self.buf.len() < RECORD_SIZE {
            return Ok(None);
        }

        let record = self.buf.split();
        FileMetadata::from_bytes(&record).map(Some)
    }

    /// 현재까지 모인 바이트 수
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
