//! CRC32 무결성 검사
//!
//! 표준 반사형 CRC-32 (다항식 0xEDB88320, 초기값/최종값 반전).
//! 계산은 crc32fast 가 담당

use crate::{Error, Result};

/// 반사 다항식
const POLYNOMIAL: u32 = 0xEDB8_8320;

/// 점진적 CRC32 계산기
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// 한 번에 CRC32 계산
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// 비트 단위 CRC32 (참조 구현, 결과는 [`crc32`]와 동일)
pub fn crc32_bitwise(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLYNOMIAL & mask);
        }
    }
    !crc
}

/// CRC 검증
pub fn verify(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

/// CRC 검증 (불일치 시 계산값을 담은 에러)
pub fn check(data: &[u8], expected: u32) -> Result<()> {
    let got = crc32(data);
    if got != expected {
        return Err(Error::CrcMismatch { expected, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_table_and_bitwise_agree() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i ^ (i >> 3)) as u8).collect();
        for len in [0, 1, 2, 3, 15, 16, 17, 63, 64, 65, 255, 256, 257, 4096, 10_000] {
            assert_eq!(crc32(&data[..len]), crc32_bitwise(&data[..len]));
        }
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"incremental crc over several slices";
        let mut hasher = Crc32::new();
        for part in data.chunks(5) {
            hasher.update(part);
        }
        assert_eq!(hasher.finalize(), crc32(data));
        assert_eq!(Crc32::new().finalize(), 0);
    }

    #[test]
    fn test_verify_and_single_bit_flip() {
        let mut data = vec![0x5Au8; 1000];
        let crc = crc32(&data);
        assert!(verify(&data, crc));

        for bit in [0usize, 7, 4000, 7999] {
            data[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&data, crc));
            data[bit / 8] ^= 1 << (bit % 8);
        }
        assert!(verify(&data, crc));
    }

    #[test]
    fn test_check_reports_both_values() {
        let data = b"payload";
        assert!(check(data, crc32(data)).is_ok());
        assert!(matches!(
            check(data, 0x1234_5678),
            Err(Error::CrcMismatch { expected: 0x1234_5678, got }) if got == crc32(data)
        ));
    }
}
