//! Index-addressed buffering of base64 chunks.
//!
//! A [`ChunkBuffer`] only tracks which indices arrived and joins them once
//! all have. Storage I/O happens elsewhere, after the buffer reports
//! completion.

use super::error::{LibraryError, LibraryResult};
use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use std::collections::BTreeMap;

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Strip a `data:<mime>;base64,` prefix and any character outside the base64
/// alphabet (whitespace, quotes and other transport artifacts).
pub fn sanitize_base64(payload: &str) -> String {
    let body = match payload.find(";base64,") {
        Some(pos) => &payload[pos + ";base64,".len()..],
        None if payload.starts_with("data:") => payload
            .split_once(',')
            .map(|(_, rest)| rest)
            .unwrap_or(payload),
        None => payload,
    };
    body.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect()
}

/// Decode sanitized base64.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    LENIENT_BASE64.decode(encoded)
}

/// Chunks received so far for one upload.
#[derive(Debug)]
pub struct ChunkBuffer {
    total: u32,
    chunks: BTreeMap<u32, String>,
    buffered: usize,
}

impl ChunkBuffer {
    pub fn new(total: u32) -> LibraryResult<Self> {
        if total == 0 {
            return Err(LibraryError::InvalidInput(
                "totalChunks must be at least 1".into(),
            ));
        }
        Ok(Self {
            total,
            chunks: BTreeMap::new(),
            buffered: 0,
        })
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of distinct indices filled.
    pub fn received(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.total
    }

    /// Store `payload` at `index`. Returns `false` when the index was already
    /// filled; the first payload wins.
    pub fn insert(&mut self, index: u32, payload: String) -> LibraryResult<bool> {
        if index >= self.total {
            return Err(LibraryError::InvalidInput(format!(
                "chunk index {} out of range for {} chunks",
                index, self.total
            )));
        }
        if self.chunks.contains_key(&index) {
            return Ok(false);
        }
        self.buffered += payload.len();
        self.chunks.insert(index, payload);
        Ok(true)
    }

    /// Indices still missing, ascending.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.total)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    /// Join all chunks in index order and decode them as one base64 string.
    ///
    /// Chunks are joined before decoding because a base64 quantum may span
    /// a chunk boundary.
    pub fn assemble(self) -> LibraryResult<Vec<u8>> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(LibraryError::Fatal(format!(
                "missing chunk indices {:?} of {}",
                missing, self.total
            )));
        }
        let mut joined = String::with_capacity(self.buffered);
        for payload in self.chunks.values() {
            joined.push_str(payload);
        }
        decode_base64(&joined).map_err(|err| LibraryError::Fatal(format!("base64 decode: {}", err)))
    }

    /// Drop all buffered payloads.
    pub fn release(&mut self) {
        self.chunks.clear();
        self.buffered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose;

    fn split(encoded: &str, parts: usize) -> Vec<String> {
        let size = encoded.len().div_ceil(parts);
        encoded
            .as_bytes()
            .chunks(size)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn strips_data_url_prefix_and_noise() {
        assert_eq!(sanitize_base64("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(sanitize_base64("QU\nJD \"=\""), "QUJD=");
        assert_eq!(sanitize_base64("data:,QUJD"), "QUJD");
    }

    #[test]
    fn decodes_across_chunk_boundaries() {
        // 7 bytes encode to 12 chars; 3-char parts never line up with 4-char quanta.
        let data = b"abcdefg".to_vec();
        let encoded = general_purpose::STANDARD.encode(&data);
        let parts = split(&encoded, 5);

        let mut buffer = ChunkBuffer::new(parts.len() as u32).unwrap();
        for (i, part) in parts.into_iter().enumerate().rev() {
            assert!(buffer.insert(i as u32, part).unwrap());
        }
        assert!(buffer.is_complete());
        assert_eq!(buffer.assemble().unwrap(), data);
    }

    #[test]
    fn first_payload_wins_on_replay() {
        let mut buffer = ChunkBuffer::new(2).unwrap();
        assert!(buffer.insert(0, "QU".into()).unwrap());
        assert!(!buffer.insert(0, "ZZ".into()).unwrap());
        assert_eq!(buffer.received(), 1);
        assert_eq!(buffer.missing(), vec![1]);
        assert!(buffer.insert(1, "JD".into()).unwrap());
        assert_eq!(buffer.assemble().unwrap(), b"ABC");
    }

    #[test]
    fn rejects_out_of_range_and_empty() {
        assert!(matches!(ChunkBuffer::new(0), Err(LibraryError::InvalidInput(_))));
        let mut buffer = ChunkBuffer::new(3).unwrap();
        assert!(matches!(
            buffer.insert(3, "QUJD".into()),
            Err(LibraryError::InvalidInput(_))
        ));
    }

    #[test]
    fn incomplete_assembly_is_fatal() {
        let mut buffer = ChunkBuffer::new(3).unwrap();
        buffer.insert(0, "QUJD".into()).unwrap();
        buffer.insert(2, "QUJD".into()).unwrap();
        match buffer.assemble() {
            Err(LibraryError::Fatal(msg)) => assert!(msg.contains("[1]")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
