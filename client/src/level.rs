//! Reassembly of the chunked, gzip-compressed level stream.

use flate2::read::GzDecoder;
use protocol::CHUNK_SIZE;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("chunk declares invalid length {0}")]
    InvalidChunkLength(i16),
    #[error("level stream could not be decompressed: {0}")]
    Decompress(#[from] std::io::Error),
    #[error("level stream is shorter than its header")]
    Truncated,
    #[error("level header declares {declared} blocks, dimensions need {expected}")]
    HeaderMismatch { declared: i64, expected: i64 },
}

/// Collects `LevelDataChunk` payloads until `LevelFinalize` arrives.
#[derive(Debug, Default)]
pub struct LevelDownload {
    compressed: Vec<u8>,
    chunks: usize,
    percent: u8,
}

impl LevelDownload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, length: i16, data: &[u8; CHUNK_SIZE], percent: u8) -> Result<(), LevelError> {
        if length < 0 || length as usize > CHUNK_SIZE {
            return Err(LevelError::InvalidChunkLength(length));
        }
        self.compressed.extend_from_slice(&data[..length as usize]);
        self.chunks += 1;
        self.percent = percent;
        Ok(())
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed.len()
    }

    /// Decompresses the collected stream and checks its block count against
    /// the dimensions from `LevelFinalize`.
    pub fn finish(self, size: (i16, i16, i16)) -> Result<Level, LevelError> {
        let mut raw = Vec::new();
        GzDecoder::new(&self.compressed[..]).read_to_end(&mut raw)?;

        if raw.len() < 4 {
            return Err(LevelError::Truncated);
        }
        let declared = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64;
        let expected = size.0 as i64 * size.1 as i64 * size.2 as i64;
        if declared != expected || raw.len() as i64 - 4 != expected {
            return Err(LevelError::HeaderMismatch { declared, expected });
        }

        raw.drain(..4);
        Ok(Level { size, blocks: raw })
    }
}

/// A downloaded world, indexed the same way the server stores it.
#[derive(Debug, Clone)]
pub struct Level {
    pub size: (i16, i16, i16),
    pub blocks: Vec<u8>,
}

impl Level {
    fn index(&self, x: i16, y: i16, z: i16) -> Option<usize> {
        let (sx, sy, sz) = self.size;
        if !(0..sx).contains(&x) || !(0..sy).contains(&y) || !(0..sz).contains(&z) {
            return None;
        }
        Some(x as usize + sx as usize * (z as usize + sz as usize * y as usize))
    }

    pub fn get_block(&self, x: i16, y: i16, z: i16) -> Option<u8> {
        self.index(x, y, z).map(|i| self.blocks[i])
    }

    /// Applies a `SetBlock` echo. Returns false for coordinates outside the level.
    pub fn set_block(&mut self, x: i16, y: i16, z: i16, block: u8) -> bool {
        match self.index(x, y, z) {
            Some(i) => {
                self.blocks[i] = block;
                true
            }
            None => false,
        }
    }
}
