//! The shared voxel grid.
//!
//! Cells are stored in one dense byte array indexed as
//! `x + size_x * (z + size_z * y)`. Clients decode the level stream with the
//! same ordering, so it must not change.

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use protocol::{encode_level_sequence, Position};
use std::io::Write;
use thiserror::Error;

pub const AIR: u8 = 0x00;
pub const STONE: u8 = 0x01;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("invalid world dimensions {0}x{1}x{2}")]
    InvalidDimensions(i16, i16, i16),
    #[error("block ({0}, {1}, {2}) is outside the world")]
    OutOfBounds(i16, i16, i16),
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// The single level every joined player shares.
#[derive(Debug, Clone)]
pub struct World {
    name: String,
    size: (i16, i16, i16),
    spawn: Position,
    blocks: Vec<u8>,
}

impl World {
    /// Creates an all-air world. Each dimension must be at least 1 and the
    /// block count must fit the 4-byte level header.
    pub fn new(name: &str, x: i16, y: i16, z: i16) -> Result<Self, WorldError> {
        if x < 1 || y < 1 || z < 1 {
            return Err(WorldError::InvalidDimensions(x, y, z));
        }

        let total = x as u64 * y as u64 * z as u64;
        if total > i32::MAX as u64 {
            return Err(WorldError::InvalidDimensions(x, y, z));
        }

        Ok(Self {
            name: name.to_string(),
            size: (x, y, z),
            spawn: Position::new(x as f32 / 2.0, y as f32 / 2.0 + 2.0, z as f32 / 2.0),
            blocks: vec![AIR; total as usize],
        })
    }

    /// A world whose lower half (up to and including `y / 2`) is solid.
    pub fn flat(name: &str, x: i16, y: i16, z: i16) -> Result<Self, WorldError> {
        let mut world = Self::new(name, x, y, z)?;
        let surface = y / 2;
        let layer = x as usize * z as usize;

        for level in 0..=surface {
            let start = level as usize * layer;
            world.blocks[start..start + layer].fill(STONE);
        }

        info!("Generated flat world '{}' ({}x{}x{})", name, x, y, z);
        Ok(world)
    }

    /// Level name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions as `(x, y, z)`, with `y` pointing up.
    pub fn size(&self) -> (i16, i16, i16) {
        self.size
    }

    /// Where new players appear: the centre column, two blocks above mid-height.
    pub fn spawn(&self) -> Position {
        self.spawn
    }

    pub fn blocks_total(&self) -> usize {
        self.blocks.len()
    }

    /// Whether a coordinate lies inside the grid.
    pub fn contains(&self, x: i16, y: i16, z: i16) -> bool {
        let (sx, sy, sz) = self.size;
        (0..sx).contains(&x) && (0..sy).contains(&y) && (0..sz).contains(&z)
    }

    fn index(&self, x: i16, y: i16, z: i16) -> Option<usize> {
        if !self.contains(x, y, z) {
            return None;
        }
        let (sx, _, sz) = self.size;
        let (x, y, z) = (x as usize, y as usize, z as usize);
        Some(x + sx as usize * (z + sz as usize * y))
    }

    /// Reads one cell; `None` outside the grid.
    pub fn get_block(&self, x: i16, y: i16, z: i16) -> Option<u8> {
        self.index(x, y, z).map(|i| self.blocks[i])
    }

    /// Writes one cell. Coordinates are checked against the dimensions
    /// before indexing.
    pub fn set_block(&mut self, x: i16, y: i16, z: i16, block: u8) -> Result<(), WorldError> {
        let index = self.index(x, y, z).ok_or(WorldError::OutOfBounds(x, y, z))?;
        self.blocks[index] = block;
        Ok(())
    }

    /// The uncompressed level stream: 4-byte big-endian block count, then
    /// the raw block array.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.blocks.len());
        data.extend_from_slice(&(self.blocks.len() as i32).to_be_bytes());
        data.extend_from_slice(&self.blocks);
        data
    }

    /// Gzips the serialized level stream.
    pub fn compress(&self) -> Result<Vec<u8>, WorldError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&(self.blocks.len() as i32).to_be_bytes())?;
        encoder.write_all(&self.blocks)?;
        Ok(encoder.finish()?)
    }

    /// The full `LevelInit` … `LevelFinalize` byte sequence for a joining
    /// session.
    pub fn level_sequence(&self) -> Result<Vec<u8>, WorldError> {
        let compressed = self.compress()?;
        Ok(encode_level_sequence(&compressed, self.size))
    }
}
