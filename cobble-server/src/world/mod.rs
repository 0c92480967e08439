pub mod manager;
mod physics;

use cobble_defs::block;
use cobble_util::gzip;
use thiserror::Error;

use crate::entity::EntityManager;

pub const WIDTH: usize = 256;
pub const HEIGHT: usize = 64;
pub const DEPTH: usize = 256;
pub const VOLUME: usize = WIDTH * HEIGHT * DEPTH;

/// Ground level of a generated world; grass on top, dirt below, air above.
const SURFACE_Y: i16 = 32;

const COMPRESSION_LEVEL: u32 = 9;

#[derive(Error, Debug)]
pub enum WorldError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Block coordinate ({0}, {1}, {2}) out of range")]
    OutOfRange(i16, i16, i16),
    #[error("Invalid world data file!")]
    CorruptWorld,
}

/// A single cell mutation produced by block physics; callers turn these into
/// `SetBlockServer` broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub block: u8,
}

#[derive(Debug)]
pub struct World {
    name: String,
    blocks: Box<[u8]>,
    entities: EntityManager,
}

impl World {
    /// Flat terrain: air above the surface, grass at it, dirt below.
    pub fn generate(name: impl Into<String>) -> Self {
        let mut blocks = vec![0u8; VOLUME].into_boxed_slice();
        for y in 0..HEIGHT as i16 {
            let block = match y {
                y if y > SURFACE_Y => block::AIR,
                y if y == SURFACE_Y => block::GRASS,
                _ => block::DIRT,
            };
            if block == block::AIR {
                continue;
            }
            for x in 0..WIDTH as i16 {
                for z in 0..DEPTH as i16 {
                    blocks[Self::index(x, y, z)] = block;
                }
            }
        }
        Self {
            name: name.into(),
            blocks,
            entities: EntityManager::default(),
        }
    }

    pub fn from_blocks(name: impl Into<String>, blocks: Box<[u8]>) -> Self {
        Self {
            name: name.into(),
            blocks,
            entities: EntityManager::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> i16 {
        WIDTH as i16
    }

    pub fn height(&self) -> i16 {
        HEIGHT as i16
    }

    pub fn depth(&self) -> i16 {
        DEPTH as i16
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    pub fn in_range(x: i16, y: i16, z: i16) -> bool {
        (0..WIDTH as i16).contains(&x)
            && (0..HEIGHT as i16).contains(&y)
            && (0..DEPTH as i16).contains(&z)
    }

    fn index(x: i16, y: i16, z: i16) -> usize {
        x as usize + DEPTH * (z as usize + WIDTH * y as usize)
    }

    pub fn get_block(&self, x: i16, y: i16, z: i16) -> Result<u8, WorldError> {
        if !Self::in_range(x, y, z) {
            return Err(WorldError::OutOfRange(x, y, z));
        }
        Ok(self.blocks[Self::index(x, y, z)])
    }

    /// Writes a cell without triggering physics.
    pub fn set_block_raw(&mut self, x: i16, y: i16, z: i16, block: u8) -> Result<(), WorldError> {
        if !Self::in_range(x, y, z) {
            return Err(WorldError::OutOfRange(x, y, z));
        }
        self.blocks[Self::index(x, y, z)] = block;
        Ok(())
    }

    /// Writes a cell and runs block physics; every follow-up cell mutation is
    /// applied to the volume and appended to `changes`.
    pub fn set_block(
        &mut self,
        x: i16,
        y: i16,
        z: i16,
        block: u8,
        changes: &mut Vec<BlockChange>,
    ) -> Result<(), WorldError> {
        self.set_block_raw(x, y, z, block)?;
        physics::update(self, x, y, z, block, changes);
        Ok(())
    }

    /// `gzip(u32_be(len) || blocks)` — the level stream and `.dat` payload.
    pub fn serialize(&self) -> std::io::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(4 + self.blocks.len());
        payload.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes());
        payload.extend_from_slice(&self.blocks);
        gzip::compress(&payload, COMPRESSION_LEVEL)
    }

    /// Inverse of [`World::serialize`]; the length prefix and the fixed
    /// volume both have to check out.
    pub fn load(data: &[u8]) -> Result<Box<[u8]>, WorldError> {
        let unpacked = gzip::decompress(data).map_err(|_| WorldError::CorruptWorld)?;
        let Some((prefix, payload)) = unpacked.split_first_chunk::<4>() else {
            return Err(WorldError::CorruptWorld);
        };
        let payload_length = u32::from_be_bytes(*prefix) as usize;
        if payload_length != payload.len() || payload.len() != VOLUME {
            return Err(WorldError::CorruptWorld);
        }
        Ok(payload.into())
    }
}
