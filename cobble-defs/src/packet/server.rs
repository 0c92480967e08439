use std::io::Write;

use cobble_util::{
    codec::WriteExtPacket as _,
    packet::{ClientboundPacket, ConnectionError},
};

use super::{to_fixed_point, PROTOCOL_VERSION};

/// Handshake reply; the level stream follows immediately after.
#[derive(Debug)]
pub struct ServerIdentification {
    pub name: String,
    pub motd: String,
}

impl ClientboundPacket for ServerIdentification {
    const CLIENTBOUND_ID: u8 = 0x00;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_u8(PROTOCOL_VERSION)?;
        writer.write_string(&self.name)?;
        writer.write_string(&self.motd)?;
        writer.write_u8(0x00)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Ping;

impl ClientboundPacket for Ping {
    const CLIENTBOUND_ID: u8 = 0x01;

    fn packet_write(&self, _writer: impl Write) -> Result<(), ConnectionError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct LevelInitialize;

impl ClientboundPacket for LevelInitialize {
    const CLIENTBOUND_ID: u8 = 0x02;

    fn packet_write(&self, _writer: impl Write) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// One 1024-byte slice of the gzipped level payload. `chunk` holds the
/// useful prefix; padding to the wire width happens at encode.
#[derive(Debug)]
pub struct LevelDataChunk {
    pub chunk: Box<[u8]>,
    pub percent: u8,
}

impl ClientboundPacket for LevelDataChunk {
    const CLIENTBOUND_ID: u8 = 0x03;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i16(self.chunk.len() as i16)?;
        writer.write_array(&self.chunk)?;
        writer.write_u8(self.percent)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct LevelFinalize {
    pub width: i16,
    pub height: i16,
    pub depth: i16,
}

impl ClientboundPacket for LevelFinalize {
    const CLIENTBOUND_ID: u8 = 0x04;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i16(self.width)?;
        writer.write_i16(self.height)?;
        writer.write_i16(self.depth)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SetBlockServer {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub block: u8,
}

impl ClientboundPacket for SetBlockServer {
    const CLIENTBOUND_ID: u8 = 0x06;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i16(self.x)?;
        writer.write_i16(self.y)?;
        writer.write_i16(self.z)?;
        writer.write_u8(self.block)?;
        Ok(())
    }
}

/// Spawns an entity for the recipient. `id` must already be recipient-aware
/// (−1 when the recipient owns the entity).
#[derive(Debug)]
pub struct SpawnPlayer {
    pub id: i8,
    pub username: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: u8,
    pub pitch: u8,
}

impl ClientboundPacket for SpawnPlayer {
    const CLIENTBOUND_ID: u8 = 0x07;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i8(self.id)?;
        writer.write_string(&self.username)?;
        writer.write_i16(to_fixed_point(self.x))?;
        writer.write_i16(to_fixed_point(self.y))?;
        writer.write_i16(to_fixed_point(self.z))?;
        writer.write_u8(self.yaw)?;
        writer.write_u8(self.pitch)?;
        Ok(())
    }
}

/// Absolute teleport. `id` must be recipient-aware like [`SpawnPlayer`].
#[derive(Debug)]
pub struct PositionAndOrientationStatic {
    pub id: i8,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: u8,
    pub pitch: u8,
}

impl ClientboundPacket for PositionAndOrientationStatic {
    const CLIENTBOUND_ID: u8 = 0x08;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i8(self.id)?;
        writer.write_i16(to_fixed_point(self.x))?;
        writer.write_i16(to_fixed_point(self.y))?;
        writer.write_i16(to_fixed_point(self.z))?;
        writer.write_u8(self.yaw)?;
        writer.write_u8(self.pitch)?;
        Ok(())
    }
}

/// Relative movement, deltas in ×32 fixed-point units.
#[derive(Debug)]
pub struct PositionAndOrientationUpdate {
    pub id: i8,
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
    pub yaw: u8,
    pub pitch: u8,
}

impl ClientboundPacket for PositionAndOrientationUpdate {
    const CLIENTBOUND_ID: u8 = 0x09;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i8(self.id)?;
        writer.write_i8(self.dx)?;
        writer.write_i8(self.dy)?;
        writer.write_i8(self.dz)?;
        writer.write_u8(self.yaw)?;
        writer.write_u8(self.pitch)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct DespawnPlayer {
    pub id: i8,
}

impl ClientboundPacket for DespawnPlayer {
    const CLIENTBOUND_ID: u8 = 0x0c;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i8(self.id)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ServerMessage {
    pub id: i8,
    pub message: String,
}

impl ClientboundPacket for ServerMessage {
    const CLIENTBOUND_ID: u8 = 0x0d;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_i8(self.id)?;
        writer.write_string(&self.message)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct DisconnectPlayer {
    pub reason: String,
}

impl ClientboundPacket for DisconnectPlayer {
    const CLIENTBOUND_ID: u8 = 0x0e;

    fn packet_write(&self, mut writer: impl Write) -> Result<(), ConnectionError> {
        writer.write_string(&self.reason)?;
        Ok(())
    }
}
