use std::io::Read;

use cobble_util::{
    codec::{ReadExtPacket as _, STRING_LENGTH},
    packet::{ConnectionError, ServerboundPacket},
    serverbound_packet_enum,
};

/// Login request; first packet a client ever sends.
#[derive(Debug)]
pub struct PlayerIdentification {
    pub protocol_version: u8,
    pub username: String,
    pub verify_key: String,
    pub client_type: u8,
}

impl ServerboundPacket for PlayerIdentification {
    const SERVERBOUND_ID: u8 = 0x00;
    const BODY_SIZE: usize = 1 + STRING_LENGTH + STRING_LENGTH + 1;

    fn packet_read(mut reader: impl Read) -> Result<Self, ConnectionError>
    where
        Self: Sized,
    {
        Ok(Self {
            protocol_version: reader.read_u8()?,
            username: reader.read_string()?,
            verify_key: reader.read_string()?,
            client_type: reader.read_u8()?,
        })
    }
}

#[derive(Debug)]
pub struct SetBlockClient {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub mode: u8,
    pub block: u8,
}

impl ServerboundPacket for SetBlockClient {
    const SERVERBOUND_ID: u8 = 0x05;
    const BODY_SIZE: usize = 2 + 2 + 2 + 1 + 1;

    fn packet_read(mut reader: impl Read) -> Result<Self, ConnectionError>
    where
        Self: Sized,
    {
        Ok(Self {
            x: reader.read_i16()?,
            y: reader.read_i16()?,
            z: reader.read_i16()?,
            mode: reader.read_u8()?,
            block: reader.read_u8()?,
        })
    }
}

/// Client movement report. Coordinates are ×32 fixed-point; the id is 255
/// when the client refers to its own entity.
#[derive(Debug)]
pub struct PositionAndOrientation {
    pub player_id: u8,
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub yaw: u8,
    pub pitch: u8,
}

impl ServerboundPacket for PositionAndOrientation {
    const SERVERBOUND_ID: u8 = 0x08;
    const BODY_SIZE: usize = 1 + 2 + 2 + 2 + 1 + 1;

    fn packet_read(mut reader: impl Read) -> Result<Self, ConnectionError>
    where
        Self: Sized,
    {
        Ok(Self {
            player_id: reader.read_u8()?,
            x: reader.read_i16()?,
            y: reader.read_i16()?,
            z: reader.read_i16()?,
            yaw: reader.read_u8()?,
            pitch: reader.read_u8()?,
        })
    }
}

#[derive(Debug)]
pub struct ClientMessage {
    pub player_id: u8,
    pub message: String,
}

impl ServerboundPacket for ClientMessage {
    const SERVERBOUND_ID: u8 = 0x0d;
    const BODY_SIZE: usize = 1 + STRING_LENGTH;

    fn packet_read(mut reader: impl Read) -> Result<Self, ConnectionError>
    where
        Self: Sized,
    {
        Ok(Self {
            player_id: reader.read_u8()?,
            message: reader.read_string()?,
        })
    }
}

serverbound_packet_enum!(pub ClientPacket;
    PlayerIdentification, PlayerIdentification;
    SetBlockClient, SetBlockClient;
    PositionAndOrientation, PositionAndOrientation;
    ClientMessage, ClientMessage;
);
