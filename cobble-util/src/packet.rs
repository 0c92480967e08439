use std::io::{Read, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Unsupported packet ID {0:#04X}")]
    UnsupportedPacket(u8),
    #[error("Invalid raw packet ID for parser (expected: {0}, found: {1})")]
    InvalidRawPacketIdForParser(u8, u8),
}

/// One framed wire packet: a single id byte followed by a fixed-size body.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawPacket {
    pub id: u8,
    pub data: Box<[u8]>,
}

impl RawPacket {
    pub fn new(id: u8, data: Box<[u8]>) -> Self {
        Self { id, data }
    }

    pub fn into_bytes(self) -> Box<[u8]> {
        let mut bytes = Vec::with_capacity(1 + self.data.len());
        bytes.push(self.id);
        bytes.extend_from_slice(&self.data);
        bytes.into_boxed_slice()
    }
}

/// Client → server packets. The protocol has no length framing, so every
/// packet declares its fixed body size up front.
pub trait ServerboundPacket {
    const SERVERBOUND_ID: u8;
    const BODY_SIZE: usize;

    fn serverbound_id(&self) -> u8 {
        Self::SERVERBOUND_ID
    }

    fn packet_read(reader: impl Read) -> Result<Self, ConnectionError>
    where
        Self: Sized;

    fn packet_raw_read(raw: &RawPacket) -> Result<Self, ConnectionError>
    where
        Self: Sized,
    {
        if raw.id != Self::SERVERBOUND_ID {
            return Err(ConnectionError::InvalidRawPacketIdForParser(
                Self::SERVERBOUND_ID,
                raw.id,
            ));
        }
        Self::packet_read(std::io::Cursor::new(&raw.data))
    }
}

/// Server → client packets.
pub trait ClientboundPacket {
    const CLIENTBOUND_ID: u8;

    fn clientbound_id(&self) -> u8 {
        Self::CLIENTBOUND_ID
    }

    fn packet_write(&self, writer: impl Write) -> Result<(), ConnectionError>;

    fn raw_packet(&self) -> Result<RawPacket, ConnectionError> {
        let mut raw_data = Vec::new();
        self.packet_write(&mut raw_data)?;
        Ok(RawPacket {
            id: self.clientbound_id(),
            data: raw_data.into_boxed_slice(),
        })
    }
}

/// The inbound side of a packet registry: id → frame size, id → decoder.
/// Implemented by the enum `serverbound_packet_enum!` generates.
pub trait InboundPacketSet: Sized {
    fn body_size(id: u8) -> Option<usize>;
    fn decode(raw: &RawPacket) -> Result<Self, ConnectionError>;
}

#[macro_export]
macro_rules! serverbound_packet_enum {
    ($enum_vis:vis $enum_name:ident; $($type:ty, $name:ident;)*) => {
        #[derive(Debug)]
        $enum_vis enum $enum_name {
            $(
                $name($type),
            )*
        }

        impl $crate::packet::InboundPacketSet for $enum_name {
            fn body_size(id: u8) -> Option<usize> {
                use $crate::packet::ServerboundPacket as _;
                match id {
                    $(
                        id if id == <$type>::SERVERBOUND_ID => Some(<$type>::BODY_SIZE),
                    )*
                    _ => None,
                }
            }

            fn decode(raw: &$crate::packet::RawPacket) -> std::result::Result<Self, $crate::packet::ConnectionError> {
                use $crate::packet::ServerboundPacket as _;
                let mut reader = std::io::Cursor::new(&raw.data);
                match raw.id {
                    $(
                        id if id == <$type>::SERVERBOUND_ID =>
                            Ok(Self::$name(<$type>::packet_read(&mut reader)?)),
                    )*
                    _ => Err($crate::packet::ConnectionError::UnsupportedPacket(raw.id)),
                }
            }
        }

        impl TryFrom<$crate::packet::RawPacket> for $enum_name {
            type Error = $crate::packet::ConnectionError;

            fn try_from(value: $crate::packet::RawPacket) -> std::result::Result<Self, Self::Error> {
                <Self as $crate::packet::InboundPacketSet>::decode(&value)
            }
        }
    }
}
