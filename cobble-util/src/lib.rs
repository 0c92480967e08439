pub mod codec;
pub mod connection;
pub mod gzip;
pub mod packet;

pub use codec::{ReadExtPacket, WriteExtPacket, ARRAY_LENGTH, STRING_LENGTH};
pub use connection::{Connection, ConnectionSender};
pub use packet::{ClientboundPacket, ConnectionError, RawPacket, ServerboundPacket};
