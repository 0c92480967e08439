//! Typed packet definitions for the classic wire protocol.
//!
//! Clientbound packets implement [`ClientboundPacket`]
//! (server → client), serverbound packets implement
//! [`ServerboundPacket`] (client → server) with a fixed body size for the
//! length-less framing. [`ClientPacket`] is the generated inbound registry.
//!
//! [`ClientboundPacket`]: cobble_util::packet::ClientboundPacket
//! [`ServerboundPacket`]: cobble_util::packet::ServerboundPacket

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Current classic protocol revision; also the handshake version byte.
pub const PROTOCOL_VERSION: u8 = 0x07;

/// The wire id meaning "the recipient's own entity".
pub const SELF_ENTITY_ID: i8 = -1;

/// Block-unit coordinate to wire fixed-point (×32, truncating through i32 so
/// out-of-range values wrap like the legacy encoder instead of saturating).
pub fn to_fixed_point(value: f32) -> i16 {
    (value * 32.0) as i32 as i16
}

/// Wire fixed-point back to block units.
pub fn from_fixed_point(value: i16) -> f32 {
    value as f32 / 32.0
}
