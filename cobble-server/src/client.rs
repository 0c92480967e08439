use cobble_defs::{
    block,
    chat::{color, ClickMode},
    packet::{self, from_fixed_point},
};
use cobble_util::{codec::ARRAY_LENGTH, Connection, ConnectionError};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    command,
    entity::EntityError,
    fabric::{wire_entity_id, ConnectionId},
    server::ServerState,
    world::{
        manager::{WorldManagerError, MAIN_WORLD},
        WorldError,
    },
};

/// Outbound bytes a peer may have pending before it is considered stalled
/// and dropped instead of blocking the loop.
const OUTBOUND_HIGH_WATER: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    ConnectionError(#[from] ConnectionError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    WorldManagerError(#[from] WorldManagerError),
}

/// One TCP peer: its framed connection, registry id, and (after a
/// successful handshake) the entity it controls.
#[derive(Debug)]
pub struct Client {
    pub(crate) connection: Connection,
    pub(crate) state: ServerState,
    pub(crate) connection_id: ConnectionId,
    pub(crate) entity_id: Option<u8>,
}

impl Client {
    pub fn new(connection: Connection, state: ServerState) -> Self {
        let connection_id = state.fabric.lock().unwrap().register(connection.sender());
        Self {
            connection,
            state,
            connection_id,
            entity_id: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub fn entity_id(&self) -> Option<u8> {
        self.entity_id
    }

    /// Final cleanup once the socket is gone: leave the world (despawn,
    /// free the id, announce) and drop out of the broadcast registry.
    pub fn teardown(&self) {
        let mut worlds = self.state.worlds.lock().unwrap();
        let mut fabric = self.state.fabric.lock().unwrap();
        fabric.unregister(self.connection_id);
        if let Some(entity_id) = self.entity_id {
            worlds.remove_player(&fabric, self.connection_id, entity_id);
        }
    }

    /// Drains every complete inbound frame and retries pending outbound
    /// bytes. Call once per server tick.
    pub fn update(&mut self) -> Result<(), ClientError> {
        self.connection.flush()?;
        if self.connection.pending_outbound() > OUTBOUND_HIGH_WATER {
            warn!(
                "Connection {} overloaded ({} bytes pending)",
                self.connection_id,
                self.connection.pending_outbound()
            );
            return self.disconnect("Server overloaded.");
        }

        loop {
            match self.connection.recieve_into::<packet::ClientPacket>() {
                Ok(Some(packet)) => self.handle_packet(packet)?,
                Ok(None) => break,
                Err(ConnectionError::UnsupportedPacket(id)) => {
                    warn!("Discarding incoming packet {:#04X}!", id);
                }
                Err(_) => {
                    // malformed stream: drop the peer, nothing to report
                    self.connection.close();
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: packet::ClientPacket) -> Result<(), ClientError> {
        match packet {
            packet::ClientPacket::PlayerIdentification(p) => self.handle_identification(p),
            packet::ClientPacket::SetBlockClient(p) => self.handle_set_block(p),
            packet::ClientPacket::PositionAndOrientation(p) => self.handle_position(p),
            packet::ClientPacket::ClientMessage(p) => self.handle_message(p),
        }
    }

    fn disconnect(&self, reason: &str) -> Result<(), ClientError> {
        self.connection.send(&packet::DisconnectPlayer {
            reason: reason.to_owned(),
        })?;
        self.connection.close();
        Ok(())
    }

    fn handle_identification(
        &mut self,
        p: packet::PlayerIdentification,
    ) -> Result<(), ClientError> {
        let name_taken = self
            .state
            .worlds
            .lock()
            .unwrap()
            .get_entity_from_username(&p.username)
            .is_some();
        if name_taken {
            return self.disconnect("There is already a player logged in with that username!");
        }

        let expected = compute_verify_key(&self.state.salt, &p.username);
        if !constant_time_eq(expected.as_bytes(), p.verify_key.as_bytes()) {
            return self.disconnect("Not authenticated with classicube.net!");
        }

        self.begin_session(&p.username, None)
    }

    /// The identification chain: join the target world (leaving the current
    /// one when teleporting), then stream `ServerIdentification` →
    /// `LevelInitialize` → data chunks → `LevelFinalize` → the spawn
    /// exchange. `/goto` re-runs this with a world name.
    pub(crate) fn begin_session(
        &mut self,
        username: &str,
        world_name: Option<&str>,
    ) -> Result<(), ClientError> {
        let target = world_name.unwrap_or(MAIN_WORLD).to_owned();

        let mut worlds = self.state.worlds.lock().unwrap();
        let mut fabric = self.state.fabric.lock().unwrap();

        if let Some(entity_id) = self.entity_id.take() {
            worlds.remove_player(&fabric, self.connection_id, entity_id);
            fabric.set_entity(self.connection_id, None);
        }

        let entity_id = match worlds.add_player(&fabric, &target, username) {
            Ok(id) => id,
            Err(WorldManagerError::EntityError(EntityError::IdsExhausted)) => {
                drop(fabric);
                drop(worlds);
                return self.disconnect("Server full.");
            }
            Err(err) => return Err(err.into()),
        };
        self.entity_id = Some(entity_id);
        fabric.set_entity(self.connection_id, Some(entity_id));

        self.connection.send(&packet::ServerIdentification {
            name: self.state.config.name.clone(),
            motd: self.state.config.motd.clone(),
        })?;

        self.connection.send(&packet::LevelInitialize)?;
        let world = worlds.get_world(&target).expect("player was just added");
        let serialized = world.serialize()?;
        for (index, chunk) in serialized.chunks(ARRAY_LENGTH).enumerate() {
            // legacy percent arithmetic: integer division by the chunk
            // length, not the chunk count
            let percent = ((100 / chunk.len()) * index) as u8;
            self.connection.send(&packet::LevelDataChunk {
                chunk: chunk.into(),
                percent,
            })?;
        }
        self.connection.send(&packet::LevelFinalize {
            width: world.width(),
            height: world.height(),
            depth: world.depth(),
        })?;

        worlds.update_players(&fabric, &target, self.connection_id, entity_id);
        Ok(())
    }

    fn handle_set_block(&mut self, p: packet::SetBlockClient) -> Result<(), ClientError> {
        let Some(entity_id) = self.entity_id else {
            return Ok(());
        };
        let mut worlds = self.state.worlds.lock().unwrap();
        let fabric = self.state.fabric.lock().unwrap();
        let Some(world_name) = worlds
            .get_world_from_entity(entity_id)
            .map(|world| world.name().to_owned())
        else {
            return Ok(());
        };

        let block = match ClickMode::from_wire(p.mode) {
            ClickMode::Destroy => block::AIR,
            ClickMode::Place => p.block,
        };

        let mut changes = Vec::new();
        match worlds
            .get_world_mut(&world_name)
            .expect("entity is in this world")
            .set_block(p.x, p.y, p.z, block, &mut changes)
        {
            // out-of-range edits are ignored without a reply
            Err(WorldError::OutOfRange(..)) => return Ok(()),
            Err(err) => return Err(WorldManagerError::from(err).into()),
            Ok(()) => {}
        }

        // physics results reach every connection, then the edited cell goes
        // to the world's other peers
        for change in &changes {
            fabric.broadcast(
                &[],
                &packet::SetBlockServer {
                    x: change.x,
                    y: change.y,
                    z: change.z,
                    block: change.block,
                },
            );
        }
        worlds.broadcast_world(
            &fabric,
            &world_name,
            &[self.connection_id],
            &packet::SetBlockServer {
                x: p.x,
                y: p.y,
                z: p.z,
                block,
            },
        );
        Ok(())
    }

    fn handle_position(&mut self, p: packet::PositionAndOrientation) -> Result<(), ClientError> {
        let Some(entity_id) = self.entity_id else {
            return Ok(());
        };
        let x = from_fixed_point(p.x);
        let y = from_fixed_point(p.y);
        let z = from_fixed_point(p.z);

        let mut worlds = self.state.worlds.lock().unwrap();
        let fabric = self.state.fabric.lock().unwrap();
        let Some(world_name) = worlds
            .get_world_from_entity(entity_id)
            .map(|world| world.name().to_owned())
        else {
            return Ok(());
        };

        let (dx, dy, dz, yaw, pitch) = {
            let Some(entity) = worlds.get_entity_mut(entity_id) else {
                return Ok(());
            };
            let dx = -(entity.x - x) * 32.0;
            let dy = -(entity.y - y) * 32.0;
            let dz = -(entity.z - z) * 32.0;
            entity.x = x;
            entity.y = y;
            entity.z = z;
            entity.yaw = p.yaw;
            entity.pitch = p.pitch;
            (dx, dy, dz, entity.yaw, entity.pitch)
        };

        let fits_i8 = |v: f32| (-128.0..=127.0).contains(&v);
        if !fits_i8(dx) || !fits_i8(dy) || !fits_i8(dz) {
            // moved too far for a relative update: teleport instead
            worlds.broadcast_world_each(
                &fabric,
                &world_name,
                &[self.connection_id],
                |peer| {
                    Some(packet::PositionAndOrientationStatic {
                        id: wire_entity_id(entity_id, peer.entity),
                        x,
                        y,
                        z,
                        yaw,
                        pitch,
                    })
                },
            );
            return Ok(());
        }

        let reported = if p.player_id == 255 {
            entity_id
        } else {
            p.player_id
        };
        worlds.broadcast_world(
            &fabric,
            &world_name,
            &[self.connection_id],
            &packet::PositionAndOrientationUpdate {
                id: reported as i8,
                dx: dx as i8,
                dy: dy as i8,
                dz: dz as i8,
                yaw,
                pitch,
            },
        );
        Ok(())
    }

    fn handle_message(&mut self, p: packet::ClientMessage) -> Result<(), ClientError> {
        let Some(entity_id) = self.entity_id else {
            return Ok(());
        };
        let (username, rank, muted) = {
            let worlds = self.state.worlds.lock().unwrap();
            let Some(player) = worlds.get_entity(entity_id).and_then(|e| e.player()) else {
                return Ok(());
            };
            (player.username.clone(), player.rank, player.muted)
        };
        if muted {
            return Ok(());
        }

        if command::is_command(&p.message) {
            let responses = command::dispatch(self, &username, rank, &p.message);
            for line in responses {
                self.connection.send(&packet::ServerMessage {
                    id: entity_id as i8,
                    message: line,
                })?;
            }
            return Ok(());
        }

        let message = sanitize(&p.message);
        info!("{}: {}", username, message);
        let formatted = format!(
            "{}{}{}: {}",
            rank.chat_color(),
            username,
            color::WHITE,
            message
        );
        self.state.fabric.lock().unwrap().broadcast(
            &[],
            &packet::ServerMessage {
                id: entity_id as i8,
                message: formatted,
            },
        );
        Ok(())
    }
}

/// A trailing ampersand reads as an empty color code and crashes the
/// original client; drop it.
fn sanitize(message: &str) -> &str {
    message.strip_suffix('&').unwrap_or(message)
}

pub(crate) fn compute_verify_key(salt: &str, username: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", salt, username)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verify_key_is_lowercase_md5_of_salt_then_username() {
        // md5("abcdef0123456789Alice")
        let key = compute_verify_key("abcdef0123456789", "Alice");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key, format!("{:x}", md5::compute(b"abcdef0123456789Alice")));
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"Same"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn sanitize_strips_one_trailing_ampersand() {
        assert_eq!(sanitize("hello&"), "hello");
        assert_eq!(sanitize("hello"), "hello");
        assert_eq!(sanitize("&chello"), "&chello");
        assert_eq!(sanitize("hello&&"), "hello&");
    }

    #[test]
    fn movement_delta_window() {
        let fits_i8 = |v: f32| (-128.0..=127.0).contains(&v);
        // 127 fixed-point units is the largest relative step
        assert!(fits_i8(127.0));
        assert!(fits_i8(-128.0));
        assert!(!fits_i8(127.5));
        assert!(!fits_i8(-128.5));
        // 3.96875 blocks * 32 = 127
        assert!(fits_i8(3.96875 * 32.0));
        assert!(!fits_i8(4.03125 * 32.0));
    }
}
