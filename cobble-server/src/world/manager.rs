use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use cobble_defs::{chat::color, packet};
use cobble_util::packet::ClientboundPacket;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::{
    entity::{Entity, EntityError, UniqueIdAllocator},
    fabric::{wire_entity_id, ConnectionId, Fabric, Peer},
    world::{World, WorldError},
};

pub const MAIN_WORLD: &str = "main";

const PROPERTIES_FILE: &str = "properties.json";

#[derive(Error, Debug)]
pub enum WorldManagerError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    WorldError(#[from] WorldError),
    #[error(transparent)]
    EntityError(#[from] EntityError),
    #[error("Unknown world \"{0}\"")]
    UnknownWorld(String),
    #[error("The main world is not available")]
    MainWorldUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldProperties {
    worlds: Vec<String>,
}

/// Registry of live worlds plus their persistence directory. One entity id
/// pool is shared by every world so ids are unique across the server.
#[derive(Debug)]
pub struct WorldManager {
    directory: PathBuf,
    worlds: BTreeMap<String, World>,
    allocator: UniqueIdAllocator,
}

impl WorldManager {
    /// Boots the world set from `{directory}/properties.json`, creating the
    /// registry (with a single `main` entry) on first start. Worlds listed
    /// but unreadable are skipped — unless `main` is the broken one.
    pub fn setup(directory: impl Into<PathBuf>) -> Result<Self, WorldManagerError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;

        let properties_path = directory.join(PROPERTIES_FILE);
        if !properties_path.exists() {
            let defaults = WorldProperties {
                worlds: vec![MAIN_WORLD.to_owned()],
            };
            std::fs::write(&properties_path, serde_json::to_string_pretty(&defaults)?)?;
        }
        let properties: WorldProperties =
            serde_json::from_str(&std::fs::read_to_string(&properties_path)?)?;

        let mut manager = Self {
            directory,
            worlds: BTreeMap::new(),
            allocator: UniqueIdAllocator::default(),
        };

        for name in &properties.worlds {
            if manager.file_path(name).exists() {
                info!("Loading world [{}]...", name);
                match manager.load_world(name) {
                    Ok(()) => {}
                    Err(err) if name == MAIN_WORLD => return Err(err),
                    Err(err) => error!("Skipping world [{}]: {}", name, err),
                }
            } else {
                info!("Creating new world [{}]...", name);
                manager.create_world(name)?;
            }
        }

        if !manager.worlds.contains_key(MAIN_WORLD) {
            return Err(WorldManagerError::MainWorldUnavailable);
        }
        Ok(manager)
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.dat", name))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn load_world(&mut self, name: &str) -> Result<(), WorldManagerError> {
        let data = std::fs::read(self.file_path(name))?;
        let blocks = World::load(&data)?;
        self.worlds
            .insert(name.to_owned(), World::from_blocks(name, blocks));
        Ok(())
    }

    fn create_world(&mut self, name: &str) -> Result<(), WorldManagerError> {
        let world = World::generate(name);
        std::fs::write(self.file_path(name), world.serialize()?)?;
        self.worlds.insert(name.to_owned(), world);
        Ok(())
    }

    pub fn save(&self, name: &str) -> Result<(), WorldManagerError> {
        let world = self
            .get_world(name)
            .ok_or_else(|| WorldManagerError::UnknownWorld(name.to_owned()))?;
        std::fs::write(self.file_path(name), world.serialize()?)?;
        Ok(())
    }

    pub fn save_all(&self) -> Result<(), WorldManagerError> {
        for name in self.worlds.keys() {
            self.save(name)?;
        }
        Ok(())
    }

    pub fn main_world(&self) -> &World {
        &self.worlds[MAIN_WORLD]
    }

    pub fn get_world(&self, name: &str) -> Option<&World> {
        self.worlds.get(name)
    }

    pub fn get_world_mut(&mut self, name: &str) -> Option<&mut World> {
        self.worlds.get_mut(name)
    }

    pub fn world_names(&self) -> impl Iterator<Item = &str> {
        self.worlds.keys().map(String::as_str)
    }

    pub fn get_world_from_entity(&self, entity_id: u8) -> Option<&World> {
        self.worlds
            .values()
            .find(|world| world.entities().contains(entity_id))
    }

    pub fn get_entity(&self, entity_id: u8) -> Option<&Entity> {
        self.worlds
            .values()
            .find_map(|world| world.entities().get(entity_id))
    }

    pub fn get_entity_mut(&mut self, entity_id: u8) -> Option<&mut Entity> {
        self.worlds
            .values_mut()
            .find_map(|world| world.entities_mut().get_mut(entity_id))
    }

    pub fn get_entity_from_username(&self, username: &str) -> Option<&Entity> {
        self.worlds.values().find_map(|world| {
            world
                .entities()
                .players()
                .find(|entity| entity.username() == Some(username))
        })
    }

    pub fn player_count(&self) -> usize {
        self.worlds
            .values()
            .map(|world| world.entities().players().count())
            .sum()
    }

    /// Allocates an id, registers a fresh player entity in `world_name`, and
    /// announces the join to every connection.
    pub fn add_player(
        &mut self,
        fabric: &Fabric,
        world_name: &str,
        username: &str,
    ) -> Result<u8, WorldManagerError> {
        if !self.worlds.contains_key(world_name) {
            return Err(WorldManagerError::UnknownWorld(world_name.to_owned()));
        }
        let id = self.allocator.allocate()?;
        let entity = Entity::new_player(id, username, world_name);
        self.worlds
            .get_mut(world_name)
            .expect("checked above")
            .entities_mut()
            .insert(entity);

        info!("{} joined world {}", username, world_name);
        fabric.broadcast(
            &[],
            &packet::ServerMessage {
                id: id as i8,
                message: format!(
                    "{}{} joined the game.{}",
                    color::BLUE,
                    username,
                    color::WHITE
                ),
            },
        );
        Ok(id)
    }

    /// Removes the entity from its world, frees the id, despawns it for the
    /// world's peers and announces the departure to everyone.
    pub fn remove_player(&mut self, fabric: &Fabric, connection: ConnectionId, entity_id: u8) {
        let Some(world_name) = self
            .get_world_from_entity(entity_id)
            .map(|world| world.name().to_owned())
        else {
            return;
        };
        let Some(entity) = self
            .worlds
            .get_mut(&world_name)
            .and_then(|world| world.entities_mut().remove(entity_id))
        else {
            return;
        };
        self.allocator.deallocate(entity_id);

        self.broadcast_world(
            fabric,
            &world_name,
            &[connection],
            &packet::DespawnPlayer {
                id: entity_id as i8,
            },
        );

        let username = entity.username().unwrap_or_default();
        info!("{} left world {}", username, world_name);
        fabric.broadcast(
            &[],
            &packet::ServerMessage {
                id: entity_id as i8,
                message: format!("{}{} left the game.{}", color::BLUE, username, color::WHITE),
            },
        );
    }

    /// Spawn exchange after a level stream: the owner sees itself as −1,
    /// then every other entity in the world, and the world's other peers see
    /// the newcomer.
    pub fn update_players(
        &self,
        fabric: &Fabric,
        world_name: &str,
        connection: ConnectionId,
        entity_id: u8,
    ) {
        let Some(world) = self.get_world(world_name) else {
            return;
        };
        let Some(entity) = world.entities().get(entity_id) else {
            return;
        };
        let Some(peer) = fabric.peer(connection) else {
            return;
        };

        peer.send(&spawn_packet(entity, packet::SELF_ENTITY_ID));
        for other in world.entities().players() {
            if other.id == entity_id {
                continue;
            }
            peer.send(&spawn_packet(other, other.id as i8));
        }
        self.broadcast_world_each(fabric, world_name, &[connection], |recipient| {
            Some(spawn_packet(
                entity,
                wire_entity_id(entity_id, recipient.entity),
            ))
        });
    }

    fn world_exceptions(
        &self,
        fabric: &Fabric,
        world_name: &str,
        exceptions: &[ConnectionId],
    ) -> Option<Vec<ConnectionId>> {
        let world = self.get_world(world_name)?;
        // always a copy so callers never observe their list growing
        let mut exceptions = exceptions.to_vec();
        for peer in fabric.peers() {
            let in_world = peer
                .entity
                .map(|id| world.entities().contains(id))
                .unwrap_or(false);
            if !in_world {
                exceptions.push(peer.id);
            }
        }
        Some(exceptions)
    }

    /// Global broadcast narrowed to peers whose entity lives in `world_name`.
    pub fn broadcast_world<P: ClientboundPacket>(
        &self,
        fabric: &Fabric,
        world_name: &str,
        exceptions: &[ConnectionId],
        packet: &P,
    ) {
        if let Some(exceptions) = self.world_exceptions(fabric, world_name, exceptions) {
            fabric.broadcast(&exceptions, packet);
        }
    }

    /// Like [`WorldManager::broadcast_world`] for packets whose body depends
    /// on the recipient.
    pub fn broadcast_world_each<P, F>(
        &self,
        fabric: &Fabric,
        world_name: &str,
        exceptions: &[ConnectionId],
        make: F,
    ) where
        P: ClientboundPacket,
        F: Fn(&Peer) -> Option<P>,
    {
        if let Some(exceptions) = self.world_exceptions(fabric, world_name, exceptions) {
            fabric.broadcast_each(&exceptions, make);
        }
    }
}

pub(crate) fn spawn_packet(entity: &Entity, wire_id: i8) -> packet::SpawnPlayer {
    packet::SpawnPlayer {
        id: wire_id,
        username: entity.username().unwrap_or_default().to_owned(),
        x: entity.x,
        y: entity.y,
        z: entity.z,
        yaw: entity.yaw,
        pitch: entity.pitch,
    }
}
