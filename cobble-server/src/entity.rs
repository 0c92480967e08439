use std::collections::BTreeMap;

use cobble_defs::chat::PlayerRank;
use thiserror::Error;

/// Ids 0..=254 are assignable; 255 is the on-wire "your own entity" sentinel
/// and must never be handed out.
pub const MAX_ENTITY_IDS: usize = 255;

/// Default spawn point of a freshly generated world.
pub const SPAWN_POSITION: (f32, f32, f32) = (33.0, 34.0, 33.0);

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("No free entity ids")]
    IdsExhausted,
}

/// Fixed pool of entity ids. Allocation always hands out the lowest free id
/// so reconnects are deterministic.
#[derive(Debug)]
pub struct UniqueIdAllocator {
    taken: [bool; MAX_ENTITY_IDS],
}

impl Default for UniqueIdAllocator {
    fn default() -> Self {
        Self {
            taken: [false; MAX_ENTITY_IDS],
        }
    }
}

impl UniqueIdAllocator {
    pub fn allocate(&mut self) -> Result<u8, EntityError> {
        let id = self
            .taken
            .iter()
            .position(|&taken| !taken)
            .ok_or(EntityError::IdsExhausted)?;
        self.taken[id] = true;
        Ok(id as u8)
    }

    /// Returns an id to the pool. Deallocating a free id is a no-op.
    pub fn deallocate(&mut self, id: u8) {
        if (id as usize) < MAX_ENTITY_IDS {
            self.taken[id as usize] = false;
        }
    }

    pub fn live(&self) -> usize {
        self.taken.iter().filter(|&&taken| taken).count()
    }
}

#[derive(Debug, Clone)]
pub struct PlayerData {
    pub username: String,
    pub rank: PlayerRank,
    pub muted: bool,
    /// Bumped on every mute toggle; timed unmutes only fire when their
    /// captured epoch still matches.
    pub mute_epoch: u32,
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Player(PlayerData),
    NonPlayer,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u8,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: u8,
    pub pitch: u8,
    /// Name of the world this entity lives in; the world manager resolves it
    /// back, there is no pointer cycle.
    pub world: String,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new_player(id: u8, username: impl Into<String>, world: impl Into<String>) -> Self {
        let (x, y, z) = SPAWN_POSITION;
        Self {
            id,
            x,
            y,
            z,
            yaw: 0,
            pitch: 0,
            world: world.into(),
            kind: EntityKind::Player(PlayerData {
                username: username.into(),
                rank: PlayerRank::Guest,
                muted: false,
                mute_epoch: 0,
            }),
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(..))
    }

    pub fn player(&self) -> Option<&PlayerData> {
        match &self.kind {
            EntityKind::Player(data) => Some(data),
            EntityKind::NonPlayer => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerData> {
        match &mut self.kind {
            EntityKind::Player(data) => Some(data),
            EntityKind::NonPlayer => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.player().map(|data| data.username.as_str())
    }
}

/// Per-world entity registry keyed by id.
#[derive(Debug, Default)]
pub struct EntityManager {
    entities: BTreeMap<u8, Entity>,
}

impl EntityManager {
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub fn remove(&mut self, id: u8) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: u8) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn players(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|entity| entity.is_player())
    }
}
