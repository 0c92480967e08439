use cobble_defs::packet::SELF_ENTITY_ID;
use cobble_util::{packet::ClientboundPacket, ConnectionSender};
use rand::{distr::Alphanumeric, Rng as _};
use tracing::warn;

pub type ConnectionId = u64;

pub const SALT_LENGTH: usize = 16;

/// Entity id as a recipient sees it: −1 for their own entity, the real id
/// (wrapped into i8 like the legacy encoder) otherwise.
pub fn wire_entity_id(entity_id: u8, viewer: Option<u8>) -> i8 {
    if viewer == Some(entity_id) {
        SELF_ENTITY_ID
    } else {
        entity_id as i8
    }
}

/// 16 characters of base62; stable for the process lifetime.
pub fn generate_salt() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// One registered connection as the broadcast fan-out sees it.
#[derive(Debug)]
pub struct Peer {
    pub id: ConnectionId,
    pub sender: ConnectionSender,
    pub entity: Option<u8>,
}

impl Peer {
    /// Best-effort send; a failed peer never aborts a fan-out.
    pub fn send(&self, packet: &impl ClientboundPacket) {
        if let Err(err) = self.sender.send(packet) {
            warn!("Dropping packet for connection {}: {}", self.id, err);
        }
    }
}

/// Insertion-ordered connection registry; all fan-out goes through here.
#[derive(Debug, Default)]
pub struct Fabric {
    peers: Vec<Peer>,
    next_id: ConnectionId,
}

impl Fabric {
    pub fn register(&mut self, sender: ConnectionSender) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.peers.push(Peer {
            id,
            sender,
            entity: None,
        });
        id
    }

    pub fn unregister(&mut self, id: ConnectionId) {
        self.peers.retain(|peer| peer.id != id);
    }

    pub fn set_entity(&mut self, id: ConnectionId, entity: Option<u8>) {
        if let Some(peer) = self.peers.iter_mut().find(|peer| peer.id == id) {
            peer.entity = entity;
        }
    }

    pub fn peer(&self, id: ConnectionId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Sends `packet` to every peer except `exceptions`, in registration
    /// order.
    pub fn broadcast<P: ClientboundPacket>(&self, exceptions: &[ConnectionId], packet: &P) {
        for peer in &self.peers {
            if exceptions.contains(&peer.id) {
                continue;
            }
            peer.send(packet);
        }
    }

    /// Per-recipient variant for packets whose body depends on who receives
    /// it (self-id encoding). `make` returning `None` skips that peer.
    pub fn broadcast_each<P, F>(&self, exceptions: &[ConnectionId], make: F)
    where
        P: ClientboundPacket,
        F: Fn(&Peer) -> Option<P>,
    {
        for peer in &self.peers {
            if exceptions.contains(&peer.id) {
                continue;
            }
            if let Some(packet) = make(peer) {
                peer.send(&packet);
            }
        }
    }
}
