//! End-to-end handshake and fan-out scenarios over a live loopback server.

use std::{
    io::{Read as _, Write as _},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use cobble_server::{Server, ServerConfig, ServerState, TaskScheduler};

const GRASS: u8 = 2;

fn start_server(dir: &std::path::Path) -> (SocketAddr, ServerState) {
    let config = ServerConfig {
        address: "127.0.0.1".to_owned(),
        port: 0,
        worlds_directory: dir.join("worlds"),
        ..Default::default()
    };
    let scheduler = TaskScheduler::new();
    let mut server = Server::bind(config, scheduler.handle()).unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state();
    std::thread::spawn(move || {
        let _ = server.run();
    });
    (addr, state)
}

fn verify_key(salt: &str, username: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", salt, username)))
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        Self { stream }
    }

    fn write_string_field(buf: &mut Vec<u8>, value: &str) {
        let mut field = [0x20u8; 64];
        let bytes = value.as_bytes();
        field[..bytes.len()].copy_from_slice(bytes);
        buf.extend_from_slice(&field);
    }

    fn send_identification(&mut self, username: &str, key: &str) {
        let mut buf = vec![0x00, 0x07];
        Self::write_string_field(&mut buf, username);
        Self::write_string_field(&mut buf, key);
        buf.push(0x00);
        self.stream.write_all(&buf).unwrap();
    }

    fn send_set_block(&mut self, x: i16, y: i16, z: i16, mode: u8, block: u8) {
        let mut buf = vec![0x05];
        buf.extend_from_slice(&x.to_be_bytes());
        buf.extend_from_slice(&y.to_be_bytes());
        buf.extend_from_slice(&z.to_be_bytes());
        buf.push(mode);
        buf.push(block);
        self.stream.write_all(&buf).unwrap();
    }

    fn send_position(&mut self, player_id: u8, x: i16, y: i16, z: i16, yaw: u8, pitch: u8) {
        let mut buf = vec![0x08, player_id];
        buf.extend_from_slice(&x.to_be_bytes());
        buf.extend_from_slice(&y.to_be_bytes());
        buf.extend_from_slice(&z.to_be_bytes());
        buf.push(yaw);
        buf.push(pitch);
        self.stream.write_all(&buf).unwrap();
    }

    fn body_size(id: u8) -> usize {
        match id {
            0x00 => 130,
            0x01 | 0x02 => 0,
            0x03 => 1027,
            0x04 => 6,
            0x06 => 7,
            0x07 => 73,
            0x08 => 9,
            0x09 => 6,
            0x0c => 1,
            0x0d => 65,
            0x0e => 64,
            other => panic!("unexpected clientbound packet id {:#04X}", other),
        }
    }

    fn read_packet(&mut self) -> (u8, Vec<u8>) {
        let mut id = [0u8; 1];
        self.stream.read_exact(&mut id).unwrap();
        let mut body = vec![0u8; Self::body_size(id[0])];
        self.stream.read_exact(&mut body).unwrap();
        (id[0], body)
    }

    /// Reads packets, skipping chat messages, until `want` shows up.
    fn read_until(&mut self, want: u8) -> Vec<u8> {
        loop {
            let (id, body) = self.read_packet();
            if id == want {
                return body;
            }
            assert_eq!(id, 0x0d, "unexpected packet {:#04X} while waiting for {:#04X}", id, want);
        }
    }

    fn expect_nothing_for(&mut self, wait: Duration) {
        self.stream.set_read_timeout(Some(wait)).unwrap();
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut => {}
            other => panic!("expected silence, got {:?}", other),
        }
        self.stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
    }

    /// Full join: identification, level stream, own spawn. Returns the
    /// decompressed level payload (length prefix included).
    fn join(&mut self, username: &str, salt: &str) -> Vec<u8> {
        self.send_identification(username, &verify_key(salt, username));

        let ident = self.read_until(0x00);
        assert_eq!(ident[0], 0x07);
        assert_eq!(ident[129], 0x00);

        self.read_until(0x02);

        let mut compressed = Vec::new();
        let finalize = loop {
            let (id, body) = self.read_packet();
            match id {
                0x03 => {
                    let length = i16::from_be_bytes([body[0], body[1]]) as usize;
                    compressed.extend_from_slice(&body[2..2 + length]);
                }
                0x04 => break body,
                0x0d => continue,
                other => panic!("unexpected packet {:#04X} during level stream", other),
            }
        };
        assert_eq!(i16::from_be_bytes([finalize[0], finalize[1]]), 256);
        assert_eq!(i16::from_be_bytes([finalize[2], finalize[3]]), 64);
        assert_eq!(i16::from_be_bytes([finalize[4], finalize[5]]), 256);

        // own spawn arrives as id −1
        let spawn = self.read_until(0x07);
        assert_eq!(spawn[0] as i8, -1);
        let name_field = String::from_utf8_lossy(&spawn[1..65]);
        assert_eq!(name_field.trim_end(), username);
        assert_eq!(i16::from_be_bytes([spawn[65], spawn[66]]), 33 * 32);
        assert_eq!(i16::from_be_bytes([spawn[67], spawn[68]]), 34 * 32);
        assert_eq!(i16::from_be_bytes([spawn[69], spawn[70]]), 33 * 32);

        cobble_util::gzip::decompress(&compressed).unwrap()
    }
}

#[test]
fn join_streams_the_level_and_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(dir.path());

    let mut alice = TestClient::connect(addr);
    let payload = alice.join("Alice", &state.salt);

    let volume = 256 * 64 * 256;
    assert_eq!(
        u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize,
        volume
    );
    let blocks = &payload[4..];
    assert_eq!(blocks.len(), volume);
    // grass at the surface: index = x + 256 * (z + 256 * y), here (0, 32, 0)
    assert_eq!(blocks[256 * 256 * 32], GRASS);

    assert_eq!(state.worlds.lock().unwrap().player_count(), 1);
}

#[test]
fn bad_auth_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _state) = start_server(dir.path());

    let mut client = TestClient::connect(addr);
    client.send_identification("Alice", &"0".repeat(32));

    let (id, body) = client.read_packet();
    assert_eq!(id, 0x0e);
    assert_eq!(
        String::from_utf8_lossy(&body).trim_end(),
        "Not authenticated with classicube.net!"
    );
}

#[test]
fn duplicate_username_is_rejected_before_the_level() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(dir.path());

    let mut alice = TestClient::connect(addr);
    alice.join("Alice", &state.salt);

    let mut imposter = TestClient::connect(addr);
    imposter.send_identification("Alice", &verify_key(&state.salt, "Alice"));
    let (id, body) = imposter.read_packet();
    assert_eq!(id, 0x0e);
    assert_eq!(
        String::from_utf8_lossy(&body).trim_end(),
        "There is already a player logged in with that username!"
    );
}

#[test]
fn peers_see_spawns_despawns_and_block_edits() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(dir.path());

    let mut alice = TestClient::connect(addr);
    alice.join("Alice", &state.salt);

    let mut bob = TestClient::connect(addr);
    bob.join("Bob", &state.salt);

    // Bob's spawn reaches Alice with his real id
    let spawn = alice.read_until(0x07);
    let bob_id = spawn[0] as i8;
    assert!(bob_id >= 0);
    assert_eq!(String::from_utf8_lossy(&spawn[1..65]).trim_end(), "Bob");

    // Bob got Alice's entity right after his own spawn
    let spawn = bob.read_until(0x07);
    assert!(spawn[0] as i8 >= 0);
    assert_eq!(String::from_utf8_lossy(&spawn[1..65]).trim_end(), "Alice");

    // destroy-mode edit turns the cell to air for everyone but the sender
    alice.send_set_block(5, 33, 5, 0, 12);
    let body = bob.read_until(0x06);
    assert_eq!(i16::from_be_bytes([body[0], body[1]]), 5);
    assert_eq!(i16::from_be_bytes([body[2], body[3]]), 33);
    assert_eq!(i16::from_be_bytes([body[4], body[5]]), 5);
    assert_eq!(body[6], 0);
    alice.expect_nothing_for(Duration::from_millis(300));
    assert_eq!(
        state
            .worlds
            .lock()
            .unwrap()
            .get_world("main")
            .unwrap()
            .get_block(5, 33, 5)
            .unwrap(),
        0
    );

    // Alice leaving despawns her for Bob and announces it
    drop(alice);
    let despawn = bob.read_until(0x0c);
    assert_eq!(despawn[0] as i8, 0);
    loop {
        let (id, body) = bob.read_packet();
        assert_eq!(id, 0x0d);
        let message = String::from_utf8_lossy(&body[1..]);
        if message.contains("left the game") {
            assert!(message.contains("Alice"));
            break;
        }
    }
}

#[test]
fn movement_classification_on_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(dir.path());

    let mut alice = TestClient::connect(addr);
    alice.join("Alice", &state.salt);
    let mut bob = TestClient::connect(addr);
    bob.join("Bob", &state.salt);
    alice.read_until(0x07);
    bob.read_until(0x07);

    // one block east of spawn: fits the i8 window, relative update
    alice.send_position(255, 34 * 32, 34 * 32, 33 * 32, 10, 20);
    let body = bob.read_until(0x09);
    assert_eq!(body[0] as i8, 0);
    assert_eq!(body[1] as i8, 32);
    assert_eq!(body[2] as i8, 0);
    assert_eq!(body[3] as i8, 0);
    assert_eq!(body[4], 10);
    assert_eq!(body[5], 20);

    // a long jump falls back to an absolute teleport
    alice.send_position(255, 100 * 32, 34 * 32, 33 * 32, 10, 20);
    let body = bob.read_until(0x08);
    assert_eq!(body[0] as i8, 0);
    assert_eq!(i16::from_be_bytes([body[1], body[2]]), 100 * 32);
    assert_eq!(i16::from_be_bytes([body[3], body[4]]), 34 * 32);
    assert_eq!(i16::from_be_bytes([body[5], body[6]]), 33 * 32);
}

#[test]
fn sand_falls_for_every_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(dir.path());

    let mut alice = TestClient::connect(addr);
    alice.join("Alice", &state.salt);

    // place sand in the air one cell above the surface gap: y=35 over grass
    // at 32 leaves exactly two air cells to fall through
    alice.send_set_block(8, 35, 8, 1, 12);

    // physics fan-out reaches the sender too: sand appears below, the
    // source clears, then the handler's own edit echoes to the others only
    let body = alice.read_until(0x06);
    assert_eq!(i16::from_be_bytes([body[2], body[3]]), 34);
    assert_eq!(body[6], 12);
    let body = alice.read_until(0x06);
    assert_eq!(i16::from_be_bytes([body[2], body[3]]), 35);
    assert_eq!(body[6], 0);

    let worlds = state.worlds.lock().unwrap();
    let world = worlds.get_world("main").unwrap();
    assert_eq!(world.get_block(8, 33, 8).unwrap(), 12);
    assert_eq!(world.get_block(8, 34, 8).unwrap(), 0);
    assert_eq!(world.get_block(8, 35, 8).unwrap(), 0);
}
