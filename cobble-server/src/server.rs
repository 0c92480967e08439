use std::{
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use cobble_defs::packet;
use cobble_util::Connection;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    client::Client,
    fabric::{generate_salt, Fabric},
    scheduler::{SchedulerError, SchedulerHandle, TaskResult},
    world::manager::{WorldManager, WorldManagerError},
};

const LOOP_SLEEP: Duration = Duration::from_millis(1);
const PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    WorldManagerError(#[from] WorldManagerError),
    #[error(transparent)]
    SchedulerError(#[from] SchedulerError),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Connection cap; also advertised as `max` in the heartbeat.
    pub backlog: u32,
    pub name: String,
    pub motd: String,
    pub software: String,
    pub public: bool,
    pub worlds_directory: PathBuf,
    pub heartbeat_url: String,
    pub heartbeat_interval: Duration,
    pub autosave_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_owned(),
            port: 25565,
            backlog: 1024,
            name: "Cobble Minecraft Server".to_owned(),
            motd: "Welcome to the Cobble Minecraft Classic server...".to_owned(),
            software: format!("Cobble v{}", env!("CARGO_PKG_VERSION")),
            public: true,
            worlds_directory: PathBuf::from("worlds"),
            heartbeat_url: "http://www.classicube.net/server/heartbeat".to_owned(),
            heartbeat_interval: Duration::from_secs(45),
            autosave_interval: Duration::from_secs(300),
        }
    }
}

/// Everything a client handler or scheduler task needs, behind clonable
/// handles. Lock order is always worlds before fabric.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub salt: Arc<str>,
    pub worlds: Arc<Mutex<WorldManager>>,
    pub fabric: Arc<Mutex<Fabric>>,
    pub scheduler: SchedulerHandle,
}

/// The I/O loop owner: accepts connections and ticks every client; periodic
/// work (ping, autosave, heartbeat) runs on the scheduler worker.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: ServerState,
    clients: Vec<Client>,
}

impl Server {
    pub fn bind(config: ServerConfig, scheduler: SchedulerHandle) -> Result<Self, ServerError> {
        info!("Starting up, please wait...");
        let worlds = WorldManager::setup(&config.worlds_directory)?;

        let listener = TcpListener::bind((config.address.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        info!("Server started on {}", listener.local_addr()?);

        let state = ServerState {
            config: Arc::new(config),
            salt: generate_salt().into(),
            worlds: Arc::new(Mutex::new(worlds)),
            fabric: Arc::new(Mutex::new(Fabric::default())),
            scheduler,
        };

        let server = Self {
            listener,
            state,
            clients: Vec::new(),
        };
        server.register_tasks()?;
        Ok(server)
    }

    fn register_tasks(&self) -> Result<(), SchedulerError> {
        let state = self.state.clone();
        self.state
            .scheduler
            .add_task("ping", 0, PING_INTERVAL, move || {
                state.fabric.lock().unwrap().broadcast(&[], &packet::Ping);
                TaskResult::Wait
            })?;

        let state = self.state.clone();
        self.state
            .scheduler
            .add_task("autosave", 10, state.config.autosave_interval, move || {
                if let Err(err) = state.worlds.lock().unwrap().save_all() {
                    warn!("Autosave failed: {}", err);
                }
                TaskResult::Wait
            })?;
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.state.clone()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            std::thread::sleep(LOOP_SLEEP);
            self.tick()?;
        }
    }

    /// One pass of the I/O loop; exposed so tests can drive the server
    /// without the sleep cadence.
    pub fn tick(&mut self) -> Result<(), ServerError> {
        self.accept_new();
        self.update_clients();
        Ok(())
    }

    fn accept_new(&mut self) {
        while let Ok((stream, address)) = self.listener.accept() {
            if self.clients.len() >= self.state.config.backlog as usize {
                debug!("Refusing connection from {}: server at capacity", address);
                continue;
            }
            match Connection::new(stream) {
                Ok(connection) => {
                    debug!("Connection from {}", address);
                    self.clients.push(Client::new(connection, self.state.clone()));
                }
                Err(err) => warn!("Failed to accept {}: {}", address, err),
            }
        }
    }

    fn update_clients(&mut self) {
        for client in &mut self.clients {
            if let Err(err) = client.update() {
                warn!("Client error: {}", err);
                client.close();
            }
        }

        let mut index = 0;
        while index < self.clients.len() {
            if self.clients[index].is_closed() {
                let client = self.clients.remove(index);
                client.teardown();
            } else {
                index += 1;
            }
        }
    }
}
