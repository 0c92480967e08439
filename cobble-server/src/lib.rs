pub mod client;
pub mod command;
pub mod entity;
pub mod fabric;
pub mod heartbeat;
pub mod scheduler;
pub mod server;
pub mod world;

pub use client::Client;
pub use scheduler::{SchedulerHandle, TaskResult, TaskScheduler};
pub use server::{Server, ServerConfig, ServerError, ServerState};
