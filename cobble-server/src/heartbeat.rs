use std::time::Duration;

use cobble_defs::packet::PROTOCOL_VERSION;
use thiserror::Error;
use tracing::debug;

use crate::{
    scheduler::{SchedulerError, TaskResult},
    server::ServerState,
};

pub const HEARTBEAT_TASK: &str = "heartbeat";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum HeartbeatError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Registers the periodic server-list advertisement. Failures are logged at
/// debug and the task simply re-arms; the listing endpoint being down is not
/// a server problem.
pub fn register(state: &ServerState) -> Result<(), HeartbeatError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let interval = state.config.heartbeat_interval;
    let state = state.clone();
    state.scheduler.clone().add_task(HEARTBEAT_TASK, 0, interval, move || {
        let fields = heartbeat_fields(&state);
        match client
            .post(&state.config.heartbeat_url)
            .form(&fields)
            .send()
        {
            Ok(response) => debug!("Heartbeat sent ({})", response.status()),
            Err(err) => debug!("Failed to ping server list! {}", err),
        }
        TaskResult::Wait
    })?;
    Ok(())
}

fn heartbeat_fields(state: &ServerState) -> Vec<(&'static str, String)> {
    let users = state.worlds.lock().unwrap().player_count();
    vec![
        ("port", state.config.port.to_string()),
        ("max", state.config.backlog.to_string()),
        ("name", state.config.name.clone()),
        (
            "public",
            if state.config.public { "True" } else { "False" }.to_owned(),
        ),
        ("version", PROTOCOL_VERSION.to_string()),
        ("salt", state.salt.to_string()),
        ("users", users.to_string()),
        ("software", state.config.software.clone()),
    ]
}
