use std::time::Duration;

use cobble_defs::{
    chat::{color, PlayerRank},
    packet,
};
use itertools::Itertools as _;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    client::{Client, ClientError},
    fabric::wire_entity_id,
    scheduler::{SchedulerError, TaskResult},
    world::manager::WorldManagerError,
};

pub const COMMAND_PREFIX: char = '/';

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Missing command argument")]
    MissingArgument,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    WorldManager(#[from] WorldManagerError),
}

#[derive(Debug)]
pub enum CommandResponse {
    None,
    One(String),
    Many(Vec<String>),
}

type CommandHandler = fn(&mut Client, &[&str]) -> Result<CommandResponse, CommandError>;

pub struct CommandSpec {
    pub keyword: &'static str,
    pub rank: PlayerRank,
    pub doc: &'static str,
    handler: CommandHandler,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        keyword: "mute",
        rank: PlayerRank::Administrator,
        doc: "Mutes a specific player for an amount of time.",
        handler: command_mute,
    },
    CommandSpec {
        keyword: "kick",
        rank: PlayerRank::Administrator,
        doc: "Kicks a player for a certain reason.",
        handler: command_kick,
    },
    CommandSpec {
        keyword: "say",
        rank: PlayerRank::Administrator,
        doc: "Broadcasts a server message.",
        handler: command_say,
    },
    CommandSpec {
        keyword: "goto",
        rank: PlayerRank::Guest,
        doc: "Sends a player to a specific world.",
        handler: command_goto,
    },
    CommandSpec {
        keyword: "saveall",
        rank: PlayerRank::Administrator,
        doc: "Saves all worlds.",
        handler: command_saveall,
    },
    CommandSpec {
        keyword: "save",
        rank: PlayerRank::Administrator,
        doc: "Saves the world your currently in.",
        handler: command_save,
    },
    CommandSpec {
        keyword: "tp",
        rank: PlayerRank::Guest,
        doc: "Teleports a specific player to another player.",
        handler: command_tp,
    },
    CommandSpec {
        keyword: "list",
        rank: PlayerRank::Guest,
        doc: "Lists players, worlds currently active.",
        handler: command_list,
    },
    CommandSpec {
        keyword: "help",
        rank: PlayerRank::Guest,
        doc: "Shows the help page.",
        handler: command_help,
    },
];

pub fn is_command(message: &str) -> bool {
    message.starts_with(COMMAND_PREFIX)
}

/// Routes one `/keyword args…` chat line. Everything returned goes back to
/// the caller only, never broadcast.
pub(crate) fn dispatch(
    client: &mut Client,
    username: &str,
    rank: PlayerRank,
    message: &str,
) -> Vec<String> {
    let mut tokens = message[1..].split_whitespace();
    let Some(keyword) = tokens.next() else {
        return vec!["Couldn't parse invalid command!".to_owned()];
    };
    let arguments: Vec<&str> = tokens.collect();

    info!("{} issued server command {}", username, keyword);

    let Some(spec) = COMMANDS.iter().find(|spec| spec.keyword == keyword) else {
        return vec![format!("Couldn't execute unknown command {}!", keyword)];
    };
    if !rank.has_permission(spec.rank) {
        return vec!["You don't have access to that command!".to_owned()];
    }

    match (spec.handler)(client, &arguments) {
        Ok(CommandResponse::None) => Vec::new(),
        Ok(CommandResponse::One(line)) => vec![line],
        Ok(CommandResponse::Many(lines)) => lines,
        Err(err) => {
            debug!("Command {} failed: {}", keyword, err);
            vec![format!("Failed to execute command {}!", keyword)]
        }
    }
}

fn command_mute(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let target = *args.first().ok_or(CommandError::MissingArgument)?;
    let timeout = args.get(1).copied();

    let epoch = {
        let mut worlds = client.state.worlds.lock().unwrap();
        let Some(entity_id) = worlds.get_entity_from_username(target).map(|e| e.id) else {
            return Ok(CommandResponse::One(format!(
                "Failed to mute/unmute unknown player {}!",
                target
            )));
        };
        let player = worlds
            .get_entity_mut(entity_id)
            .and_then(|entity| entity.player_mut())
            .ok_or(CommandError::MissingArgument)?;
        player.muted = !player.muted;
        player.mute_epoch = player.mute_epoch.wrapping_add(1);
        player.mute_epoch
    };

    if let Some(timeout) = timeout {
        let seconds: f64 = match timeout.parse() {
            Ok(seconds) if seconds >= 0.0 && f64::is_finite(seconds) => seconds,
            _ => {
                return Ok(CommandResponse::One(format!(
                    "Failed to mute player {} for {}!",
                    target, timeout
                )));
            }
        };
        let worlds = client.state.worlds.clone();
        let target = target.to_owned();
        let task_name = format!("unmute-{}-{}", target, epoch);
        client.state.scheduler.add_task(
            task_name,
            0,
            Duration::from_secs_f64(seconds),
            move || {
                let mut worlds = worlds.lock().unwrap();
                if let Some(id) = worlds.get_entity_from_username(&target).map(|e| e.id) {
                    if let Some(player) = worlds
                        .get_entity_mut(id)
                        .and_then(|entity| entity.player_mut())
                    {
                        // only undo the mute this timer belongs to
                        if player.muted && player.mute_epoch == epoch {
                            player.muted = false;
                            player.mute_epoch = player.mute_epoch.wrapping_add(1);
                        }
                    }
                }
                TaskResult::Done
            },
        )?;
    }

    Ok(CommandResponse::One(format!(
        "Successfully muted {}.",
        target
    )))
}

fn command_kick(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let target = *args.first().ok_or(CommandError::MissingArgument)?;
    let reason = args[1..].iter().join(" ");

    let worlds = client.state.worlds.lock().unwrap();
    let fabric = client.state.fabric.lock().unwrap();
    let Some(entity) = worlds.get_entity_from_username(target) else {
        return Ok(CommandResponse::One(format!(
            "Failed to kick unknown player {}!",
            target
        )));
    };
    let Some(peer) = fabric.peers().find(|peer| peer.entity == Some(entity.id)) else {
        return Ok(CommandResponse::One(format!(
            "Failed to kick player {}!",
            target
        )));
    };
    peer.send(&packet::DisconnectPlayer { reason });
    peer.sender.close();

    Ok(CommandResponse::One(format!(
        "Successfully kicked player {}!",
        target
    )))
}

fn command_say(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let entity_id = client.entity_id.ok_or(CommandError::MissingArgument)?;
    let message = args.iter().join(" ");
    client.state.fabric.lock().unwrap().broadcast(
        &[],
        &packet::ServerMessage {
            id: entity_id as i8,
            message: format!("{}[SERVER]{}: {}", color::RED, color::WHITE, message),
        },
    );
    Ok(CommandResponse::None)
}

fn command_goto(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let world_name = *args.first().ok_or(CommandError::MissingArgument)?;
    let Some(entity_id) = client.entity_id else {
        return Ok(CommandResponse::One(format!(
            "Failed to teleport to world {}!",
            world_name
        )));
    };

    let username = {
        let worlds = client.state.worlds.lock().unwrap();
        let Some(entity) = worlds.get_entity(entity_id) else {
            return Ok(CommandResponse::One(format!(
                "Failed to teleport to world {}!",
                world_name
            )));
        };
        if worlds.get_world(world_name).is_none() {
            return Ok(CommandResponse::One(format!(
                "Failed to teleport to world, {} doesn't exist!",
                world_name
            )));
        }
        if entity.world == world_name {
            return Ok(CommandResponse::One(
                "You cannot teleport to a world you're already in!".to_owned(),
            ));
        }
        entity.username().unwrap_or_default().to_owned()
    };

    // replays the identification chain into the target world
    client.begin_session(&username, Some(world_name))?;

    Ok(CommandResponse::One(format!(
        "Successfully teleported {} to world {}",
        username, world_name
    )))
}

fn command_saveall(client: &mut Client, _args: &[&str]) -> Result<CommandResponse, CommandError> {
    client.state.worlds.lock().unwrap().save_all()?;
    Ok(CommandResponse::One("Successfully saved all worlds.".to_owned()))
}

fn command_save(client: &mut Client, _args: &[&str]) -> Result<CommandResponse, CommandError> {
    let entity_id = client.entity_id.ok_or(CommandError::MissingArgument)?;
    let worlds = client.state.worlds.lock().unwrap();
    let Some(world_name) = worlds.get_entity(entity_id).map(|e| e.world.clone()) else {
        return Ok(CommandResponse::One("Failed to save world!".to_owned()));
    };
    worlds.save(&world_name)?;
    Ok(CommandResponse::One(format!(
        "Successfully saved world {}.",
        world_name
    )))
}

fn command_tp(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let target = *args.first().ok_or(CommandError::MissingArgument)?;
    let sender_id = client.entity_id.ok_or(CommandError::MissingArgument)?;

    let mut worlds = client.state.worlds.lock().unwrap();
    let fabric = client.state.fabric.lock().unwrap();
    let Some(target_entity) = worlds.get_entity_from_username(target) else {
        return Ok(CommandResponse::One(format!(
            "Failed to find target player {}!",
            target
        )));
    };
    if target_entity.id == sender_id {
        return Ok(CommandResponse::One(
            "You cannot teleport to your self!".to_owned(),
        ));
    }
    let (x, y, z) = (target_entity.x, target_entity.y, target_entity.z);

    let sender = worlds
        .get_entity_mut(sender_id)
        .ok_or(CommandError::MissingArgument)?;
    let (yaw, pitch) = (sender.yaw, sender.pitch);
    sender.x = x;
    sender.y = y;
    sender.z = z;
    let sender_name = sender.username().unwrap_or_default().to_owned();

    // absolute update to everyone; the sender recognizes itself via id −1
    fabric.broadcast_each(&[], |peer| {
        Some(packet::PositionAndOrientationStatic {
            id: wire_entity_id(sender_id, peer.entity),
            x,
            y,
            z,
            yaw,
            pitch,
        })
    });

    Ok(CommandResponse::One(format!(
        "Successfully teleported {} to {}.",
        sender_name, target
    )))
}

fn command_list(client: &mut Client, args: &[&str]) -> Result<CommandResponse, CommandError> {
    let list_type = *args.first().ok_or(CommandError::MissingArgument)?;
    let worlds = client.state.worlds.lock().unwrap();
    Ok(CommandResponse::One(match list_type {
        "players" => format!(
            "There are currently {} players online.",
            worlds.player_count()
        ),
        "worlds" => worlds.world_names().map(|name| format!("{},", name)).collect(),
        other => format!("Unknown command argument specified {}!", other),
    }))
}

fn command_help(_client: &mut Client, _args: &[&str]) -> Result<CommandResponse, CommandError> {
    Ok(CommandResponse::Many(
        COMMANDS
            .iter()
            .map(|spec| format!("> /{}: {}", spec.keyword, spec.doc))
            .collect(),
    ))
}

#[cfg(test)]
mod test {
    use std::{
        net::{TcpListener, TcpStream},
        sync::{Arc, Mutex},
    };

    use cobble_util::Connection;

    use crate::{
        fabric::{generate_salt, Fabric},
        scheduler::TaskScheduler,
        server::{ServerConfig, ServerState},
        world::manager::WorldManager,
    };

    use super::*;

    fn test_state(dir: &std::path::Path, worlds: &[&str]) -> ServerState {
        let worlds_dir = dir.join("worlds");
        std::fs::create_dir_all(&worlds_dir).unwrap();
        std::fs::write(
            worlds_dir.join("properties.json"),
            format!(
                "{{\"worlds\": [{}]}}",
                worlds
                    .iter()
                    .map(|w| format!("\"{}\"", w))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
        .unwrap();
        ServerState {
            config: Arc::new(ServerConfig {
                worlds_directory: worlds_dir.clone(),
                ..Default::default()
            }),
            salt: generate_salt().into(),
            worlds: Arc::new(Mutex::new(WorldManager::setup(worlds_dir).unwrap())),
            fabric: Arc::new(Mutex::new(Fabric::default())),
            scheduler: TaskScheduler::new().handle(),
        }
    }

    fn test_client(state: &ServerState) -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (
            Client::new(Connection::new(server_side).unwrap(), state.clone()),
            stream,
        )
    }

    fn join(client: &mut Client, state: &ServerState, username: &str, world: &str) -> u8 {
        let mut worlds = state.worlds.lock().unwrap();
        let mut fabric = state.fabric.lock().unwrap();
        let id = worlds.add_player(&fabric, world, username).unwrap();
        fabric.set_entity(client.connection_id, Some(id));
        client.entity_id = Some(id);
        id
    }

    fn promote(state: &ServerState, entity_id: u8) {
        let mut worlds = state.worlds.lock().unwrap();
        worlds
            .get_entity_mut(entity_id)
            .and_then(|e| e.player_mut())
            .unwrap()
            .rank = PlayerRank::Administrator;
    }

    #[test]
    fn unknown_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/frobnicate"),
            vec!["Couldn't execute unknown command frobnicate!"]
        );
    }

    #[test]
    fn permission_gate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut client, _stream) = test_client(&state);
        let id = join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/say hi there"),
            vec!["You don't have access to that command!"]
        );

        promote(&state, id);
        // a successful /say replies nothing to the caller
        assert!(dispatch(
            &mut client,
            "Alice",
            PlayerRank::Administrator,
            "/say hi there"
        )
        .is_empty());
    }

    #[test]
    fn help_lists_every_command() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        let lines = dispatch(&mut client, "Alice", PlayerRank::Guest, "/help");
        assert_eq!(lines.len(), COMMANDS.len());
        assert!(lines[0].starts_with("> /mute: "));
        assert!(lines.iter().any(|l| l.starts_with("> /goto: ")));
    }

    #[test]
    fn list_players_and_worlds() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main", "nether"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/list players"),
            vec!["There are currently 1 players online."]
        );
        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/list worlds"),
            vec!["main,nether,"]
        );
        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/list frogs"),
            vec!["Unknown command argument specified frogs!"]
        );
        // missing argument is a handler failure
        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/list"),
            vec!["Failed to execute command list!"]
        );
    }

    #[test]
    fn goto_validations() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main", "nether"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/goto moon"),
            vec!["Failed to teleport to world, moon doesn't exist!"]
        );
        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/goto main"),
            vec!["You cannot teleport to a world you're already in!"]
        );
    }

    #[test]
    fn goto_moves_the_player_across_worlds() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main", "nether"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/goto nether"),
            vec!["Successfully teleported Alice to world nether"]
        );

        let worlds = state.worlds.lock().unwrap();
        let entity = worlds.get_entity_from_username("Alice").unwrap();
        assert_eq!(entity.world, "nether");
        assert_eq!(client.entity_id, Some(entity.id));
    }

    #[test]
    fn mute_toggles_and_schedules_timed_unmute() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut alice, _alice_stream) = test_client(&state);
        let alice_id = join(&mut alice, &state, "Alice", "main");
        promote(&state, alice_id);
        let (mut bob, _bob_stream) = test_client(&state);
        let bob_id = join(&mut bob, &state, "Bob", "main");

        assert_eq!(
            dispatch(&mut alice, "Alice", PlayerRank::Administrator, "/mute Ghost"),
            vec!["Failed to mute/unmute unknown player Ghost!"]
        );

        assert_eq!(
            dispatch(&mut alice, "Alice", PlayerRank::Administrator, "/mute Bob"),
            vec!["Successfully muted Bob."]
        );
        {
            let worlds = state.worlds.lock().unwrap();
            assert!(worlds.get_entity(bob_id).unwrap().player().unwrap().muted);
        }

        // toggle back, then a timed mute registers its unmute task
        dispatch(&mut alice, "Alice", PlayerRank::Administrator, "/mute Bob");
        dispatch(&mut alice, "Alice", PlayerRank::Administrator, "/mute Bob 30");
        {
            let worlds = state.worlds.lock().unwrap();
            let player = worlds.get_entity(bob_id).unwrap().player().unwrap();
            assert!(player.muted);
            assert!(state
                .scheduler
                .has_task(&format!("unmute-Bob-{}", player.mute_epoch)));
        }

        assert_eq!(
            dispatch(
                &mut alice,
                "Alice",
                PlayerRank::Administrator,
                "/mute Bob potato"
            ),
            vec!["Failed to mute player Bob for potato!"]
        );
    }

    #[test]
    fn tp_rejects_self() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut client, _stream) = test_client(&state);
        join(&mut client, &state, "Alice", "main");

        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/tp Alice"),
            vec!["You cannot teleport to your self!"]
        );
        assert_eq!(
            dispatch(&mut client, "Alice", PlayerRank::Guest, "/tp Ghost"),
            vec!["Failed to find target player Ghost!"]
        );
    }

    #[test]
    fn tp_moves_the_sender_to_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["main"]);
        let (mut alice, _alice_stream) = test_client(&state);
        let alice_id = join(&mut alice, &state, "Alice", "main");
        let (mut bob, _bob_stream) = test_client(&state);
        let bob_id = join(&mut bob, &state, "Bob", "main");

        {
            let mut worlds = state.worlds.lock().unwrap();
            let bob_entity = worlds.get_entity_mut(bob_id).unwrap();
            bob_entity.x = 100.0;
            bob_entity.z = 50.0;
        }

        assert_eq!(
            dispatch(&mut alice, "Alice", PlayerRank::Guest, "/tp Bob"),
            vec!["Successfully teleported Alice to Bob."]
        );
        let worlds = state.worlds.lock().unwrap();
        let entity = worlds.get_entity(alice_id).unwrap();
        assert_eq!((entity.x, entity.z), (100.0, 50.0));
    }
}
