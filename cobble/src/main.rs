use std::error::Error;

use clap::Parser;
use cobble_server::{heartbeat, Server, ServerConfig, TaskScheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cobble", about = "A Minecraft Classic server", version)]
struct Args {
    /// The maximum amount of allowed TCP connections at once
    #[arg(long, default_value_t = 1024)]
    backlog: u32,

    /// The address in which the server will bind to
    #[arg(long, default_value = "0.0.0.0")]
    address: String,

    /// The port in which the server will bind to
    #[arg(long, default_value_t = 25565)]
    port: u16,

    /// The name of the server
    #[arg(long, default_value = "Cobble Minecraft Server")]
    name: String,

    /// The server's message of the day
    #[arg(
        long,
        default_value = "Welcome to the Cobble Minecraft Classic server..."
    )]
    motd: String,

    /// The server's software version string
    #[arg(long)]
    software: Option<String>,

    /// Whether the server is visible on the public server list
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    public: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        address: args.address,
        port: args.port,
        backlog: args.backlog,
        name: args.name,
        motd: args.motd,
        software: args
            .software
            .unwrap_or_else(|| format!("Cobble v{}", env!("CARGO_PKG_VERSION"))),
        public: args.public,
        ..ServerConfig::default()
    };

    let scheduler = TaskScheduler::new();
    let mut server = Server::bind(config, scheduler.handle())?;
    heartbeat::register(&server.state())?;
    let _scheduler_worker = scheduler.spawn();

    server.run()?;
    Ok(())
}
