//! DDP CLI
//!
//! Command-line client for poking at DDP servers.
//!
//! # Commands
//!
//! - `ping` - Connect and report the session and handshake time
//! - `call` - Call a method and print its result
//! - `subscribe` - Subscribe to a publication and print its documents
//! - `login` - Log in with a password or resume token

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DDP command-line client.
#[derive(Parser)]
#[command(name = "ddp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// WebSocket URL of the server
    #[arg(global = true, short, long, default_value = "ws://localhost:3000/websocket")]
    url: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Log every frame sent and received (implies --verbose)
    #[arg(global = true, long)]
    log_frames: bool,

    /// Seconds to wait for the server at each step
    #[arg(global = true, short, long, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and report the session and handshake time
    Ping,

    /// Call a method and print its result
    Call {
        /// Method name
        method: String,

        /// Parameters; each is parsed as JSON, falling back to a string
        params: Vec<String>,

        /// Also wait for the method's writes to be reflected (`updated`)
        #[arg(short, long)]
        wait_updated: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Subscribe to a publication and print its documents
    Subscribe {
        /// Publication name
        name: String,

        /// Parameters; each is parsed as JSON, falling back to a string
        params: Vec<String>,

        /// Keep running and print every data event until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Output format (text, json)
        #[arg(short = 'o', long, default_value = "text")]
        format: String,
    },

    /// Log in with a password or a resume token
    Login {
        /// Username
        #[arg(long, conflicts_with = "resume")]
        user: Option<String>,

        /// Password
        #[arg(long, requires = "user")]
        password: Option<String>,

        /// Resume token from an earlier login
        #[arg(long)]
        resume: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose || cli.log_frames {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = commands::ConnectOptions {
        url: cli.url,
        log_frames: cli.log_frames,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Ping => commands::ping::run(&options).await?,
        Commands::Call {
            method,
            params,
            wait_updated,
            format,
        } => commands::call::run(&options, &method, &params, wait_updated, &format).await?,
        Commands::Subscribe {
            name,
            params,
            follow,
            format,
        } => commands::subscribe::run(&options, &name, &params, follow, &format).await?,
        Commands::Login {
            user,
            password,
            resume,
        } => {
            let credentials = match (user, password, resume) {
                (_, _, Some(token)) => commands::login::Credentials::Resume(token),
                (Some(user), Some(password), None) => {
                    commands::login::Credentials::Password { user, password }
                }
                _ => return Err("either --user with --password, or --resume is required".into()),
            };
            commands::login::run(&options, credentials).await?
        }
        Commands::Version => {
            println!("DDP CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DDP protocol version {}", ddp_client::DDP_PROTOCOL_VERSION);
        }
    }

    Ok(())
}
