//! `digiod` — run the digital I/O daemon, or send it one command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use digio::client;
use digio::command::{Command, Reply, ReplyPayload};
use digio::config::DaemonConfig;
use digio::{logger, Error, Result};

#[derive(Parser, Debug)]
#[command(name = "digiod", version, about = "Digital I/O event daemon")]
struct Cli {
    /// Config file (TOML).
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Socket path (overrides the config file).
    #[arg(long, global = true, value_name = "PATH")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground.
    Run {
        /// Log filter (overrides the config file; `RUST_LOG` overrides both).
        #[arg(long, value_name = "FILTER")]
        log: Option<String>,
    },

    /// (Re)start the device, optionally on different ports.
    Init {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        input_port: Option<u8>,
        #[arg(long)]
        output_port: Option<u8>,
    },

    /// Fetch and clear buffered input edges.
    Digin,

    /// Schedule an output write.
    Digout(DigoutArgs),

    /// Show daemon status.
    List,

    /// Stop the daemon.
    Quit,

    /// Show the daemon clock.
    Time,
}

#[derive(Args, Debug)]
struct DigoutArgs {
    /// Output value, decimal or 0x-prefixed hex.
    #[arg(long, value_parser = parse_bitmask)]
    value: u8,

    /// Absolute daemon time in seconds.
    #[arg(long, conflicts_with = "after")]
    time: Option<f64>,

    /// Seconds from now (daemon clock).
    #[arg(long)]
    after: Option<f64>,
}

fn parse_bitmask(text: &str) -> std::result::Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|e| format!("`{text}` is not an 8-bit value: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("digiod: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let command = match cli.command {
        Commands::Run { log } => {
            if let Some(filter) = log {
                config.log_filter = filter;
            }
            logger::init(&config.log_filter);
            digio::daemon::run(&config)?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Init {
            device,
            input_port,
            output_port,
        } => Command::Init {
            device,
            input_port,
            output_port,
        },
        Commands::Digin => Command::DigIn,
        Commands::Digout(args) => {
            let time = match (args.time, args.after) {
                (Some(time), _) => time,
                (None, after) => daemon_time(&config)? + after.unwrap_or(0.0),
            };
            Command::DigOut {
                time,
                value: args.value,
            }
        }
        Commands::List => Command::List,
        Commands::Quit => Command::Quit,
        Commands::Time => Command::Time,
    };

    let reply = client::send(&config.socket_path, &command)?;
    print_reply(&reply)?;
    Ok(if reply.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn daemon_time(config: &DaemonConfig) -> Result<f64> {
    match client::send(&config.socket_path, &Command::Time)?.payload {
        ReplyPayload::Time { now } => Ok(now),
        other => Err(Error::Protocol(format!("unexpected reply to time: {other:?}"))),
    }
}

fn print_reply(reply: &Reply) -> Result<()> {
    match &reply.payload {
        ReplyPayload::Status(report) => println!("{report}"),
        _ => println!("{}", serde_json::to_string_pretty(reply)?),
    }
    Ok(())
}
