//! emuctl-cli - Command-line controller for the emulator debug endpoint
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::parse_argument;
use emuctl_client::{Dispatcher, Endpoint, Transport, TransportConfig};
use emuctl_protocol::Opcode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emuctl-cli")]
#[command(about = "Send remote-control commands to a running emulator")]
#[command(version)]
struct Cli {
    /// Debug endpoint address (host:port)
    #[arg(short, long, env = "EMUCTL_ENDPOINT", default_value = "127.0.0.1:8171")]
    endpoint: String,

    /// Connect timeout in milliseconds
    #[arg(long, env = "EMUCTL_CONNECT_TIMEOUT_MS", default_value_t = 2000)]
    connect_timeout_ms: u64,

    /// Write timeout in milliseconds
    #[arg(long, env = "EMUCTL_WRITE_TIMEOUT_MS", default_value_t = 1000)]
    write_timeout_ms: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

macro_rules! op_commands {
    ($($variant:ident),+ $(,)?) => {
        #[derive(Subcommand)]
        enum Commands {
            /// Start interactive REPL
            Repl,

            /// Print the opcode table
            List,

            /// Send any operation by name or wire value
            Send {
                /// Operation name (Snapshot_Save, snapshot-save) or opcode (0x1f4)
                op: String,

                /// Argument (decimal or 0x hex)
                #[arg(value_parser = parse_argument)]
                arg: Option<u64>,
            },

            $(
                #[command(about = Opcode::$variant.description())]
                $variant {
                    /// Argument (decimal or 0x hex)
                    #[arg(short, long, value_parser = parse_argument)]
                    arg: Option<u64>,
                },
            )+
        }

        impl Commands {
            /// Returns the operation for a per-opcode subcommand.
            fn operation(&self) -> Option<(Opcode, u64)> {
                match self {
                    $(Commands::$variant { arg } => Some((Opcode::$variant, arg.unwrap_or(0))),)+
                    _ => None,
                }
            }
        }
    };
}

op_commands! {
    SnapshotSave,
    SnapshotSaveStamped,
    SnapshotRestore,
    SnapshotSaveCyclic,
    ResetJitEe,
    ResetJitIop,
    ResetJitVu,
    ExitNicely,
    StopExec,
    StartExec,
    ToggleExec,
    StepExec,
    EnableToolingMode,
    GenCoreDump,
    GsExternalCommand,
    RestorePointSave,
    RestorePointRestore,
    StartVkLogging,
    StopVkLogging,
    SoftReset,
    SwitchDisc,
    SwitchDiscSwitch,
    SwitchDiscClose,
    ReloadLuaScripts,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::List) = cli.command {
        print!("{}", commands::format_table());
        return Ok(());
    }

    let endpoint: Endpoint = match cli.endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    };
    let config = TransportConfig::new(endpoint)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms))
        .with_write_timeout(Duration::from_millis(cli.write_timeout_ms));
    let dispatcher = Dispatcher::new(Arc::new(Transport::new(config)));

    let (opcode, argument) = match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(&dispatcher)?;
            return Ok(());
        }
        Some(Commands::List) => return Ok(()),
        Some(Commands::Send { ref op, arg }) => match op.parse::<Opcode>() {
            Ok(opcode) => (opcode, arg.unwrap_or(0)),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(2);
            }
        },
        Some(ref cmd) => match cmd.operation() {
            Some(op) => op,
            None => return Ok(()),
        },
    };

    match commands::execute(&dispatcher, opcode, argument) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    dispatcher.transport().close();
    Ok(())
}
