//! Interactive REPL.

use crate::commands::{self, parse_argument};
use colored::Colorize;
use emuctl_client::Dispatcher;
use emuctl_protocol::Opcode;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::path::PathBuf;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  list                          Print the opcode table
  status                        Show connection state and counters
  close                         Drop the connection (next command reconnects)

  <op> [arg]                    Send an operation, e.g.
                                  snapshot-save
                                  reset_jit_ee 0x2a
                                  0x23b 1

  quit, exit                    Exit the REPL
"#;

const HISTORY_FILE: &str = ".emuctl_history";

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Empty,
    Help,
    List,
    Status,
    Close,
    Quit,
    Send(Opcode, u64),
}

pub fn run(dispatcher: &Dispatcher) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "emuctl CLI".bold().cyan());
    println!(
        "Endpoint {} (connects on first command)",
        dispatcher.transport().endpoint()
    );

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = home::home_dir()
        .map(|h| h.join(HISTORY_FILE))
        .unwrap_or_else(|| PathBuf::from(HISTORY_FILE));
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "emuctl>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => match parse_line(&line) {
                Ok(Line::Empty) => continue,
                Ok(Line::Quit) => break,
                Ok(Line::Help) => println!("{}", HELP_TEXT),
                Ok(Line::List) => println!("{}", commands::format_table()),
                Ok(Line::Status) => {
                    println!("{}\n", commands::format_status(dispatcher.transport()))
                }
                Ok(Line::Close) => {
                    dispatcher.transport().close();
                    println!("{}\n", "Closed.".dimmed());
                }
                Ok(Line::Send(opcode, argument)) => {
                    match commands::execute(dispatcher, opcode, argument) {
                        Ok(output) => println!("{}\n", output),
                        Err(e) => println!("{}: {}\n", "Error".red(), e),
                    }
                }
                Err(msg) => println!("{}\n", msg),
            },
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    dispatcher.transport().close();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

fn parse_line(line: &str) -> Result<Line, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return Ok(Line::Empty);
    };

    match first.to_lowercase().as_str() {
        "help" | "?" => return Ok(Line::Help),
        "list" | "ls" => return Ok(Line::List),
        "status" => return Ok(Line::Status),
        "close" => return Ok(Line::Close),
        "quit" | "exit" | "q" => return Ok(Line::Quit),
        _ => {}
    }

    let opcode: Opcode = first
        .parse()
        .map_err(|e| format!("{}. Type 'help' for help.", e))?;
    let argument = match parts.get(1) {
        Some(arg) => parse_argument(arg)?,
        None => 0,
    };
    if parts.len() > 2 {
        return Err(format!("Usage: {} [arg]", opcode.snake_name()));
    }
    Ok(Line::Send(opcode, argument))
}
