//! Command execution.

use colored::Colorize;
use emuctl_client::{Dispatcher, Transport};
use emuctl_protocol::{Category, Opcode};

/// Parses an operation argument: decimal or `0x` hex.
pub fn parse_argument(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| format!("invalid argument '{}': expected a u64 (decimal or 0x hex)", s))
}

/// Sends one operation and returns the formatted output.
pub fn execute(
    dispatcher: &Dispatcher,
    opcode: Opcode,
    argument: u64,
) -> Result<String, Box<dyn std::error::Error>> {
    let written = dispatcher.try_send(opcode, argument)?;
    Ok(format!(
        "{} {} ({:#x}) arg={} [{} bytes to {}]",
        "Sent".green(),
        opcode.name().cyan(),
        opcode.code(),
        argument,
        written,
        dispatcher.transport().endpoint()
    ))
}

/// Renders the opcode table.
pub fn format_table() -> String {
    let mut output = String::new();
    let mut current: Option<Category> = None;
    for op in Opcode::ALL {
        if current != Some(op.category()) {
            current = Some(op.category());
            output.push_str(&format!("{}\n", op.category().as_str().bold()));
        }
        output.push_str(&format!(
            "  {:#06x}  {:<22} {}\n",
            op.code(),
            op.name().cyan(),
            op.description().dimmed()
        ));
    }
    output
}

/// Renders transport state and counters.
pub fn format_status(transport: &Transport) -> String {
    let stats = transport.stats().snapshot();
    let mut output = format!(
        "{} {}\n  Endpoint: {}\n",
        "State:".bold(),
        transport.state().to_string().yellow(),
        transport.endpoint()
    );
    if let Some(err) = transport.last_error() {
        output.push_str(&format!("  Last error: {}\n", err.red()));
    }
    output.push_str(&format!(
        "  Connects: {} ({} failed)\n  Frames sent: {} ({} bytes)\n  Send failures: {}\n  Dropped: {}",
        stats.connect_attempts,
        stats.connect_failures,
        stats.frames_sent,
        stats.bytes_sent,
        stats.send_failures,
        stats.commands_dropped
    ));
    output
}
