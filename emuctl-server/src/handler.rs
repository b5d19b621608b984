//! Command handling and sinks.
//!
//! The connection loop decodes frames and passes each one to a
//! [`CommandHandler`], which resolves the opcode, updates counters and forwards
//! known commands to the configured [`CommandSink`].

use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::session::Session;
use chrono::{DateTime, Utc};
use emuctl_protocol::{CommandFrame, Opcode};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A decoded command together with where and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedCommand {
    pub received_at: DateTime<Utc>,
    pub session_id: u64,
    pub peer: SocketAddr,
    pub opcode: Opcode,
    pub argument: u64,
}

impl ReceivedCommand {
    pub fn frame(&self) -> CommandFrame {
        CommandFrame::new(self.opcode, self.argument)
    }
}

/// Destination for received commands.
pub trait CommandSink: Send + Sync {
    fn deliver(&self, command: &ReceivedCommand) -> Result<(), ServerError>;
}

/// Emits one tracing event per command.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl CommandSink for LogSink {
    fn deliver(&self, command: &ReceivedCommand) -> Result<(), ServerError> {
        tracing::info!(
            session = command.session_id,
            peer = %command.peer,
            opcode = command.opcode.code(),
            argument = command.argument,
            "{}",
            command.opcode
        );
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonlSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonlSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl CommandSink for JsonlSink {
    fn deliver(&self, command: &ReceivedCommand) -> Result<(), ServerError> {
        let line = serde_json::to_string(command)?;
        let mut out = self.out.lock();
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

/// Forwards commands to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ReceivedCommand>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReceivedCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelSink {
    fn deliver(&self, command: &ReceivedCommand) -> Result<(), ServerError> {
        self.tx
            .send(command.clone())
            .map_err(|_| ServerError::ShuttingDown)
    }
}

/// Resolves frames and hands them to the sink.
pub struct CommandHandler {
    sink: Arc<dyn CommandSink>,
    metrics: Option<Arc<Metrics>>,
}

impl CommandHandler {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            sink,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handles one decoded frame.
    ///
    /// Unknown opcodes are counted and logged but never reach the sink; they
    /// come back as `Ok(None)`.
    pub fn handle_frame(
        &self,
        session: &Session,
        frame: CommandFrame,
    ) -> Result<Option<Opcode>, ServerError> {
        let opcode = match frame.op() {
            Ok(opcode) => opcode,
            Err(e) => {
                session.record_frame(false);
                if let Some(ref metrics) = self.metrics {
                    metrics.unknown_opcodes_total.inc();
                }
                tracing::warn!(
                    "[{}] {} (argument {:#x})",
                    session.remote_addr,
                    e,
                    frame.argument
                );
                return Ok(None);
            }
        };

        session.record_frame(true);
        if let Some(ref metrics) = self.metrics {
            metrics.frames_total.with_label_values(&[opcode.name()]).inc();
        }

        let command = ReceivedCommand {
            received_at: Utc::now(),
            session_id: session.id,
            peer: session.remote_addr,
            opcode,
            argument: frame.argument,
        };
        self.sink.deliver(&command)?;
        Ok(Some(opcode))
    }
}
