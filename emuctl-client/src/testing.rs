//! Scripted in-memory connector for transport tests.

use crate::config::TransportConfig;
use crate::transport::Connector;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub(crate) enum WritePlan {
    Short(usize),
    Fail,
}

#[derive(Default)]
struct Script {
    attempts: usize,
    refuse: usize,
    writes: VecDeque<WritePlan>,
    wire: Vec<u8>,
    replies: VecDeque<u8>,
    reads_closed: bool,
}

/// Records every connect attempt and every byte written; failures are queued
/// up front.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.script.lock().attempts
    }

    pub(crate) fn wire(&self) -> Vec<u8> {
        self.script.lock().wire.clone()
    }

    pub(crate) fn refuse_next(&self, n: usize) {
        self.script.lock().refuse += n;
    }

    pub(crate) fn plan_write(&self, plan: WritePlan) {
        self.script.lock().writes.push_back(plan);
    }

    pub(crate) fn push_reply(&self, bytes: &[u8]) {
        self.script.lock().replies.extend(bytes.iter().copied());
    }

    pub(crate) fn close_reads(&self) {
        self.script.lock().reads_closed = true;
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&self, _config: &TransportConfig) -> io::Result<ScriptedStream> {
        let mut script = self.script.lock();
        script.attempts += 1;
        if script.refuse > 0 {
            script.refuse -= 1;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        Ok(ScriptedStream {
            script: self.script.clone(),
        })
    }
}

pub(crate) struct ScriptedStream {
    script: Arc<Mutex<Script>>,
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut script = self.script.lock();
        match script.writes.pop_front() {
            None => {
                script.wire.extend_from_slice(buf);
                Ok(buf.len())
            }
            Some(WritePlan::Short(n)) => {
                let n = n.min(buf.len());
                script.wire.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Some(WritePlan::Fail) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut script = self.script.lock();
        if script.replies.is_empty() {
            if script.reads_closed {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no reply"));
        }
        let mut n = 0;
        while n < buf.len() {
            match script.replies.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
