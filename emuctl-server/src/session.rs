//! Controller session tracking.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One accepted controller connection.
pub struct Session {
    /// Connection sequence number, unique per server.
    pub id: u64,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Frames decoded, known or not.
    frames_received: AtomicU64,

    /// Frames whose opcode is not in the table.
    unknown_frames: AtomicU64,

    /// Raw bytes read from the socket.
    bytes_received: AtomicU64,

    created_at: Instant,

    last_activity: Mutex<Instant>,
}

impl Session {
    /// Creates a new session.
    pub fn new(id: u64, remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            remote_addr,
            frames_received: AtomicU64::new(0),
            unknown_frames: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            created_at: now,
            last_activity: Mutex::new(now),
        }
    }

    /// Records a socket read.
    pub fn record_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        self.touch();
    }

    /// Records one decoded frame.
    pub fn record_frame(&self, known: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if !known {
            self.unknown_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns time since the last read.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("frames_received", &self.frames_received())
            .field("unknown_frames", &self.unknown_frames())
            .field("bytes_received", &self.bytes_received())
            .finish()
    }
}
