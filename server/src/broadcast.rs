//! Outbound delivery to sessions.
//!
//! Every session owns a bounded queue drained by its own writer task. A
//! broadcast takes a snapshot of recipient handles, releases any lock, then
//! enqueues the encoded frame to each one without blocking. A recipient whose
//! queue is full or closed is scheduled for disconnect; the others still
//! receive the frame.

use log::{debug, warn};
use parking_lot::Mutex;
use protocol::ServerPacket;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Bounded depth of a session's outbound queue, in frames.
pub const OUTBOUND_QUEUE_LEN: usize = 4096;

/// One or more fully encoded packets, delivered to a peer as a single write.
pub type Frame = Arc<[u8]>;

pub fn encode(packet: &ServerPacket) -> Frame {
    Arc::from(packet.to_bytes())
}

#[derive(Debug, Default)]
struct Closer {
    closed: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

/// A cheap, cloneable reference to one session's outbound side.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    peer: SocketAddr,
    tx: mpsc::Sender<Frame>,
    closer: Arc<Closer>,
}

impl SessionHandle {
    pub fn new(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            peer,
            tx,
            closer: Arc::new(Closer::default()),
        };
        (handle, rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a frame without waiting. Returns false, and schedules the
    /// session for disconnect, when the frame could not be queued.
    pub fn send_frame(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[{}] Outbound queue full; disconnecting", self.peer);
                self.kick("Too slow");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("[{}] Outbound queue closed", self.peer);
                self.kick("Connection lost");
                false
            }
        }
    }

    pub fn send(&self, packet: &ServerPacket) -> bool {
        self.send_frame(encode(packet))
    }

    /// Asks the owning session to tear itself down. Only the first reason
    /// is kept.
    pub fn kick(&self, reason: &str) {
        {
            let mut slot = self.closer.reason.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(reason.to_string());
        }
        self.closer.closed.store(true, Ordering::SeqCst);
        self.closer.notify.notify_one();
    }

    pub fn is_kicked(&self) -> bool {
        self.closer.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`kick`](Self::kick) has been called, yielding the reason.
    pub async fn kicked(&self) -> String {
        if !self.is_kicked() {
            self.closer.notify.notified().await;
        }
        self.closer
            .reason
            .lock()
            .clone()
            .unwrap_or_else(|| "Kicked".to_string())
    }
}

/// Delivers `frame` to every handle, isolating per-recipient failures.
/// Returns the number of recipients that accepted the frame.
pub fn deliver<'a, I>(recipients: I, frame: &Frame) -> usize
where
    I: IntoIterator<Item = &'a SessionHandle>,
{
    recipients
        .into_iter()
        .filter(|handle| handle.send_frame(Arc::clone(frame)))
        .count()
}
