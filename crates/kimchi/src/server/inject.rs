//! The injection queue: the hand-off between the accept loop (which tags
//! connections as soon as protocol detection finishes) and the HTTP/1 server
//! task (which is structured around pulling already-accepted connections
//! from a source, not around accepting its own). See the design note on why
//! this indirection is kept rather than collapsed.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::conn::TaggedConn;

const CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
#[error("injection queue is closed")]
pub struct Closed;

pub struct InjectionQueue {
    tx: mpsc::Sender<TaggedConn>,
    rx: tokio::sync::Mutex<mpsc::Receiver<TaggedConn>>,
    closed: AtomicBool,
    closed_notify: tokio::sync::Notify,
}

impl InjectionQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(CAPACITY);
        InjectionQueue {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            closed_notify: tokio::sync::Notify::new(),
        }
    }

    /// Hands a freshly tagged connection to the HTTP/1 server. Blocks while
    /// the queue is full; fails immediately once the queue is closed.
    pub async fn enqueue(&self, conn: TaggedConn) -> Result<(), Closed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Closed);
        }
        self.tx.send(conn).await.map_err(|_| Closed)
    }

    /// Pulls the next tagged connection, or `None` once the queue is closed
    /// and drained. A single task is expected to call `dequeue` in a loop;
    /// it is this loop that `close` wakes up to end.
    pub async fn dequeue(&self) -> Option<TaggedConn> {
        loop {
            let mut rx = self.rx.lock().await;
            if let Ok(conn) = rx.try_recv() {
                return Some(conn);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            tokio::select! {
                item = rx.recv() => return item,
                _ = self.closed_notify.notified() => continue,
            }
        }
    }

    /// Idempotent-against-error close: the first call closes the queue, any
    /// further call fails.
    pub fn close(&self) -> Result<(), Closed> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Closed);
        }
        self.closed_notify.notify_waiters();
        Ok(())
    }

    /// A synthetic sentinel address used only for logging: the injection
    /// queue has no real socket address of its own.
    pub fn local_address(&self) -> String {
        "pipe".to_string()
    }
}

impl Default for InjectionQueue {
    fn default() -> Self {
        Self::new()
    }
}
