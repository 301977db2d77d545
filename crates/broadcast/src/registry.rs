//! Client registry
//!
//! Owned exclusively by the event loop. Each entry pairs a live socket with
//! its outbound queue; an entry is removed in the same step that closes its
//! socket, so the map and the socket set never disagree.

use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::io;
use std::net::Shutdown;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use contracts::ClientKey;
use tokio::net::TcpStream;
use tracing::debug;

/// Why a client was dropped
#[derive(Debug)]
pub(crate) enum Disconnect {
    /// Orderly close by the client
    Eof,
    /// Socket error on read or write
    Error(io::Error),
}

/// Result of one write attempt
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WriteProgress {
    /// Bytes accepted by the socket
    pub bytes: usize,
    /// The in-flight message was fully written
    pub completed: bool,
}

/// One accepted client
pub(crate) struct ClientConnection {
    stream: TcpStream,
    /// Messages not yet started, FIFO
    queue: VecDeque<Bytes>,
    /// Remainder of a partially written message
    pending: Option<Bytes>,
}

impl ClientConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            queue: VecDeque::new(),
            pending: None,
        }
    }

    pub fn enqueue(&mut self, message: Bytes) {
        self.queue.push_back(message);
    }

    pub fn wants_write(&self) -> bool {
        self.pending.is_some() || !self.queue.is_empty()
    }

    /// Messages waiting, including a partially written one
    pub fn backlog(&self) -> usize {
        self.queue.len() + usize::from(self.pending.is_some())
    }

    /// Read and discard whatever the client sent
    pub fn on_readable(&mut self, scratch: &mut [u8]) -> Result<usize, Disconnect> {
        match self.stream.try_read(scratch) {
            Ok(0) => Err(Disconnect::Eof),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Disconnect::Error(e)),
        }
    }

    /// Continue the in-flight message, or start the next queued one
    ///
    /// A message is only dequeued once the previous one is fully written, so
    /// bytes of different messages never interleave.
    pub fn on_writable(&mut self) -> Result<WriteProgress, Disconnect> {
        if self.pending.is_none() {
            self.pending = self.queue.pop_front();
        }
        let Some(message) = self.pending.as_mut() else {
            return Ok(WriteProgress::default());
        };

        match self.stream.try_write(&message[..]) {
            Ok(n) => {
                message.advance(n);
                let completed = !message.has_remaining();
                if completed {
                    self.pending = None;
                }
                Ok(WriteProgress {
                    bytes: n,
                    completed,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteProgress::default()),
            Err(e) => Err(Disconnect::Error(e)),
        }
    }

    /// Close both directions and release the socket
    pub fn close(self, key: ClientKey) {
        let dropped = self.backlog();
        let result = self
            .stream
            .into_std()
            .and_then(|stream| stream.shutdown(Shutdown::Both));
        if let Err(e) = result {
            debug!(client = %key, error = %e, "Socket shutdown skipped");
        }
        if dropped > 0 {
            debug!(client = %key, dropped, "Undelivered messages discarded");
        }
    }
}

/// Readiness reported for one client
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadyClient {
    pub key: ClientKey,
    pub readable: bool,
    pub writable: bool,
}

/// Map from client key to connection
#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: HashMap<ClientKey, ClientConnection>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Register a connection; a stale entry under the same key is closed first
    pub fn insert(&mut self, key: ClientKey, connection: ClientConnection) {
        if let Some(stale) = self.clients.insert(key, connection) {
            stale.close(key);
        }
    }

    pub fn get_mut(&mut self, key: &ClientKey) -> Option<&mut ClientConnection> {
        self.clients.get_mut(key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ClientKey, &mut ClientConnection)> {
        self.clients.iter_mut()
    }

    /// Remove and close one client
    pub fn remove(&mut self, key: &ClientKey) -> bool {
        match self.clients.remove(key) {
            Some(connection) => {
                connection.close(*key);
                true
            }
            None => false,
        }
    }

    /// Remove and close every client
    pub fn close_all(&mut self) -> usize {
        let count = self.clients.len();
        for (key, connection) in self.clients.drain() {
            connection.close(key);
        }
        count
    }

    /// Wait until at least one client is readable, or writable with output queued
    ///
    /// Never resolves while the registry is empty.
    pub async fn ready(&self) -> Vec<ReadyClient> {
        poll_fn(|cx| self.poll_ready(cx)).await
    }

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Vec<ReadyClient>> {
        let mut ready = Vec::new();
        for (key, connection) in &self.clients {
            // An error counts as ready; the following I/O call reports it.
            let readable = connection.stream.poll_read_ready(cx).is_ready();
            let writable =
                connection.wants_write() && connection.stream.poll_write_ready(cx).is_ready();
            if readable || writable {
                ready.push(ReadyClient {
                    key: *key,
                    readable,
                    writable,
                });
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    }
}
