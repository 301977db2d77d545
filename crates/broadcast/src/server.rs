//! BroadcastServer - single-threaded readiness loop fanning messages out to clients
//!
//! One thread owns the listener, the client registry and every socket. Other
//! threads talk to it only through [`ServerHandle`], whose calls become
//! commands on a FIFO channel; per-client order therefore follows call order.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    spawn_runtime_thread, ClientKey, ServerConfig, StopListener, StopSignal, WorkerThread,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{BroadcastError, Result};
use crate::metrics::{ServerMetrics, ServerMetricsSnapshot};
use crate::registry::{ClientConnection, ClientRegistry, Disconnect, ReadyClient};

const SERVER_THREAD_NAME: &str = "broadcast-server";

/// Requests from the handle to the event loop
#[derive(Debug)]
enum ServerCommand {
    /// Queue for every connected client
    Broadcast(Bytes),
    /// Queue for one client; discarded if it is gone
    SendTo(ClientKey, Bytes),
}

/// What woke the event loop
enum Event {
    Stop,
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Command(ServerCommand),
    Ready(Vec<ReadyClient>),
    Idle,
}

/// Broadcast server, not yet listening
pub struct BroadcastServer {
    config: ServerConfig,
}

impl BroadcastServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bind the listener and spawn the event loop
    ///
    /// Binding happens on the caller's thread so the bound address (including
    /// an OS-assigned port) is known when this returns.
    #[instrument(
        name = "broadcast_server_start",
        skip(self),
        fields(addr = %self.config.addr())
    )]
    pub fn start(self) -> Result<ServerHandle> {
        let addr = self.config.addr();
        let listener = std::net::TcpListener::bind(&addr)
            .map_err(|source| BroadcastError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;

        let (stop, stop_listener) = StopSignal::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(ServerMetrics::new());
        let event_loop = EventLoop {
            registry: ClientRegistry::new(),
            scratch: vec![0; self.config.read_buffer_size.max(1)],
            poll_timeout: self.config.poll_timeout(),
            metrics: Arc::clone(&metrics),
        };

        let handle = spawn_runtime_thread(SERVER_THREAD_NAME, move || async move {
            let listener = TcpListener::from_std(listener)?;
            event_loop.run(listener, stop_listener, command_rx).await;
            Ok::<_, BroadcastError>(())
        })?;

        info!(local = %local, "Broadcast server listening");

        Ok(ServerHandle {
            local,
            commands,
            stop,
            worker: WorkerThread::new(SERVER_THREAD_NAME, handle),
            metrics,
        })
    }
}

/// State owned by the event loop thread
struct EventLoop {
    registry: ClientRegistry,
    scratch: Vec<u8>,
    poll_timeout: Duration,
    metrics: Arc<ServerMetrics>,
}

impl EventLoop {
    async fn run(
        mut self,
        listener: TcpListener,
        mut stop: StopListener,
        mut commands: mpsc::UnboundedReceiver<ServerCommand>,
    ) {
        debug!("Event loop started");

        while !stop.is_stopped() {
            let event = tokio::select! {
                _ = stop.stopped() => Event::Stop,
                accepted = listener.accept() => Event::Accepted(accepted),
                command = commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => Event::Stop,
                },
                ready = tokio::time::timeout(self.poll_timeout, self.registry.ready()) => {
                    ready.map_or(Event::Idle, Event::Ready)
                }
            };

            match event {
                Event::Stop => break,
                Event::Accepted(Ok((stream, key))) => self.register(stream, key),
                Event::Accepted(Err(e)) => warn!(error = %e, "Accept failed"),
                Event::Command(command) => self.handle_command(command),
                Event::Ready(ready) => self.service(ready),
                Event::Idle => {}
            }
        }

        let closed = self.registry.close_all();
        self.metrics.set_clients_connected(0);
        info!(closed, "Event loop stopped, all clients closed");
    }

    fn register(&mut self, stream: TcpStream, key: ClientKey) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client = %key, error = %e, "Failed to set TCP_NODELAY");
        }
        self.registry.insert(key, ClientConnection::new(stream));
        self.metrics.record_accepted();
        self.metrics.set_clients_connected(self.registry.len());
        info!(client = %key, clients = self.registry.len(), "Client connected");
    }

    fn unregister(&mut self, key: ClientKey, reason: Disconnect) {
        if self.registry.remove(&key) {
            self.metrics.set_clients_connected(self.registry.len());
            match reason {
                Disconnect::Eof => {
                    info!(client = %key, clients = self.registry.len(), "Client disconnected")
                }
                Disconnect::Error(e) => warn!(
                    client = %key,
                    clients = self.registry.len(),
                    error = %e,
                    "Client dropped after socket error"
                ),
            }
        }
    }

    fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Broadcast(message) => {
                let mut clients = 0;
                for (_, connection) in self.registry.iter_mut() {
                    connection.enqueue(message.clone());
                    clients += 1;
                }
                self.metrics.record_queued(clients);
                trace!(clients, bytes = message.len(), "Message broadcast");
            }
            ServerCommand::SendTo(key, message) => match self.registry.get_mut(&key) {
                Some(connection) => {
                    connection.enqueue(message);
                    self.metrics.record_queued(1);
                }
                None => {
                    self.metrics.record_discarded();
                    debug!(client = %key, "Message for unknown client discarded");
                }
            },
        }
    }

    /// Serve every ready client once: drain input, then advance output
    fn service(&mut self, ready: Vec<ReadyClient>) {
        for ReadyClient {
            key,
            readable,
            writable,
        } in ready
        {
            let Some(connection) = self.registry.get_mut(&key) else {
                continue;
            };

            let mut outcome = Ok(());
            if readable {
                match connection.on_readable(&mut self.scratch) {
                    Ok(0) => {}
                    Ok(n) => trace!(client = %key, bytes = n, "Client input ignored"),
                    Err(reason) => outcome = Err(reason),
                }
            }
            if writable && outcome.is_ok() {
                match connection.on_writable() {
                    Ok(progress) if progress.bytes > 0 => {
                        self.metrics.record_written(progress.bytes, progress.completed);
                        if !progress.completed {
                            trace!(client = %key, bytes = progress.bytes, "Partial write");
                        }
                    }
                    Ok(_) => {}
                    Err(reason) => outcome = Err(reason),
                }
            }

            if let Err(reason) = outcome {
                self.unregister(key, reason);
            }
        }
    }
}

/// Handle to a running broadcast server
///
/// Dropping the handle requests a stop but does not wait for the thread.
pub struct ServerHandle {
    local: SocketAddr,
    commands: mpsc::UnboundedSender<ServerCommand>,
    stop: StopSignal,
    worker: WorkerThread<Result<()>>,
    metrics: Arc<ServerMetrics>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Queue `message` for every client connected when the loop processes it
    pub fn broadcast(&self, message: impl Into<Bytes>) -> Result<()> {
        self.send(ServerCommand::Broadcast(message.into()))
    }

    /// Queue `message` for one client
    ///
    /// A key that is not connected is not an error; the message is discarded
    /// and counted.
    pub fn send_to(&self, key: ClientKey, message: impl Into<Bytes>) -> Result<()> {
        self.send(ServerCommand::SendTo(key, message.into()))
    }

    fn send(&self, command: ServerCommand) -> Result<()> {
        if self.stop.is_stopped() {
            return Err(BroadcastError::Stopped);
        }
        self.commands
            .send(command)
            .map_err(|_| BroadcastError::Stopped)
    }

    /// Clients currently registered
    pub fn client_count(&self) -> usize {
        self.metrics.clients_connected()
    }

    pub fn metrics(&self) -> ServerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Request the loop to close every client and exit
    ///
    /// Returns false if a stop was already requested.
    #[instrument(name = "broadcast_server_stop", skip(self), fields(local = %self.local))]
    pub fn stop(&self) -> bool {
        let first = self.stop.stop();
        if first {
            info!(local = %self.local, "Broadcast server stop requested");
        }
        first
    }

    /// Wait for the event loop thread to exit
    pub fn join(&self) -> Result<()> {
        self.worker
            .join()
            .unwrap_or_else(|| {
                Err(BroadcastError::WorkerLost {
                    worker: self.worker.name().to_string(),
                })
            })
    }

    /// Whether the event loop thread is still alive
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read};
    use std::net::TcpStream as StdTcpStream;
    use std::time::Instant;

    fn start_server() -> ServerHandle {
        let config = ServerConfig {
            port: 0,
            poll_timeout_ms: 20,
            ..ServerConfig::default()
        };
        BroadcastServer::new(config).start().unwrap()
    }

    fn connect(server: &ServerHandle) -> StdTcpStream {
        let stream = StdTcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn read_n(stream: &mut StdTcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    fn shutdown(server: ServerHandle) {
        assert!(server.stop());
        server.join().unwrap();
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let server = start_server();
        let mut a = connect(&server);
        let mut b = connect(&server);
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 2));

        server.broadcast(&b"{first}"[..]).unwrap();
        server.broadcast(&b"{second}"[..]).unwrap();

        assert_eq!(read_n(&mut a, 15), b"{first}{second}");
        assert_eq!(read_n(&mut b, 15), b"{first}{second}");
        shutdown(server);
    }

    #[test]
    fn test_send_to_targets_one_client() {
        let server = start_server();
        let mut a = connect(&server);
        let mut b = connect(&server);
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 2));

        // The server keys clients by their remote address.
        server.send_to(a.local_addr().unwrap(), &b"{only-a}"[..]).unwrap();
        server.broadcast(&b"{all}"[..]).unwrap();

        assert_eq!(read_n(&mut a, 13), b"{only-a}{all}");
        assert_eq!(read_n(&mut b, 5), b"{all}");
        shutdown(server);
    }

    #[test]
    fn test_send_to_unknown_client_is_discarded() {
        let server = start_server();
        let stale: ClientKey = "127.0.0.1:9".parse().unwrap();

        server.send_to(stale, &b"{lost}"[..]).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            server.metrics().messages_discarded == 1
        }));
        assert!(server.is_running());
        shutdown(server);
    }

    #[test]
    fn test_client_disconnect_unregisters() {
        let server = start_server();
        let a = connect(&server);
        let mut b = connect(&server);
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 2));

        drop(a);
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 1));

        server.broadcast(&b"{still-here}"[..]).unwrap();
        assert_eq!(read_n(&mut b, 12), b"{still-here}");
        assert_eq!(server.metrics().clients_accepted, 2);
        shutdown(server);
    }

    #[test]
    fn test_stalled_client_does_not_block_others() {
        let server = start_server();
        // Never reads: its socket buffers fill and its queue grows.
        let _stalled = connect(&server);
        let mut reader = connect(&server);
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 2));

        const COUNT: usize = 200;
        const SIZE: usize = 128 * 1024;
        for seq in 0..COUNT {
            let mut message = format!("{{{seq:06}").into_bytes();
            message.resize(SIZE - 1, b'x');
            message.push(b'}');
            server.broadcast(message).unwrap();
        }

        for seq in 0..COUNT {
            let message = read_n(&mut reader, SIZE);
            assert_eq!(&message[1..7], format!("{seq:06}").as_bytes());
            assert_eq!(message[SIZE - 1], b'}');
        }

        let metrics = server.metrics();
        assert_eq!(metrics.messages_queued, (2 * COUNT) as u64);
        assert!(metrics.messages_sent < metrics.messages_queued);
        shutdown(server);
    }

    #[test]
    fn test_stop_closes_all_clients() {
        let server = start_server();
        let mut clients: Vec<_> = (0..10).map(|_| connect(&server)).collect();
        assert!(wait_until(Duration::from_secs(2), || server.client_count() == 10));

        assert!(server.stop());
        assert!(!server.stop());
        server.join().unwrap();

        assert!(!server.is_running());
        assert_eq!(server.client_count(), 0);
        for client in &mut clients {
            let mut buf = [0u8; 16];
            match client.read(&mut buf) {
                Ok(n) => assert_eq!(n, 0),
                Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            }
        }
        assert!(matches!(
            server.broadcast(&b"{late}"[..]),
            Err(BroadcastError::Stopped)
        ));
    }

    #[test]
    fn test_stop_with_backlog_delivers_written_bytes_then_eof() {
        const CLIENTS: usize = 10;
        const COUNT: usize = 64;
        const SIZE: usize = 256 * 1024;

        let server = start_server();
        // Nobody reads until the server is gone, so most of the backlog stays queued.
        let mut clients: Vec<_> = (0..CLIENTS).map(|_| connect(&server)).collect();
        assert!(wait_until(Duration::from_secs(2), || {
            server.client_count() == CLIENTS
        }));

        let mut message = vec![b'x'; SIZE];
        message[0] = b'{';
        message[SIZE - 1] = b'}';
        let message = Bytes::from(message);
        for _ in 0..COUNT {
            server.broadcast(message.clone()).unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || {
            let metrics = server.metrics();
            metrics.messages_queued == (CLIENTS * COUNT) as u64 && metrics.bytes_sent > 0
        }));

        assert!(server.stop());
        server.join().unwrap();
        assert_eq!(server.client_count(), 0);

        let metrics = server.metrics();
        assert!(metrics.messages_sent < metrics.messages_queued);

        let mut received = 0u64;
        for client in &mut clients {
            let mut buf = Vec::new();
            let n = client.read_to_end(&mut buf).unwrap();
            for whole in buf.chunks_exact(SIZE) {
                assert_eq!((whole[0], whole[SIZE - 1]), (b'{', b'}'));
            }
            received += n as u64;
        }
        assert_eq!(received, metrics.bytes_sent);
    }

    #[test]
    fn test_bind_conflict_reported() {
        let server = start_server();
        let config = ServerConfig {
            port: server.local_addr().port(),
            ..ServerConfig::default()
        };
        let err = BroadcastServer::new(config).start().err().unwrap();
        assert!(matches!(err, BroadcastError::Bind { .. }));
        shutdown(server);
    }
}
