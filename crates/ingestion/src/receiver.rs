//! StreamReceiver - consumes a telemetry stream and feeds the dispatcher

use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use contracts::{
    spawn_runtime_thread, DisconnectPolicy, ReceiverConfig, RecordDispatch, StopListener,
    StopSignal, WorkerThread,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::codec::FrameCodec;
use crate::config::{IngestionMetrics, MetricsSnapshot};
use crate::error::{IngestionError, Result};

const RECEIVER_THREAD_NAME: &str = "stream-receiver";

/// How the receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    /// `stop()` was requested
    Stopped,
    /// The source closed the connection
    PeerClosed,
}

/// Receiver for one telemetry source
pub struct StreamReceiver {
    config: ReceiverConfig,
    dispatch: Arc<dyn RecordDispatch>,
}

impl StreamReceiver {
    pub fn new(config: ReceiverConfig, dispatch: Arc<dyn RecordDispatch>) -> Self {
        Self { config, dispatch }
    }

    /// Connect to the source and spawn the receive loop
    ///
    /// # Errors
    /// - Source unreachable
    /// - Worker thread could not be spawned
    #[instrument(
        name = "stream_receiver_start",
        skip(self),
        fields(source = %self.config.addr())
    )]
    pub fn start(self) -> Result<ReceiverHandle> {
        let addr = self.config.addr();
        let stream = std::net::TcpStream::connect(&addr)
            .map_err(|source| IngestionError::Connect { addr, source })?;
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;

        info!(peer = %peer, local = %local, "Connected to telemetry source");

        let (stop, listener) = StopSignal::new();
        let metrics = Arc::new(IngestionMetrics::new());
        let session = ReceiveSession {
            codec: FrameCodec::new(self.config.max_frame_len),
            read_buffer_size: self.config.read_buffer_size.max(1),
            policy: self.config.on_disconnect,
            dispatch: self.dispatch,
            metrics: Arc::clone(&metrics),
            peer,
        };

        let handle = spawn_runtime_thread(RECEIVER_THREAD_NAME, move || async move {
            let stream = TcpStream::from_std(stream)?;
            session.run(stream, listener).await
        })?;

        Ok(ReceiverHandle {
            peer,
            local,
            stop,
            worker: WorkerThread::new(RECEIVER_THREAD_NAME, handle),
            metrics,
        })
    }
}

/// State owned by the receive thread
struct ReceiveSession {
    codec: FrameCodec,
    read_buffer_size: usize,
    policy: DisconnectPolicy,
    dispatch: Arc<dyn RecordDispatch>,
    metrics: Arc<IngestionMetrics>,
    peer: SocketAddr,
}

impl ReceiveSession {
    async fn run(self, mut stream: TcpStream, mut stop: StopListener) -> Result<ReceiverExit> {
        debug!(peer = %self.peer, "Receive loop started");
        let mut buffer = BytesMut::with_capacity(self.read_buffer_size);

        let exit = loop {
            buffer.reserve(self.read_buffer_size);
            let read = tokio::select! {
                biased;
                _ = stop.stopped() => break Ok(ReceiverExit::Stopped),
                read = stream.read_buf(&mut buffer) => read,
            };

            match read {
                Ok(0) => {
                    info!(peer = %self.peer, pending = buffer.len(), "Disconnected by peer");
                    self.on_source_lost();
                    break Ok(ReceiverExit::PeerClosed);
                }
                Ok(n) => {
                    self.metrics.record_received(n);
                    self.drain(&mut buffer);
                }
                // Errors after our own shutdown are expected.
                Err(_) if stop.is_stopped() => break Ok(ReceiverExit::Stopped),
                Err(source) => {
                    error!(peer = %self.peer, error = %source, "Receive failed");
                    self.on_source_lost();
                    break Err(IngestionError::Receive {
                        peer: self.peer.to_string(),
                        source,
                    });
                }
            }
        };

        shutdown_stream(stream, self.peer);
        debug!(peer = %self.peer, exit = ?exit, "Receive loop stopped");
        exit
    }

    /// Decode every complete frame and forward the records
    fn drain(&self, buffer: &mut BytesMut) {
        let decoded = self.codec.decode(buffer);

        for frame in &decoded.malformed {
            self.metrics.record_malformed();
            warn!(
                peer = %self.peer,
                offset = frame.offset,
                fragment = %frame.fragment,
                reason = %frame.reason,
                "Malformed frame discarded"
            );
        }
        if decoded.overflowed {
            warn!(
                peer = %self.peer,
                limit = self.codec.max_frame_len(),
                "Unclosed frame exceeded length limit, discarded"
            );
        }
        self.metrics.record_discarded(decoded.discarded);

        for record in &decoded.records {
            self.metrics.record_decoded();
            trace!(peer = %self.peer, record = %record, "Record decoded");
            self.dispatch.dispatch(record);
        }

        buffer.advance(decoded.consumed);
    }

    fn on_source_lost(&self) {
        match self.policy {
            DisconnectPolicy::StopSinks => {
                info!(peer = %self.peer, "Source lost, stopping sinks");
                self.dispatch.stop_sinks();
            }
            DisconnectPolicy::KeepSinks => {
                info!(peer = %self.peer, "Source lost, sinks left idle");
            }
        }
    }
}

/// Close both directions of the connection
fn shutdown_stream(stream: TcpStream, peer: SocketAddr) {
    let result = stream
        .into_std()
        .and_then(|stream| stream.shutdown(Shutdown::Both));
    if let Err(e) = result {
        // NotConnected once the peer has already gone.
        debug!(peer = %peer, error = %e, "Socket shutdown skipped");
    }
}

/// Handle to a running receiver
///
/// Dropping the handle requests a stop but does not wait for the thread.
pub struct ReceiverHandle {
    peer: SocketAddr,
    local: SocketAddr,
    stop: StopSignal,
    worker: WorkerThread<Result<ReceiverExit>>,
    metrics: Arc<IngestionMetrics>,
}

impl ReceiverHandle {
    /// Source address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local end of the connection (the source's client key for us)
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Request the receive loop to stop; safe to call repeatedly
    #[instrument(name = "stream_receiver_stop", skip(self), fields(peer = %self.peer))]
    pub fn stop(&self) {
        if self.stop.stop() {
            debug!("Receiver stop requested");
        }
    }

    /// Wait for the receive loop to exit
    ///
    /// A second call reports `WorkerLost`, as does a panicked loop.
    pub fn join(&self) -> Result<ReceiverExit> {
        self.worker
            .join()
            .unwrap_or_else(|| {
                Err(IngestionError::WorkerLost {
                    worker: self.worker.name().to_string(),
                })
            })
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Record;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CollectingDispatch {
        records: Mutex<Vec<Record>>,
        sinks_stopped: AtomicBool,
    }

    impl CollectingDispatch {
        fn records(&self) -> Vec<Record> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RecordDispatch for CollectingDispatch {
        fn dispatch(&self, record: &Record) {
            self.records.lock().unwrap().push(record.clone());
        }

        fn stop_sinks(&self) {
            self.sinks_stopped.store(true, Ordering::SeqCst);
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn source() -> (TcpListener, ReceiverConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ReceiverConfig {
            port: listener.local_addr().unwrap().port(),
            ..ReceiverConfig::default()
        };
        (listener, config)
    }

    fn frame(address: u32, value: &str, timestamp: i64) -> Vec<u8> {
        FrameCodec::encode(&Record::new(address, value, timestamp).unwrap()).to_vec()
    }

    #[test]
    fn test_split_frames_are_forwarded_in_order() {
        let (listener, config) = source();
        let dispatch = Arc::new(CollectingDispatch::default());
        let handle = StreamReceiver::new(config, dispatch.clone()).start().unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        let mut bytes = frame(1, "10.0", 100);
        bytes.extend(frame(2, "true", 101));
        let (head, tail) = bytes.split_at(20);
        conn.write_all(head).unwrap();
        conn.flush().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        conn.write_all(tail).unwrap();

        assert!(wait_until(|| dispatch.records().len() == 2));
        assert_eq!(
            dispatch.records(),
            vec![
                Record::new(1, "10.0", 100).unwrap(),
                Record::new(2, "true", 101).unwrap()
            ]
        );

        handle.stop();
        assert_eq!(handle.join().unwrap(), ReceiverExit::Stopped);
        assert!(!dispatch.sinks_stopped.load(Ordering::SeqCst));
        assert_eq!(handle.metrics().frames_decoded, 2);
    }

    #[test]
    fn test_peer_close_stops_sinks() {
        let (listener, config) = source();
        let dispatch = Arc::new(CollectingDispatch::default());
        let handle = StreamReceiver::new(config, dispatch.clone()).start().unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        conn.write_all(&frame(5, "1.5", 7)).unwrap();
        drop(conn);

        assert_eq!(handle.join().unwrap(), ReceiverExit::PeerClosed);
        assert_eq!(dispatch.records().len(), 1);
        assert!(dispatch.sinks_stopped.load(Ordering::SeqCst));
        assert!(!handle.is_running());
    }

    #[test]
    fn test_keep_sinks_policy_leaves_sinks_alone() {
        let (listener, mut config) = source();
        config.on_disconnect = DisconnectPolicy::KeepSinks;
        let dispatch = Arc::new(CollectingDispatch::default());
        let handle = StreamReceiver::new(config, dispatch.clone()).start().unwrap();
        let (conn, _) = listener.accept().unwrap();
        drop(conn);

        assert_eq!(handle.join().unwrap(), ReceiverExit::PeerClosed);
        assert!(!dispatch.sinks_stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_unblocks_idle_receive() {
        let (listener, config) = source();
        let dispatch = Arc::new(CollectingDispatch::default());
        let handle = StreamReceiver::new(config, dispatch).start().unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert!(handle.is_running());

        let started = Instant::now();
        handle.stop();
        handle.stop();
        assert_eq!(handle.join().unwrap(), ReceiverExit::Stopped);
        assert!(started.elapsed() < Duration::from_secs(2));

        // Our side shut down both directions, so the source sees EOF.
        conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(std::io::Read::read(&mut conn, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_malformed_frame_counted_and_skipped() {
        let (listener, config) = source();
        let dispatch = Arc::new(CollectingDispatch::default());
        let handle = StreamReceiver::new(config, dispatch.clone()).start().unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        let mut bytes = br#"{"iec":"bad"}"#.to_vec();
        bytes.extend(frame(7, "42.5", 1000));
        conn.write_all(&bytes).unwrap();

        assert!(wait_until(|| dispatch.records().len() == 1));
        assert!(wait_until(|| handle.metrics().frames_malformed == 1));

        handle.stop();
        handle.join().unwrap();
    }

    #[test]
    fn test_unreachable_source() {
        let (listener, config) = source();
        drop(listener);
        let dispatch = Arc::new(CollectingDispatch::default());
        let result = StreamReceiver::new(config, dispatch).start();
        assert!(matches!(result, Err(IngestionError::Connect { .. })));
    }
}
