//! Per-connection pump
//!
//! Each attached transport runs two activities: an outbound writer that drains
//! the connection's mailbox and sends keepalive pings, and an inbound reader
//! that enforces the liveness deadline. Whichever ends first cancels the
//! other, and both unregister from the hub on the way out.
//!
//! The pump only speaks [`Frame`], so any `Sink`/`Stream` pair can be used as
//! a transport. The HTTP layer adapts WebSocket messages; tests use channels.

use super::registry::{ConnectionId, Hub, Mailbox};
use crate::Result;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Transport-neutral WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Registering,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// How often the outbound writer sends a ping.
    pub ping_interval: Duration,
    /// Inbound silence allowed before the connection is considered dead.
    pub liveness_timeout: Duration,
    /// Longest a single frame write may take.
    pub write_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            liveness_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ConnectionHandle {
    id: ConnectionId,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until both activities have finished.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            error!("Connection {} supervisor failed: {}", self.id, e);
        }
    }
}

/// Shared shutdown path for both activities. Safe to trigger more than once.
struct Teardown {
    id: ConnectionId,
    hub: Hub,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
}

impl Teardown {
    fn trigger(&self, cause: &str) {
        if !self.cancel.is_cancelled() {
            debug!("Connection {} closing: {}", self.id, cause);
            self.state.send_replace(ConnectionState::Closing);
            self.cancel.cancel();
        }
        self.hub.unregister(self.id);
    }
}

impl Hub {
    /// Register a transport with the hub and start pumping events to it.
    pub fn attach<W, R, E>(&self, sink: W, stream: R, config: PumpConfig) -> Result<ConnectionHandle>
    where
        W: Sink<Frame> + Unpin + Send + 'static,
        W::Error: Display + Send,
        R: Stream<Item = std::result::Result<Frame, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Registering);

        let registration = self.register()?;
        let id = registration.id;
        state_tx.send_replace(ConnectionState::Active);

        let teardown = Arc::new(Teardown {
            id,
            hub: self.clone(),
            cancel: CancellationToken::new(),
            state: state_tx,
        });

        let outbound = tokio::spawn(outbound(
            registration.mailbox,
            sink,
            config.clone(),
            teardown.clone(),
        ));
        let inbound = tokio::spawn(inbound(stream, config, teardown.clone()));

        let task = tokio::spawn(async move {
            let (out, inp) = tokio::join!(outbound, inbound);
            if let Err(e) = out {
                error!("Connection {} writer panicked: {}", id, e);
            }
            if let Err(e) = inp {
                error!("Connection {} reader panicked: {}", id, e);
            }

            // A panicked activity never reached its own teardown.
            teardown.trigger("finished");
            teardown.state.send_replace(ConnectionState::Closed);
            debug!("Connection {} closed", id);
        });

        Ok(ConnectionHandle {
            id,
            state: state_rx,
            task,
        })
    }
}

async fn outbound<W>(mut mailbox: Mailbox, mut sink: W, config: PumpConfig, teardown: Arc<Teardown>)
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    let id = teardown.id;
    let mut pings = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);

    let cause = loop {
        tokio::select! {
            _ = teardown.cancel.cancelled() => break "cancelled",
            event = mailbox.recv() => {
                let Some(event) = event else {
                    break "unregistered";
                };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Connection {} skipping {} event: {}", id, event.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = write(&mut sink, Frame::Text(text), config.write_timeout).await {
                    warn!("Connection {} write failed: {}", id, e);
                    break "write failed";
                }
            }
            _ = pings.tick() => {
                if let Err(e) = write(&mut sink, Frame::Ping(Vec::new()), config.write_timeout).await {
                    warn!("Connection {} ping failed: {}", id, e);
                    break "ping failed";
                }
            }
        }
    };

    teardown.trigger(cause);

    // Best effort; the peer may already be gone.
    let _ = time::timeout(CLOSE_GRACE, sink.send(Frame::Close)).await;
}

async fn write<W>(sink: &mut W, frame: Frame, limit: Duration) -> std::result::Result<(), String>
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    match time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write stalled for {:?}", limit)),
    }
}

async fn inbound<R, E>(mut stream: R, config: PumpConfig, teardown: Arc<Teardown>)
where
    R: Stream<Item = std::result::Result<Frame, E>> + Unpin,
    E: Display,
{
    let id = teardown.id;
    let mut deadline = Instant::now() + config.liveness_timeout;

    let cause = loop {
        tokio::select! {
            _ = teardown.cancel.cancelled() => break "cancelled",
            _ = time::sleep_until(deadline) => break "liveness timeout",
            frame = stream.next() => match frame {
                Some(Ok(Frame::Ping(_))) | Some(Ok(Frame::Pong(_))) => {
                    deadline = Instant::now() + config.liveness_timeout;
                }
                Some(Ok(Frame::Text(_))) | Some(Ok(Frame::Binary(_))) => {
                    trace!("Connection {} ignoring inbound data frame", id);
                }
                Some(Ok(Frame::Close)) | None => break "peer closed",
                Some(Err(e)) => {
                    warn!("Connection {} read failed: {}", id, e);
                    break "read failed";
                }
            },
        }
    };

    teardown.trigger(cause);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Event, HubConfig};
    use crate::k8s::types::{ClusterSnapshot, ClusterSummary};
    use crate::metrics::Metrics;
    use futures::channel::mpsc;
    use std::io;

    struct Peer {
        /// Frames the pump wrote.
        received: mpsc::Receiver<Frame>,
        /// Frames for the pump to read.
        send: mpsc::UnboundedSender<io::Result<Frame>>,
    }

    fn transport() -> (
        mpsc::Sender<Frame>,
        mpsc::UnboundedReceiver<io::Result<Frame>>,
        Peer,
    ) {
        let (server_tx, received) = mpsc::channel(64);
        let (send, server_rx) = mpsc::unbounded();
        (server_tx, server_rx, Peer { received, send })
    }

    fn quick() -> PumpConfig {
        PumpConfig {
            ping_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_millis(300),
            write_timeout: Duration::from_secs(1),
        }
    }

    async fn next_frame(peer: &mut Peer) -> Frame {
        time::timeout(Duration::from_secs(2), peer.received.next())
            .await
            .expect("no frame written")
            .expect("writer closed")
    }

    async fn wait_closed(handle: ConnectionHandle) {
        time::timeout(Duration::from_secs(3), handle.closed())
            .await
            .expect("connection never closed");
    }

    #[tokio::test]
    async fn test_writes_welcome_and_updates_as_json() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, mut peer) = transport();

        let handle = hub.attach(sink, stream, PumpConfig::default()).unwrap();
        assert_eq!(handle.state(), ConnectionState::Active);

        let Frame::Text(welcome) = next_frame(&mut peer).await else {
            panic!("expected text frame");
        };
        assert_eq!(Event::from_json(&welcome).unwrap().kind(), "connection_status");

        let snap = ClusterSnapshot::running("prod", "v1.28.0", ClusterSummary::default());
        hub.broadcast(Event::cluster_update(snap)).unwrap();

        let Frame::Text(update) = next_frame(&mut peer).await else {
            panic!("expected text frame");
        };
        let event = Event::from_json(&update).unwrap();
        assert_eq!(event.cluster_id.as_deref(), Some("context-prod"));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, _peer) = transport();

        let handle = hub.attach(sink, stream, quick()).unwrap();
        let mut state = handle.watch_state();
        wait_closed(handle).await;

        assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);
        let mut count = hub.watch_connection_count();
        time::timeout(Duration::from_secs(2), count.wait_for(|n| *n == 0))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_pongs_keep_connection_alive() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, peer) = transport();

        let handle = hub.attach(sink, stream, quick()).unwrap();
        for _ in 0..6 {
            time::sleep(Duration::from_millis(100)).await;
            peer.send.unbounded_send(Ok(Frame::Pong(Vec::new()))).unwrap();
        }

        assert_eq!(handle.state(), ConnectionState::Active);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_inbound_text_is_ignored() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, mut peer) = transport();

        let handle = hub.attach(sink, stream, PumpConfig::default()).unwrap();
        next_frame(&mut peer).await;
        peer.send
            .unbounded_send(Ok(Frame::Text("subscribe".to_string())))
            .unwrap();

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, peer) = transport();

        let handle = hub.attach(sink, stream, PumpConfig::default()).unwrap();
        peer.send.unbounded_send(Ok(Frame::Close)).unwrap();
        wait_closed(handle).await;

        let mut count = hub.watch_connection_count();
        time::timeout(Duration::from_secs(2), count.wait_for(|n| *n == 0))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_error_closes_connection() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, peer) = transport();

        let handle = hub.attach(sink, stream, PumpConfig::default()).unwrap();
        peer.send
            .unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .unwrap();

        wait_closed(handle).await;
    }

    #[tokio::test]
    async fn test_unregister_stops_pump() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, mut peer) = transport();

        let handle = hub.attach(sink, stream, PumpConfig::default()).unwrap();
        next_frame(&mut peer).await;

        hub.unregister(handle.id());
        wait_closed(handle).await;

        assert_eq!(next_frame(&mut peer).await, Frame::Close);
    }

    #[tokio::test]
    async fn test_sends_pings() {
        let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
        let (sink, stream, mut peer) = transport();
        let config = PumpConfig {
            ping_interval: Duration::from_millis(50),
            ..PumpConfig::default()
        };

        let _handle = hub.attach(sink, stream, config).unwrap();
        next_frame(&mut peer).await;

        assert!(matches!(next_frame(&mut peer).await, Frame::Ping(_)));
    }
}
