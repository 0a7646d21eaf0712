//! Connection registry
//!
//! One control loop owns the live connection set. Register, unregister and
//! broadcast are messages into that loop; nothing else touches the set, so
//! there are no locks around it. The connection count is published through a
//! `watch` channel for cheap reads.

use super::event::Event;
use crate::metrics::Metrics;
use crate::{KubeyError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

/// Bounded, ordered queue of events waiting to be written to one connection.
pub type Mailbox = mpsc::Receiver<Arc<Event>>;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of every connection mailbox.
    pub mailbox_capacity: usize,
    /// Capacity of the hub's broadcast intake queue.
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            broadcast_capacity: 64,
        }
    }
}

enum Control {
    Register {
        id: ConnectionId,
        mailbox: mpsc::Sender<Arc<Event>>,
    },
    Unregister(ConnectionId),
}

/// A registered connection's identity and the receiving end of its mailbox.
pub struct Registration {
    pub id: ConnectionId,
    pub mailbox: Mailbox,
}

/// Handle to the hub's control loop. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    control: mpsc::UnboundedSender<Control>,
    intake: mpsc::Sender<Arc<Event>>,
    count: watch::Receiver<usize>,
    next_id: Arc<AtomicU64>,
    mailbox_capacity: usize,
    metrics: Metrics,
}

impl Hub {
    /// Build a hub and spawn its control loop on the current runtime.
    pub fn spawn(config: HubConfig, metrics: Metrics) -> Self {
        let (hub, control_loop) = Self::new(config, metrics);
        tokio::spawn(control_loop.run());
        hub
    }

    /// Build a hub without starting it. The loop does nothing until `run` is awaited.
    pub fn new(config: HubConfig, metrics: Metrics) -> (Self, HubLoop) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (intake_tx, intake_rx) = mpsc::channel(config.broadcast_capacity.max(1));
        let (count_tx, count_rx) = watch::channel(0);

        let hub = Self {
            control: control_tx,
            intake: intake_tx,
            count: count_rx,
            next_id: Arc::new(AtomicU64::new(1)),
            mailbox_capacity: config.mailbox_capacity.max(1),
            metrics: metrics.clone(),
        };

        let control_loop = HubLoop {
            control: control_rx,
            intake: intake_rx,
            connections: HashMap::new(),
            count: count_tx,
            metrics,
        };

        (hub, control_loop)
    }

    /// Ask the loop to add a new connection. The welcome event is queued by the loop.
    pub fn register(&self) -> Result<Registration> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);

        self.control
            .send(Control::Register { id, mailbox: tx })
            .map_err(|_| KubeyError::Transport("hub is not running".to_string()))?;

        Ok(Registration { id, mailbox: rx })
    }

    /// Ask the loop to drop a connection. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        if self.control.send(Control::Unregister(id)).is_err() {
            debug!("Hub stopped before connection {} unregistered", id);
        }
    }

    /// Queue an event for every active connection without waiting.
    ///
    /// A full intake queue drops the event and returns [`KubeyError::QueueFull`].
    pub fn broadcast(&self, event: Event) -> Result<()> {
        match self.intake.try_send(Arc::new(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("Hub intake queue is full, dropping {} event", event.kind());
                self.metrics.broadcast_dropped();
                Err(KubeyError::QueueFull("hub intake"))
            }
            Err(TrySendError::Closed(_)) => {
                Err(KubeyError::Transport("hub is not running".to_string()))
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Receiver that observes every published change of the connection count.
    pub fn watch_connection_count(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

/// The hub's control loop; the only owner of the connection set.
pub struct HubLoop {
    control: mpsc::UnboundedReceiver<Control>,
    intake: mpsc::Receiver<Arc<Event>>,
    connections: HashMap<ConnectionId, mpsc::Sender<Arc<Event>>>,
    count: watch::Sender<usize>,
    metrics: Metrics,
}

impl HubLoop {
    /// Runs until every [`Hub`] handle is dropped.
    pub async fn run(mut self) {
        info!("Hub control loop started");

        loop {
            tokio::select! {
                // Membership changes go first so a registration sent before a
                // broadcast is always in place when that broadcast fans out.
                biased;

                cmd = self.control.recv() => match cmd {
                    Some(Control::Register { id, mailbox }) => self.add(id, mailbox),
                    Some(Control::Unregister(id)) => self.remove(id),
                    None => break,
                },
                event = self.intake.recv() => match event {
                    Some(event) => self.fan_out(event),
                    None => break,
                },
            }
        }

        for _ in self.connections.drain() {
            self.metrics.connection_closed();
        }
        self.count.send_replace(0);

        info!("Hub control loop stopped");
    }

    fn add(&mut self, id: ConnectionId, mailbox: mpsc::Sender<Arc<Event>>) {
        match mailbox.try_send(Arc::new(Event::connected())) {
            Ok(()) => self.metrics.event_delivered(),
            Err(_) => debug!("Welcome event for connection {} dropped", id),
        }

        self.connections.insert(id, mailbox);
        self.metrics.connection_opened();
        self.publish_count();

        info!(
            "WebSocket client connected. Total clients: {}",
            self.connections.len()
        );
    }

    fn remove(&mut self, id: ConnectionId) {
        // Dropping the sender closes the mailbox, which stops the pump.
        if self.connections.remove(&id).is_none() {
            debug!("Connection {} already removed", id);
            return;
        }

        self.metrics.connection_closed();
        self.publish_count();

        info!(
            "WebSocket client disconnected. Total clients: {}",
            self.connections.len()
        );
    }

    fn fan_out(&mut self, event: Arc<Event>) {
        if self.connections.is_empty() {
            return;
        }

        let mut delivered = 0;
        let mut unresponsive = Vec::new();

        for (id, mailbox) in &self.connections {
            match mailbox.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.event_delivered();
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Connection {} mailbox full, disconnecting", id);
                    self.metrics.backpressure_disconnect();
                    unresponsive.push(*id);
                }
                Err(TrySendError::Closed(_)) => unresponsive.push(*id),
            }
        }

        for id in unresponsive {
            self.remove(id);
        }

        debug!(
            "Broadcast {} event to {} clients",
            event.kind(),
            delivered
        );
    }

    fn publish_count(&self) {
        self.count.send_replace(self.connections.len());
    }
}
