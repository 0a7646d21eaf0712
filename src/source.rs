//! Periodic and on-demand refresh of cluster state into the hub.

use crate::aggregator::Aggregator;
use crate::hub::{Event, Hub};
use crate::k8s::types::ClusterSnapshot;
use crate::KubeyError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub interval: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Requests an out-of-schedule refresh. Requests made while one is pending
/// are coalesced into it.
#[derive(Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

impl RefreshTrigger {
    /// Returns `false` when the request was folded into a pending one or the
    /// source has stopped.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Refresh already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Refresh requested after event source stopped");
                false
            }
        }
    }
}

pub struct EventSource {
    aggregator: Arc<Aggregator>,
    hub: Hub,
    config: SourceConfig,
    requests: mpsc::Receiver<()>,
    last: BTreeMap<String, ClusterSnapshot>,
}

impl EventSource {
    pub fn new(aggregator: Arc<Aggregator>, hub: Hub, config: SourceConfig) -> (Self, RefreshTrigger) {
        let (tx, rx) = mpsc::channel(1);
        let source = Self {
            aggregator,
            hub,
            config,
            requests: rx,
            last: BTreeMap::new(),
        };
        (source, RefreshTrigger { tx })
    }

    /// Refresh on every tick and on every request until `shutdown` fires.
    /// The first tick fires immediately.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Event source started, refreshing every {:?}", self.config.interval);

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                Some(()) = self.requests.recv() => {
                    debug!("Refresh requested");
                    self.refresh().await;
                    ticker.reset();
                }
            }
        }

        info!("Event source stopped");
    }

    /// Run one aggregation and broadcast what changed. Returns the number of
    /// events handed to the hub. Only delivered changes are remembered.
    pub async fn refresh(&mut self) -> usize {
        let snapshots = match self.aggregator.aggregate().await {
            Ok(snapshots) => snapshots,
            Err(KubeyError::NoContexts) => {
                warn!("No contexts configured, skipping refresh");
                return 0;
            }
            Err(e) => {
                error!("Refresh failed: {}", e);
                return 0;
            }
        };

        let changes = self.diff(snapshots);
        let total = changes.len();
        let mut sent = 0;

        for change in changes {
            // Drops are logged by the hub. An uncommitted change is retried
            // on the next cycle.
            if self.hub.broadcast(change.event()).is_ok() {
                self.commit(change);
                sent += 1;
            }
        }

        if total > 0 {
            info!("Broadcast {} of {} cluster events", sent, total);
        }

        sent
    }

    /// Changes against the last broadcast state: every snapshot whose state
    /// differs, plus one removal per cluster that disappeared.
    fn diff(&self, snapshots: Vec<ClusterSnapshot>) -> Vec<Change> {
        let current: BTreeSet<String> = snapshots.iter().map(|s| s.id.clone()).collect();

        let mut changes: Vec<Change> = snapshots
            .into_iter()
            .filter(|snapshot| {
                self.last
                    .get(&snapshot.id)
                    .map_or(true, |prev| !prev.same_state(snapshot))
            })
            .map(Change::Update)
            .collect();

        for (id, prev) in &self.last {
            if !current.contains(id) {
                debug!("Cluster {} removed", prev.name);
                changes.push(Change::Removed {
                    id: id.clone(),
                    name: prev.name.clone(),
                });
            }
        }

        changes
    }

    fn commit(&mut self, change: Change) {
        match change {
            Change::Update(snapshot) => {
                self.last.insert(snapshot.id.clone(), snapshot);
            }
            Change::Removed { id, .. } => {
                self.last.remove(&id);
            }
        }
    }
}

enum Change {
    Update(ClusterSnapshot),
    Removed { id: String, name: String },
}

impl Change {
    fn event(&self) -> Event {
        match self {
            Change::Update(snapshot) => Event::cluster_update(snapshot.clone()),
            Change::Removed { id, name } => Event::cluster_removed(id.clone(), name.clone()),
        }
    }
}
