//! Realtime broadcast hub
//!
//! Fans out cluster events to every attached WebSocket connection without
//! letting a slow connection hold up the others.

pub mod connection;
pub mod event;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionState, Frame, PumpConfig};
pub use event::{ClusterRef, ConnectionStatus, Event, EventPayload};
pub use registry::{ConnectionId, Hub, HubConfig, HubLoop, Mailbox, Registration};
