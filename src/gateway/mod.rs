//! Gateway connectivity: one real-time stream per session.
//!
//! - `protocol`: wire types for inbound frames and outbound commands
//! - `event_handler`: applies inbound frames to the store
//! - `transport`: the `Connector` seam and its WebSocket implementation
//! - `manager`: connection lifecycle and fixed-delay reconnect
//! - `outbound`: sending commands with optimistic store updates

pub mod event_handler;
mod manager;
mod outbound;
pub mod protocol;
pub mod transport;

pub use manager::ConnectionManager;
pub use protocol::{
    InboundFrame, OutboundMessage, PermissionBehavior, PermissionResponse, ProtocolError,
};
pub use transport::{Connection, Connector, TransportError, WsConnector};
