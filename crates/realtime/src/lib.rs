//! The real-time connection: one shared socket, its wire format, and the
//! routing of inbound events into the chat and notification domains.

pub mod connection;
pub mod error;
pub mod router;
pub mod transport;
pub mod wire;

pub use connection::{
    ConnectionManager, ConnectionSettings, ConnectionState, DisconnectCallback, NetworkStatus,
    StaticToken, SubscriberKind, TokenSource,
};
pub use error::{ConnectionError, WireError};
pub use router::{EventRouter, EventSink};
pub use transport::{SocketConnection, SocketHandle, SocketPeer, SocketTransport, WebSocketTransport};
pub use wire::{InboundEvent, OutboundEvent, WireFrame};
