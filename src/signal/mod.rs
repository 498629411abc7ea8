//! Signaling Module - Wire-Format, Transport und Eingangs-Filter
//!
//! Dieses Modul verwaltet den Signalweg zwischen zwei Identitäten:
//! - `CallSignal`-Wire-Format, auf das sich beide Seiten einigen
//! - Transport-Abstraktion plus In-Prozess- und WebSocket-Relay
//! - Router, der fremde und veraltete Signale aussortiert

pub mod memory;
pub mod message;
pub mod relay;
pub mod router;
pub mod transport;

pub use memory::{MemoryRelay, MemoryTransport};
pub use message::{CallId, CallSignal, PeerId, SignalKind, BUSY_REASON};
pub use relay::RelayTransport;
pub use router::SignalRouter;
pub use transport::{SignalTransport, TransportError};
