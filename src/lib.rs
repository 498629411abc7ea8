//! Wavecall - P2P Call Session Engine
//!
//! Signalisierung und Aushandlung für 1:1 Audio-/Video-Anrufe über ein
//! asynchrones Relay:
//! - Zustandsmaschine als einziger Mutator der Call-Session
//! - serielle Verarbeitungs-Schleife pro lokaler Identität
//! - Capability-Interfaces für Media, Peer-Transport und Relay
//! - Ed25519-signierte Umschläge auf dem WebSocket-Relay
//!
//! Die Engine ist bewusst frei von UI, Geräte-I/O und Persistenz;
//! diese Adapter bringt der Host mit.

pub mod capability;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod session;
pub mod signal;

#[cfg(feature = "webrtc")]
pub mod adapter;

pub use capability::{
    IceCandidate, LinkState, MediaCapability, MediaError, PeerEvent, PeerLink, PeerLinkError,
    PeerLinkFactory, RemoteTrack, SessionDescription, TrackHandle, TrackKind,
};
pub use engine::{CallEvent, CallOrchestrator, EngineConfig, GlarePolicy};
pub use error::CallError;
pub use session::{CallSession, CallState};
pub use signal::{
    CallId, CallSignal, MemoryRelay, PeerId, RelayTransport, SignalKind, SignalTransport,
    TransportError,
};
