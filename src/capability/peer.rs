//! Peer-Link-Capability: der Punkt-zu-Punkt-Medientransport
//!
//! Abstrahiert das ausgehandelte Peer-Objekt (Offer/Answer, ICE,
//! Verbindungszustand). Alle Ereignisse des Adapters fließen als
//! `PeerEvent` über einen Kanal zurück in die Engine — keine
//! frei verdrahteten Callbacks.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::media::{TrackHandle, TrackKind};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum PeerLinkError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("unknown local track")]
    UnknownTrack,

    #[error("peer link is closed")]
    Closed,
}

// ============================================================================
// SESSION DESCRIPTIONS & CANDIDATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    Offer,
    Answer,
}

/// SDP-Beschreibung der Medien-Fähigkeiten einer Seite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: DescriptionKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Entdeckter Netzwerkpfad, als opaker Deskriptor transportiert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate(pub String);

impl IceCandidate {
    pub fn descriptor(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// PEER EVENTS
// ============================================================================

/// Verbindungszustand des Peer-Links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Entfernter Track, der am Link angekommen ist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Ereignisse des Adapters, in die Engine-Schleife eingespeist
#[derive(Debug, Clone)]
pub enum PeerEvent {
    StateChanged(LinkState),
    Candidate(IceCandidate),
    RemoteTrack(RemoteTrack),
}

// ============================================================================
// PEER LINK
// ============================================================================

/// Ein einzelner ausgehandelter Medientransport
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, PeerLinkError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerLinkError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError>;

    /// Hängt einen lokal erworbenen Track an den Link
    async fn add_track(&self, handle: &TrackHandle) -> Result<(), PeerLinkError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLinkError>;

    /// Schließt den Link; doppeltes Schließen ist ein No-op
    async fn close(&self);
}

/// Erzeugt Peer-Links; der Events-Sender gehört dem erzeugten Link
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    async fn create(
        &self,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, PeerLinkError>;
}
