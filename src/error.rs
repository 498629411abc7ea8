//! Fehler-Taxonomie der Engine
//!
//! Ungültige API-Aufrufe werden lokal und synchron mit einem dieser
//! Werte abgelehnt, niemals stillschweigend ignoriert.

use thiserror::Error;

use crate::capability::media::MediaError;
use crate::capability::peer::PeerLinkError;
use crate::signal::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("already in a call")]
    AlreadyInCall,

    #[error("no incoming call to answer")]
    NoIncomingCall,

    #[error("no active call")]
    NoActiveSession,

    #[error("media acquisition failed: {0}")]
    MediaAcquisitionFailed(String),

    #[error("peer is busy")]
    CallBusy,

    #[error("signaling transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("peer link failed: {0}")]
    PeerLinkFailed(String),

    #[error("engine is shut down")]
    Terminated,
}

impl From<MediaError> for CallError {
    fn from(e: MediaError) -> Self {
        CallError::MediaAcquisitionFailed(e.to_string())
    }
}

impl From<PeerLinkError> for CallError {
    fn from(e: PeerLinkError) -> Self {
        CallError::PeerLinkFailed(e.to_string())
    }
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        CallError::TransportUnavailable(e.to_string())
    }
}
