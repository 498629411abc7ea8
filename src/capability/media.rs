//! Media-Capability: lokale Audio-/Video-Tracks
//!
//! Die Engine erwirbt und verwaltet Tracks ausschließlich über dieses
//! Interface; Geräte-I/O gehört in den Adapter des Hosts.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum MediaError {
    #[error("permission to capture media was denied")]
    PermissionDenied,

    #[error("no capture device available")]
    NoDevice,

    #[error("media capture failed: {0}")]
    CaptureFailed(String),
}

// ============================================================================
// TRACK HANDLE
// ============================================================================

/// Welcher Track eines Handles gemeint ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Besitz-Handle auf die lokal erworbenen Tracks
///
/// Gehört exklusiv der aktiven Call-Session und wird auf jedem
/// Terminal-Übergang über `release` zurückgegeben.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHandle {
    pub id: Uuid,
    pub has_audio: bool,
    pub has_video: bool,
}

impl TrackHandle {
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            has_audio,
            has_video,
        }
    }
}

// ============================================================================
// MEDIA CAPABILITY
// ============================================================================

/// Erwerb und Freigabe lokaler Tracks
#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// Erwirbt lokale Tracks; kann an Berechtigungs-Dialogen hängen
    async fn acquire(&self, audio: bool, video: bool) -> Result<TrackHandle, MediaError>;

    /// Gibt die Tracks eines Handles frei (doppelte Freigabe ist ein No-op)
    async fn release(&self, handle: TrackHandle);

    /// Schaltet einen einzelnen Track an oder aus, ohne neu zu verhandeln
    async fn set_enabled(&self, handle: &TrackHandle, kind: TrackKind, enabled: bool);
}
