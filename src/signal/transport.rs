//! Transport-Abstraktion für den Signaling-Kanal
//!
//! Die Engine kennt das Relay nur über dieses Interface. Stärkere
//! Zustellgarantien als at-most-once werden nicht vorausgesetzt.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::message::{CallSignal, PeerId};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("transport connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected to signaling relay")]
    NotConnected,

    #[error("recipient not reachable: {0}")]
    Unreachable(String),

    #[error("failed to send signal: {0}")]
    SendFailed(String),
}

// ============================================================================
// SIGNAL TRANSPORT
// ============================================================================

/// Publish/Subscribe-Kanal pro Identität
///
/// `subscribe` liefert den Empfangs-Stream für die lokale Identität;
/// `publish` stellt ein Signal dem Empfänger best-effort zu.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Abonniert den Kanal der angegebenen Identität
    async fn subscribe(&self, identity: &PeerId) -> Result<mpsc::Receiver<CallSignal>, TransportError>;

    /// Veröffentlicht ein Signal an `signal.to`
    async fn publish(&self, signal: CallSignal) -> Result<(), TransportError>;

    /// Beendet das Abonnement der lokalen Identität
    async fn unsubscribe(&self);
}
