//! Eingangs-Filter für Call-Signale
//!
//! Prüft Adressierung und Call-ID, bevor ein Signal die Zustandsmaschine
//! erreicht. Verworfene Signale werden geloggt, niemals als Fehler
//! nach oben gereicht.

use super::message::{CallId, CallSignal, PeerId, SignalKind};

// ============================================================================
// SIGNAL ROUTER
// ============================================================================

#[derive(Debug)]
pub struct SignalRouter {
    local: PeerId,
}

impl SignalRouter {
    pub fn new(local: PeerId) -> Self {
        Self { local }
    }

    /// Lässt ein Signal zu oder verwirft es
    ///
    /// Verworfen wird, was nicht an die lokale Identität adressiert ist
    /// oder dessen Call-ID nicht zur aktiven Session passt. `call-request`
    /// darf eine neue Session beginnen und passiert den Call-ID-Check.
    pub fn admit(&self, signal: &CallSignal, current: Option<&CallId>) -> bool {
        if signal.to != self.local {
            tracing::debug!(
                "Discarding {} addressed to {} (we are {})",
                signal.kind,
                signal.to,
                self.local
            );
            return false;
        }

        if signal.kind != SignalKind::CallRequest && current != Some(&signal.call_id) {
            tracing::debug!(
                "Discarding {} for stale call {} from {}",
                signal.kind,
                signal.call_id,
                signal.from
            );
            return false;
        }

        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
