//! Wire-Format für Call-Signale
//!
//! Diese Strukturen definieren das JSON-Format, auf das sich beide
//! Seiten einer Verbindung einigen müssen. Feldnamen und `kind`-Werte
//! sind Teil des Protokolls und dürfen nicht verändert werden.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// IDENTITIES
// ============================================================================

/// Opaque Identität eines Teilnehmers (z.B. Peer-ID des Relays)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Eindeutiges Token einer Call-Session
///
/// Wird von der anrufenden Seite beim Wählen erzeugt und bleibt für die
/// gesamte Lebensdauer der Session unverändert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Erzeugt eine frische Call-ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SIGNAL KINDS
// ============================================================================

/// Art eines Call-Signals
///
/// Die serialisierten Werte (`call-request`, `call-accept`, `call-reject`,
/// `call-end`, `ice-candidate`) sind Protokoll-Konstanten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    CallRequest,
    CallAccept,
    CallReject,
    CallEnd,
    IceCandidate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalKind::CallRequest => "call-request",
            SignalKind::CallAccept => "call-accept",
            SignalKind::CallReject => "call-reject",
            SignalKind::CallEnd => "call-end",
            SignalKind::IceCandidate => "ice-candidate",
        };
        f.write_str(s)
    }
}

// ============================================================================
// CALL SIGNAL
// ============================================================================

/// Payload-Wert für Rejects wegen Besetztzeichen
pub const BUSY_REASON: &str = "busy";

/// Ein einzelnes Signal auf dem Relay-Kanal
///
/// Nach der Konstruktion unveränderlich. `payload` enthält je nach `kind`
/// das SDP Offer (`call-request`), das SDP Answer (`call-accept`), den
/// ICE-Candidate-Deskriptor (`ice-candidate`) oder bleibt leer.
/// `timestamp` dient ausschließlich der Diagnose, niemals der Ordnung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSignal {
    pub kind: SignalKind,
    pub from: PeerId,
    pub to: PeerId,
    #[serde(rename = "callId")]
    pub call_id: CallId,
    #[serde(default)]
    pub payload: String,
    pub timestamp: i64,
}

impl CallSignal {
    fn new(kind: SignalKind, from: PeerId, to: PeerId, call_id: CallId, payload: String) -> Self {
        Self {
            kind,
            from,
            to,
            call_id,
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Anruf-Anfrage mit SDP Offer
    pub fn request(from: PeerId, to: PeerId, call_id: CallId, offer_sdp: String) -> Self {
        Self::new(SignalKind::CallRequest, from, to, call_id, offer_sdp)
    }

    /// Anruf-Annahme mit SDP Answer
    pub fn accept(from: PeerId, to: PeerId, call_id: CallId, answer_sdp: String) -> Self {
        Self::new(SignalKind::CallAccept, from, to, call_id, answer_sdp)
    }

    /// Anruf-Ablehnung (leerer Payload)
    pub fn reject(from: PeerId, to: PeerId, call_id: CallId) -> Self {
        Self::new(SignalKind::CallReject, from, to, call_id, String::new())
    }

    /// Ablehnung wegen Besetztzeichen (Glare oder laufender Anruf)
    pub fn reject_busy(from: PeerId, to: PeerId, call_id: CallId) -> Self {
        Self::new(
            SignalKind::CallReject,
            from,
            to,
            call_id,
            BUSY_REASON.to_string(),
        )
    }

    /// Anruf-Ende (leerer Payload)
    pub fn end(from: PeerId, to: PeerId, call_id: CallId) -> Self {
        Self::new(SignalKind::CallEnd, from, to, call_id, String::new())
    }

    /// ICE Candidate
    pub fn candidate(from: PeerId, to: PeerId, call_id: CallId, descriptor: String) -> Self {
        Self::new(SignalKind::IceCandidate, from, to, call_id, descriptor)
    }

    /// Prüft ob das Reject ein Besetztzeichen trägt
    pub fn is_busy(&self) -> bool {
        self.kind == SignalKind::CallReject && self.payload == BUSY_REASON
    }
}

// ============================================================================
// TESTS
// ============================================================================
