//! In-Prozess-Relay für Tests und Single-Process-Setups
//!
//! `MemoryRelay` hält pro Identität den Sender-Kanal des Abonnenten und
//! stellt Signale direkt zu. Kein Netzwerk, keine Persistenz.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::message::{CallSignal, PeerId};
use super::transport::{SignalTransport, TransportError};

/// Kapazität des Empfangs-Kanals pro Abonnent
const SUBSCRIBER_CAPACITY: usize = 64;

// ============================================================================
// MEMORY RELAY
// ============================================================================

/// Gemeinsamer Verteiler: Identität → Sender des Abonnenten
#[derive(Clone, Default)]
pub struct MemoryRelay {
    subscribers: Arc<Mutex<HashMap<PeerId, mpsc::Sender<CallSignal>>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Erzeugt einen Endpunkt, der als `SignalTransport` injiziert wird
    pub fn endpoint(&self) -> MemoryTransport {
        MemoryTransport {
            relay: self.clone(),
            identity: Arc::new(Mutex::new(None)),
        }
    }

    /// Anzahl aktuell abonnierter Identitäten
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn register(&self, identity: &PeerId) -> mpsc::Receiver<CallSignal> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().insert(identity.clone(), tx);
        rx
    }

    fn deregister(&self, identity: &PeerId) {
        self.subscribers.lock().remove(identity);
    }

    fn deliver(&self, signal: CallSignal) -> Result<(), TransportError> {
        let tx = self
            .subscribers
            .lock()
            .get(&signal.to)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(signal.to.to_string()))?;

        // try_send: ein voller Empfänger verliert Signale (at-most-once)
        tx.try_send(signal)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

// ============================================================================
// MEMORY TRANSPORT (ein Endpunkt pro Engine)
// ============================================================================

/// Per-Identität-Sicht auf das `MemoryRelay`
pub struct MemoryTransport {
    relay: MemoryRelay,
    identity: Arc<Mutex<Option<PeerId>>>,
}

#[async_trait]
impl SignalTransport for MemoryTransport {
    async fn subscribe(&self, identity: &PeerId) -> Result<mpsc::Receiver<CallSignal>, TransportError> {
        let rx = self.relay.register(identity);
        *self.identity.lock() = Some(identity.clone());
        tracing::debug!("Memory relay: subscribed {}", identity);
        Ok(rx)
    }

    async fn publish(&self, signal: CallSignal) -> Result<(), TransportError> {
        self.relay.deliver(signal)
    }

    async fn unsubscribe(&self) {
        if let Some(identity) = self.identity.lock().take() {
            self.relay.deregister(&identity);
            tracing::debug!("Memory relay: unsubscribed {}", identity);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
