//! WebSocket-Transport zum Signaling-Relay
//!
//! Verbindet sich mit einem Relay-Server und tauscht dort signierte
//! `CallSignal`-Umschläge aus:
//! - Read-Task speist den Abonnenten-Kanal der Engine
//! - Write-Task entleert die ausgehende Queue
//! - Jeder Umschlag trägt Public Key und Ed25519-Signatur

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::crypto::KeyPair;

use super::message::{CallSignal, PeerId};
use super::transport::{SignalTransport, TransportError};

/// Kapazität der ausgehenden Nachrichten-Queue
const OUTBOUND_CAPACITY: usize = 100;

/// Kapazität des Abonnenten-Kanals
const INBOUND_CAPACITY: usize = 64;

// ============================================================================
// WIRE ENVELOPE
// ============================================================================

/// Signierter Umschlag um ein `CallSignal`
///
/// Das Signal selbst bleibt unverändert; Public Key und Signatur werden
/// flach danebengelegt.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedEnvelope {
    #[serde(flatten)]
    signal: CallSignal,
    #[serde(rename = "publicKey")]
    public_key: String,
    signature: String,
}

/// Abonnement-Anmeldung beim Relay
#[derive(Debug, Clone, Serialize)]
struct SubscribePayload {
    #[serde(rename = "type")]
    msg_type: &'static str,
    identity: String,
    #[serde(rename = "publicKey")]
    public_key: String,
}

// ============================================================================
// CLIENT STATE
// ============================================================================

#[derive(Debug, Default)]
struct ConnectionState {
    is_connected: bool,
    identity: Option<PeerId>,
}

// ============================================================================
// RELAY TRANSPORT
// ============================================================================

/// `SignalTransport` über einen WebSocket-Relay-Server
pub struct RelayTransport {
    server_url: String,
    keypair: Arc<KeyPair>,
    state: Arc<RwLock<ConnectionState>>,
    out: RwLock<Option<mpsc::Sender<String>>>,
}

impl RelayTransport {
    pub fn new(server_url: impl Into<String>, keypair: Arc<KeyPair>) -> Self {
        Self {
            server_url: server_url.into(),
            keypair,
            state: Arc::new(RwLock::new(ConnectionState::default())),
            out: RwLock::new(None),
        }
    }

    /// Liest die Relay-URL aus `SIGNALING_URL`
    pub fn from_env(keypair: Arc<KeyPair>) -> Result<Self, TransportError> {
        let url = std::env::var("SIGNALING_URL")
            .map_err(|_| TransportError::ConnectionFailed("SIGNALING_URL not set".to_string()))?;
        Ok(Self::new(url, keypair))
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected
    }

    /// Signiert ein JSON-Objekt und hängt die Signatur an
    fn sign_envelope(&self, mut value: serde_json::Value) -> Result<String, TransportError> {
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "publicKey".to_string(),
                serde_json::Value::String(self.keypair.public_key_base64()),
            );
        }

        let signature = self.keypair.sign_message(&value);
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "signature".to_string(),
                serde_json::Value::String(signature),
            );
        }

        serde_json::to_string(&value).map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn send_raw(&self, message: String) -> Result<(), TransportError> {
        let tx = self
            .out
            .read()
            .clone()
            .ok_or(TransportError::NotConnected)?;
        tx.send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl SignalTransport for RelayTransport {
    async fn subscribe(&self, identity: &PeerId) -> Result<mpsc::Receiver<CallSignal>, TransportError> {
        let ws_url = format!("{}/ws", self.server_url.replace("http", "ws"));
        tracing::info!("Connecting to signaling relay: {}", ws_url);

        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        *self.out.write() = Some(out_tx);

        {
            let mut state = self.state.write();
            state.is_connected = true;
            state.identity = Some(identity.clone());
        }

        let (sig_tx, sig_rx) = mpsc::channel::<CallSignal>(INBOUND_CAPACITY);

        // Read-Task: Umschläge prüfen und Signale weiterreichen
        let state = Arc::clone(&self.state);
        let local = identity.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let envelope: SignedEnvelope = match serde_json::from_str(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::debug!("Ignoring malformed relay frame: {}", e);
                                continue;
                            }
                        };

                        // Signatur gegen den mitgelieferten Public Key prüfen
                        if let Ok(value) = serde_json::to_value(&envelope) {
                            if KeyPair::verify_message(
                                &envelope.public_key,
                                &value,
                                &envelope.signature,
                            )
                            .is_err()
                            {
                                tracing::warn!(
                                    "Dropping signal with bad signature from {}",
                                    envelope.signal.from
                                );
                                continue;
                            }
                        }

                        if sig_tx.send(envelope.signal).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("Relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Relay read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            state.write().is_connected = false;
            tracing::info!("Relay read task finished for {}", local);
            // sig_tx fällt hier weg; die Engine sieht das Stream-Ende
        });

        // Write-Task: ausgehende Frames senden
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(msg)).await {
                    tracing::error!("Failed to send relay frame: {}", e);
                    break;
                }
            }
        });

        // Abonnement anmelden
        let subscribe = SubscribePayload {
            msg_type: "subscribe",
            identity: identity.to_string(),
            public_key: self.keypair.public_key_base64(),
        };
        let value = serde_json::to_value(&subscribe)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let frame = self.sign_envelope(value)?;
        self.send_raw(frame).await?;

        Ok(sig_rx)
    }

    async fn publish(&self, signal: CallSignal) -> Result<(), TransportError> {
        let value =
            serde_json::to_value(&signal).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let frame = self.sign_envelope(value)?;
        self.send_raw(frame).await
    }

    async fn unsubscribe(&self) {
        // Write-Queue schließen; der Server räumt das Abonnement ab
        *self.out.write() = None;
        let mut state = self.state.write();
        state.is_connected = false;
        state.identity = None;
    }
}

impl std::fmt::Debug for RelayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayTransport")
            .field("server_url", &self.server_url)
            .field("is_connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
