//! Ed25519 Key Pair Management
//!
//! Erzeugt Schlüsselpaare und signiert Signal-Umschläge für das Relay.
//! Persistenz ist Sache des Hosts; die Engine hält Schlüssel nur im
//! Speicher.
//!
//! ## Verwendung
//! ```rust
//! use wavecall::crypto::KeyPair;
//!
//! let keypair = KeyPair::generate();
//! let signature = keypair.sign(b"Hello, World!");
//! let public_key_base64 = keypair.public_key_base64();
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum KeyPairError {
    #[error("Failed to decode key material: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid signature")]
    InvalidSignature,
}

// ============================================================================
// KEYPAIR STRUCT
// ============================================================================

/// Ed25519 Schlüsselpaar für Signierung und Authentifizierung
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generiert ein neues zufälliges Schlüsselpaar
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self { signing_key }
    }

    /// Stellt ein Schlüsselpaar aus 32 rohen Private-Key-Bytes her
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyPairError> {
        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyPairError::InvalidKeyLength(bytes.len()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_bytes),
        })
    }

    /// Stellt ein Schlüsselpaar aus einem Base64-Private-Key her
    pub fn from_base64(encoded: &str) -> Result<Self, KeyPairError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Gibt den Private Key als Base64 zurück (für Host-Persistenz)
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.signing_key.to_bytes())
    }

    /// Signiert Daten mit dem Private Key
    ///
    /// Gibt die Signatur als 64 Bytes zurück.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Signiert Daten und gibt die Signatur als Base64 zurück
    pub fn sign_base64(&self, message: &[u8]) -> String {
        let signature = self.sign(message);
        BASE64.encode(signature.to_bytes())
    }

    /// Gibt den Public Key als raw bytes (32 Bytes) zurück
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    /// Gibt den Public Key als Base64-encoded String zurück
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key_bytes())
    }

    /// Gibt den VerifyingKey (Public Key) zurück
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Signiert einen Umschlag für das Relay
    ///
    /// Die Signatur wird über den JSON-String aller Felder (außer
    /// signature) in alphabetischer Sortierung berechnet.
    pub fn sign_message(&self, payload: &serde_json::Value) -> String {
        let sorted = Self::sort_json_object(payload);
        let payload_string = serde_json::to_string(&sorted).unwrap_or_default();
        self.sign_base64(payload_string.as_bytes())
    }

    /// Prüft eine Base64-Signatur gegen einen Base64-Public-Key
    pub fn verify_message(
        public_key_base64: &str,
        payload: &serde_json::Value,
        signature_base64: &str,
    ) -> Result<(), KeyPairError> {
        let key_bytes = BASE64.decode(public_key_base64)?;
        let key_bytes: [u8; 32] = key_bytes
            .try_into()
            .map_err(|v: Vec<u8>| KeyPairError::InvalidKeyLength(v.len()))?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| KeyPairError::InvalidSignature)?;

        let sig_bytes = BASE64.decode(signature_base64)?;
        let sig_bytes: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| KeyPairError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let sorted = Self::sort_json_object(payload);
        let payload_string = serde_json::to_string(&sorted).unwrap_or_default();

        verifying_key
            .verify(payload_string.as_bytes(), &signature)
            .map_err(|_| KeyPairError::InvalidSignature)
    }

    /// Sortiert ein JSON-Objekt alphabetisch nach Keys
    fn sort_json_object(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted_map = serde_json::Map::new();
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                for key in keys {
                    if key != "signature" {
                        if let Some(v) = map.get(key) {
                            sorted_map.insert(key.clone(), Self::sort_json_object(v));
                        }
                    }
                }
                serde_json::Value::Object(sorted_map)
            }
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
