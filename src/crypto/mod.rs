//! Crypto Module - Ed25519 Identitäts-Schlüssel
//!
//! Schlüsselpaare für das Signieren der Relay-Umschläge.

mod keypair;

pub use keypair::{KeyPair, KeyPairError};
