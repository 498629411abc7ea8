//! Session Module - Zustandsmaschine und ICE-Puffer
//!
//! Hier lebt die eine `CallSession` pro Identität: die Maschine
//! validiert jeden Übergang, der Puffer hält früh eingetroffene
//! ICE Candidates bis zur Remote Description.

pub mod ice;
pub mod state;

pub use ice::IceCandidateBuffer;
pub use state::{CallSession, CallState, SessionStateMachine};
