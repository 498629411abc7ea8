//! Engine Module - Orchestrierung der Call-Sessions
//!
//! Der `CallOrchestrator` komponiert Zustandsmaschine, Router, Puffer
//! und Capabilities zu einer seriellen Verarbeitungs-Schleife.

pub mod orchestrator;

pub use orchestrator::{CallEvent, CallOrchestrator, EngineConfig, GlarePolicy};
