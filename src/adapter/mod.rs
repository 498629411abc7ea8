//! Adapter Module - eingebaute Capability-Implementierungen
//!
//! Nur mit dem `webrtc`-Feature gebaut.

pub mod webrtc;

pub use webrtc::{default_ice_servers, RtpMedia, WebRtcConfig, WebRtcLink, WebRtcLinkFactory};
