//! Capability Module - die Schnittstellen zur Außenwelt
//!
//! Media-Erwerb und Peer-Transport werden hier nur als Interfaces
//! beschrieben; die konkreten Adapter bringt der Host mit (oder nutzt
//! die eingebauten unter dem `webrtc`-Feature).

pub mod media;
pub mod peer;

pub use media::{MediaCapability, MediaError, TrackHandle, TrackKind};
pub use peer::{
    DescriptionKind, IceCandidate, LinkState, PeerEvent, PeerLink, PeerLinkError, PeerLinkFactory,
    RemoteTrack, SessionDescription,
};
