//! WebRTC-Adapter
//!
//! Implementiert `PeerLink` und `MediaCapability` über webrtc-rs.
//! Die Engine bleibt davon unberührt; wer eigene Transporte hat,
//! lässt dieses Feature einfach aus.
//!
//! Hinweis: Geräte-Capture und RTP-Pumpen gehören dem Host. `RtpMedia`
//! verwaltet nur die lokalen Track-Objekte und ihre Enabled-Flags.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use crate::capability::media::{MediaCapability, MediaError, TrackHandle, TrackKind};
use crate::capability::peer::{
    DescriptionKind, IceCandidate, LinkState, PeerEvent, PeerLink, PeerLinkError, PeerLinkFactory,
    RemoteTrack, SessionDescription,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate für Opus-Audio (48kHz)
const AUDIO_SAMPLE_RATE: u32 = 48000;

/// Clock Rate für VP8-Video
const VIDEO_CLOCK_RATE: u32 = 90000;

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Standard STUN Server Konfiguration
pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
            "stun:stun2.l.google.com:19302".to_string(),
        ],
        ..Default::default()
    }]
}

/// Konfiguration des WebRTC-Adapters
#[derive(Clone)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<RTCIceServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
        }
    }
}

impl WebRtcConfig {
    /// Fügt einen TURN-Server mit Credentials hinzu
    pub fn with_turn_server(mut self, url: String, username: String, credential: String) -> Self {
        self.ice_servers.push(RTCIceServer {
            urls: vec![url],
            username,
            credential,
            ..Default::default()
        });
        self
    }
}

// ============================================================================
// RTP MEDIA (lokale Track-Objekte)
// ============================================================================

struct LocalTracks {
    audio: Option<Arc<TrackLocalStaticRTP>>,
    video: Option<Arc<TrackLocalStaticRTP>>,
    audio_enabled: bool,
    video_enabled: bool,
}

/// `MediaCapability` über `TrackLocalStaticRTP`
///
/// Der Host schreibt RTP-Pakete selbst auf die Tracks und fragt dafür
/// die Enabled-Flags ab.
#[derive(Default)]
pub struct RtpMedia {
    tracks: Mutex<HashMap<Uuid, LocalTracks>>,
}

impl RtpMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio-Track eines Handles (für die RTP-Pumpe des Hosts)
    pub fn audio_track(&self, handle: &TrackHandle) -> Option<Arc<TrackLocalStaticRTP>> {
        self.tracks
            .lock()
            .get(&handle.id)
            .and_then(|t| t.audio.clone())
    }

    /// Video-Track eines Handles
    pub fn video_track(&self, handle: &TrackHandle) -> Option<Arc<TrackLocalStaticRTP>> {
        self.tracks
            .lock()
            .get(&handle.id)
            .and_then(|t| t.video.clone())
    }

    /// Aktuelles Enabled-Flag eines Tracks
    pub fn is_enabled(&self, handle: &TrackHandle, kind: TrackKind) -> bool {
        self.tracks
            .lock()
            .get(&handle.id)
            .map(|t| match kind {
                TrackKind::Audio => t.audio_enabled,
                TrackKind::Video => t.video_enabled,
            })
            .unwrap_or(false)
    }

    fn collect(&self, handle: &TrackHandle) -> Vec<Arc<TrackLocalStaticRTP>> {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(&handle.id) else {
            return Vec::new();
        };
        entry
            .audio
            .iter()
            .chain(entry.video.iter())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MediaCapability for RtpMedia {
    async fn acquire(&self, audio: bool, video: bool) -> Result<TrackHandle, MediaError> {
        let handle = TrackHandle::new(audio, video);

        let audio_track = audio.then(|| {
            Arc::new(TrackLocalStaticRTP::new(
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: AUDIO_SAMPLE_RATE,
                    channels: 1,
                    ..Default::default()
                },
                "audio".to_string(),
                "wavecall".to_string(),
            ))
        });

        let video_track = video.then(|| {
            Arc::new(TrackLocalStaticRTP::new(
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: VIDEO_CLOCK_RATE,
                    ..Default::default()
                },
                "video".to_string(),
                "wavecall".to_string(),
            ))
        });

        self.tracks.lock().insert(
            handle.id,
            LocalTracks {
                audio: audio_track,
                video: video_track,
                audio_enabled: true,
                video_enabled: true,
            },
        );

        tracing::debug!("Acquired local tracks (audio={}, video={})", audio, video);
        Ok(handle)
    }

    async fn release(&self, handle: TrackHandle) {
        if self.tracks.lock().remove(&handle.id).is_some() {
            tracing::debug!("Released local tracks");
        }
    }

    async fn set_enabled(&self, handle: &TrackHandle, kind: TrackKind, enabled: bool) {
        if let Some(entry) = self.tracks.lock().get_mut(&handle.id) {
            match kind {
                TrackKind::Audio => entry.audio_enabled = enabled,
                TrackKind::Video => entry.video_enabled = enabled,
            }
        }
    }
}

// ============================================================================
// PEER LINK FACTORY
// ============================================================================

/// Baut `RTCPeerConnection`-basierte Links
pub struct WebRtcLinkFactory {
    config: WebRtcConfig,
    media: Arc<RtpMedia>,
}

impl WebRtcLinkFactory {
    pub fn new(media: Arc<RtpMedia>, config: WebRtcConfig) -> Self {
        Self { config, media }
    }
}

#[async_trait]
impl PeerLinkFactory for WebRtcLinkFactory {
    async fn create(
        &self,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, PeerLinkError> {
        // Media Engine mit Standard-Codecs
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: self.config.ice_servers.clone(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?,
        );

        // Verbindungszustand → PeerEvent
        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", s);
            let state = match s {
                RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
                RTCPeerConnectionState::Connected => Some(LinkState::Connected),
                RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
                RTCPeerConnectionState::Failed => Some(LinkState::Failed),
                RTCPeerConnectionState::Closed => Some(LinkState::Closed),
                _ => None,
            };

            let tx = tx.clone();
            Box::pin(async move {
                if let Some(state) = state {
                    let _ = tx.send(PeerEvent::StateChanged(state)).await;
                }
            })
        }));

        // Lokal gesammelte ICE Candidates → PeerEvent
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    if let Ok(json) = c.to_json() {
                        if let Ok(descriptor) = serde_json::to_string(&json) {
                            let _ = tx.send(PeerEvent::Candidate(IceCandidate(descriptor))).await;
                        }
                    }
                }
            })
        }));

        // Eingehende Tracks → PeerEvent
        let tx = events.clone();
        pc.on_track(Box::new(move |track, _, _| {
            let tx = tx.clone();
            Box::pin(async move {
                tracing::info!("Received remote track: {:?}", track.codec());
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                let _ = tx
                    .send(PeerEvent::RemoteTrack(RemoteTrack {
                        id: track.id(),
                        kind,
                    }))
                    .await;
            })
        }));

        Ok(Arc::new(WebRtcLink {
            pc,
            media: Arc::clone(&self.media),
        }))
    }
}

// ============================================================================
// PEER LINK
// ============================================================================

/// Ein einzelner `RTCPeerConnection`-Link
pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    media: Arc<RtpMedia>,
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<SessionDescription, PeerLinkError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerLinkError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError> {
        let desc = to_rtc_description(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError> {
        let desc = to_rtc_description(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))
    }

    async fn add_track(&self, handle: &TrackHandle) -> Result<(), PeerLinkError> {
        let tracks = self.media.collect(handle);
        if tracks.is_empty() {
            return Err(PeerLinkError::UnknownTrack);
        }

        for track in tracks {
            self.pc
                .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLinkError> {
        let init: RTCIceCandidateInit = serde_json::from_str(candidate.descriptor())
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))?;

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| PeerLinkError::Negotiation(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Failed to close peer connection: {}", e);
        }
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, PeerLinkError> {
    match desc.kind {
        DescriptionKind::Offer => RTCSessionDescription::offer(desc.sdp),
        DescriptionKind::Answer => RTCSessionDescription::answer(desc.sdp),
    }
    .map_err(|e| PeerLinkError::InvalidSdp(e.to_string()))
}
