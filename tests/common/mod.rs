//! Test-Attrappen für Media und Peer-Link

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use wavecall::{
    IceCandidate, MediaCapability, MediaError, PeerEvent, PeerLink, PeerLinkError, PeerLinkFactory,
    SessionDescription, TrackHandle, TrackKind,
};

// ============================================================================
// MOCK MEDIA
// ============================================================================

/// Media-Attrappe, die Erwerb und Freigabe zählt
#[derive(Default)]
pub struct MockMedia {
    pub acquire_calls: AtomicUsize,
    pub held: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub enabled_log: Mutex<Vec<(TrackKind, bool)>>,
}

impl MockMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaCapability for MockMedia {
    async fn acquire(&self, audio: bool, video: bool) -> Result<TrackHandle, MediaError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(TrackHandle::new(audio, video))
    }

    async fn release(&self, _handle: TrackHandle) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }

    async fn set_enabled(&self, _handle: &TrackHandle, kind: TrackKind, enabled: bool) {
        self.enabled_log.lock().push((kind, enabled));
    }
}

// ============================================================================
// MOCK PEER LINK
// ============================================================================

/// Link-Attrappe, die alle Aufrufe mitschreibt
pub struct MockLink {
    pub closed: AtomicBool,
    pub local_desc: Mutex<Option<SessionDescription>>,
    pub remote_desc: Mutex<Option<SessionDescription>>,
    pub added_tracks: Mutex<Vec<TrackHandle>>,
    pub candidates: Mutex<Vec<String>>,
}

impl MockLink {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            local_desc: Mutex::new(None),
            remote_desc: Mutex::new(None),
            added_tracks: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates.lock().clone()
    }
}

#[async_trait]
impl PeerLink for MockLink {
    async fn create_offer(&self) -> Result<SessionDescription, PeerLinkError> {
        Ok(SessionDescription::offer("v=0 mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerLinkError> {
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError> {
        *self.local_desc.lock() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerLinkError> {
        *self.remote_desc.lock() = Some(desc);
        Ok(())
    }

    async fn add_track(&self, handle: &TrackHandle) -> Result<(), PeerLinkError> {
        self.added_tracks.lock().push(handle.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLinkError> {
        self.candidates.lock().push(candidate.0);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// MOCK LINK FACTORY
// ============================================================================

/// Factory, die erzeugte Links samt Event-Sender aufhebt
#[derive(Default)]
pub struct MockLinkFactory {
    links: Mutex<Vec<(Arc<MockLink>, mpsc::Sender<PeerEvent>)>>,
}

impl MockLinkFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.links.lock().len()
    }

    pub fn last_link(&self) -> Option<Arc<MockLink>> {
        self.links.lock().last().map(|(link, _)| Arc::clone(link))
    }

    /// Speist ein Ereignis in den zuletzt erzeugten Link ein
    pub async fn emit(&self, event: PeerEvent) {
        let sender = self.links.lock().last().map(|(_, tx)| tx.clone());
        if let Some(tx) = sender {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl PeerLinkFactory for MockLinkFactory {
    async fn create(
        &self,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, PeerLinkError> {
        let link = Arc::new(MockLink::new());
        self.links.lock().push((Arc::clone(&link), events));
        Ok(link)
    }
}
