//! Puffer für früh eingetroffene ICE Candidates
//!
//! Candidates, die vor dem Setzen der Remote Description eintreffen,
//! werden hier in Ankunftsreihenfolge gehalten und nach dem Setzen in
//! genau dieser Reihenfolge auf den Peer-Link angewendet.

use std::collections::VecDeque;

use crate::capability::peer::{IceCandidate, PeerLink, PeerLinkError};
use crate::signal::message::CallId;

// ============================================================================
// ICE CANDIDATE BUFFER
// ============================================================================

#[derive(Debug, Default)]
pub struct IceCandidateBuffer {
    call_id: Option<CallId>,
    remote_ready: bool,
    queue: VecDeque<IceCandidate>,
}

impl IceCandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindet den Puffer an eine neue Session; verwirft alte Reste
    pub fn bind(&mut self, call_id: CallId) {
        self.call_id = Some(call_id);
        self.remote_ready = false;
        self.queue.clear();
    }

    /// Remote Description wurde bereits angewendet?
    pub fn remote_ready(&self) -> bool {
        self.remote_ready
    }

    /// Stellt einen Candidate hinten an
    ///
    /// Candidates für eine fremde oder tote Call-ID werden verworfen;
    /// Rückgabewert sagt, ob gepuffert wurde.
    pub fn enqueue(&mut self, call_id: &CallId, candidate: IceCandidate) -> bool {
        if self.call_id.as_ref() != Some(call_id) {
            tracing::debug!("Dropping ICE candidate for unknown call {}", call_id);
            return false;
        }

        self.queue.push_back(candidate);
        true
    }

    /// Wendet alle gepufferten Candidates in Einfüge-Reihenfolge an
    ///
    /// Markiert die Remote Description als gesetzt; mit leerer Queue ein
    /// No-op. Liefert die Anzahl angewendeter Candidates.
    pub async fn flush(&mut self, link: &dyn PeerLink) -> Result<usize, PeerLinkError> {
        self.remote_ready = true;

        let mut applied = 0;
        while let Some(candidate) = self.queue.pop_front() {
            link.add_ice_candidate(candidate).await?;
            applied += 1;
        }

        if applied > 0 {
            tracing::debug!("Flushed {} buffered ICE candidate(s)", applied);
        }
        Ok(applied)
    }

    /// Verwirft den Puffer bedingungslos (Terminal-Übergang)
    pub fn discard(&mut self) {
        if !self.queue.is_empty() {
            tracing::debug!("Discarding {} buffered ICE candidate(s)", self.queue.len());
        }
        self.call_id = None;
        self.remote_ready = false;
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
