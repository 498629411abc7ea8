//! Session-Zustandsmaschine
//!
//! Besitzt genau eine `CallSession` und ist die einzige Stelle, die sie
//! verändert. Ungültige Übergänge werden abgelehnt, ohne den Zustand
//! anzufassen. Seiteneffekte (Media, Peer-Link, Publish) liegen beim
//! Orchestrator; hier wird nur entschieden, was als Nächstes passieren darf.

use chrono::{DateTime, Utc};

use crate::error::CallError;
use crate::signal::message::{CallId, PeerId};

// ============================================================================
// CALL STATE
// ============================================================================

/// Aktueller Zustand einer Call-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Kein Anruf
    Idle,
    /// Ausgehender Anruf, wartet auf Annahme
    Dialing,
    /// Eingehender Anruf, wartet auf lokale Entscheidung
    Ringing,
    /// Offer/Answer ausgetauscht, Verbindung wird hergestellt
    Negotiating,
    /// Anruf aktiv
    Connected,
    /// Lokales Auflegen läuft
    Ending,
    /// Anruf beendet
    Ended,
    /// Anruf wegen Fehler beendet
    Failed,
}

impl CallState {
    /// Ended und Failed sind Endzustände
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Zustände mit laufendem Anruf (Track-Toggles erlaubt)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallState::Dialing | CallState::Ringing | CallState::Negotiating | CallState::Connected
        )
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Dialing => "dialing",
            CallState::Ringing => "ringing",
            CallState::Negotiating => "negotiating",
            CallState::Connected => "connected",
            CallState::Ending => "ending",
            CallState::Ended => "ended",
            CallState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Die eine lebende Session pro lokaler Identität
#[derive(Debug, Clone)]
pub struct CallSession {
    pub state: CallState,
    pub call_id: Option<CallId>,
    pub local: PeerId,
    pub remote: Option<PeerId>,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub last_error: Option<CallError>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Frischer Idle-Platzhalter
    fn idle(local: PeerId) -> Self {
        Self {
            state: CallState::Idle,
            call_id: None,
            local,
            remote: None,
            is_muted: false,
            is_video_enabled: true,
            last_error: None,
            started_at: None,
            ended_at: None,
        }
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Validiert Übergänge und mutiert die Session
#[derive(Debug)]
pub struct SessionStateMachine {
    session: CallSession,
}

impl SessionStateMachine {
    pub fn new(local: PeerId) -> Self {
        Self {
            session: CallSession::idle(local),
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn call_id(&self) -> Option<CallId> {
        self.session.call_id
    }

    pub fn remote(&self) -> Option<&PeerId> {
        self.session.remote.as_ref()
    }

    // ========================================================================
    // LOKALE API-ÜBERGÄNGE (typisierte Ablehnung, keine Mutation im Fehlerfall)
    // ========================================================================

    /// Idle → Dialing; erzeugt die Call-ID des ausgehenden Anrufs
    pub fn start_dialing(&mut self, remote: PeerId) -> Result<CallId, CallError> {
        if self.session.state != CallState::Idle {
            return Err(CallError::AlreadyInCall);
        }

        let call_id = CallId::generate();
        self.session.state = CallState::Dialing;
        self.session.call_id = Some(call_id);
        self.session.remote = Some(remote);
        self.session.started_at = Some(Utc::now());
        self.session.last_error = None;
        Ok(call_id)
    }

    /// Ringing → Negotiating (lokales Annehmen)
    pub fn accept(&mut self) -> Result<(), CallError> {
        if self.session.state != CallState::Ringing {
            return Err(CallError::NoIncomingCall);
        }

        self.session.state = CallState::Negotiating;
        self.session.last_error = None;
        Ok(())
    }

    /// Ringing → Ended (lokales Ablehnen)
    pub fn reject(&mut self) -> Result<(), CallError> {
        if self.session.state != CallState::Ringing {
            return Err(CallError::NoIncomingCall);
        }

        self.terminate(None);
        Ok(())
    }

    /// Mute-Flag umschalten; liefert den neuen Wert
    pub fn toggle_mute(&mut self) -> Result<bool, CallError> {
        if !self.session.state.is_active() {
            return Err(CallError::NoActiveSession);
        }

        self.session.is_muted = !self.session.is_muted;
        Ok(self.session.is_muted)
    }

    /// Video-Flag umschalten; liefert den neuen Wert
    pub fn toggle_video(&mut self) -> Result<bool, CallError> {
        if !self.session.state.is_active() {
            return Err(CallError::NoActiveSession);
        }

        self.session.is_video_enabled = !self.session.is_video_enabled;
        Ok(self.session.is_video_enabled)
    }

    // ========================================================================
    // SIGNAL- UND LINK-GETRIEBENE ÜBERGÄNGE (ungültig ⇒ false, Signal wird verworfen)
    // ========================================================================

    /// Idle → Ringing (eingehender call-request)
    ///
    /// In jedem anderen Zustand ist der Anrufer besetzt (Glare oder
    /// laufender Anruf) und erhält `CallBusy`.
    pub fn ring(&mut self, call_id: CallId, remote: PeerId) -> Result<(), CallError> {
        if self.session.state != CallState::Idle {
            return Err(CallError::CallBusy);
        }

        self.session.state = CallState::Ringing;
        self.session.call_id = Some(call_id);
        self.session.remote = Some(remote);
        self.session.started_at = Some(Utc::now());
        self.session.last_error = None;
        Ok(())
    }

    /// Dialing → Negotiating (eingehender call-accept)
    pub fn answered(&mut self) -> bool {
        if self.session.state != CallState::Dialing {
            return false;
        }

        self.session.state = CallState::Negotiating;
        self.session.last_error = None;
        true
    }

    /// Negotiating → Connected (Peer-Link meldet "connected")
    pub fn connected(&mut self) -> bool {
        if self.session.state != CallState::Negotiating {
            return false;
        }

        self.session.state = CallState::Connected;
        self.session.last_error = None;
        true
    }

    /// Nicht-terminal → Ending (lokales Auflegen); Idle/terminal ⇒ false
    pub fn begin_ending(&mut self) -> bool {
        if self.session.state == CallState::Idle || self.session.state.is_terminal() {
            return false;
        }

        self.session.state = CallState::Ending;
        true
    }

    /// → Ended; setzt `ended_at` einmalig, optional mit Fehlerklassifikation
    pub fn terminate(&mut self, reason: Option<CallError>) {
        self.session.state = CallState::Ended;
        self.session.last_error = reason;
        if self.session.ended_at.is_none() {
            self.session.ended_at = Some(Utc::now());
        }
    }

    /// → Failed; hält den Fehler fest
    pub fn fail(&mut self, error: CallError) {
        self.session.state = CallState::Failed;
        self.session.last_error = Some(error);
        if self.session.ended_at.is_none() {
            self.session.ended_at = Some(Utc::now());
        }
    }

    /// Ersetzt die Session durch einen frischen Idle-Platzhalter
    ///
    /// Darf erst gerufen werden, wenn alle Ressourcen der Session
    /// freigegeben sind.
    pub fn reset(&mut self) {
        let local = self.session.local.clone();
        self.session = CallSession::idle(local);
    }
}

// ============================================================================
// TESTS
// ============================================================================
