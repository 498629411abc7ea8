//! Call-Orchestrator
//!
//! Öffentliche API der Engine. Ein Orchestrator pro lokaler Identität,
//! mit injiziertem Transport und injizierten Capabilities — kein
//! globaler Zustand.
//!
//! Alle API-Aufrufe, eingehenden Signale und Peer-Link-Ereignisse werden
//! als Kommandos in eine Task-Schleife eingespeist und dort strikt
//! nacheinander verarbeitet. Die Zustandsmaschine ist damit der einzige
//! Mutator, ganz ohne Locks auf dem heißen Pfad.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capability::media::{MediaCapability, TrackHandle, TrackKind};
use crate::capability::peer::{
    IceCandidate, LinkState, PeerEvent, PeerLink, PeerLinkFactory, RemoteTrack, SessionDescription,
};
use crate::error::CallError;
use crate::session::ice::IceCandidateBuffer;
use crate::session::state::{CallSession, CallState, SessionStateMachine};
use crate::signal::message::{CallId, CallSignal, PeerId, SignalKind};
use crate::signal::router::SignalRouter;
use crate::signal::transport::SignalTransport;

/// Kapazität des Peer-Event-Kanals pro Link
const PEER_EVENT_CAPACITY: usize = 32;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Verhalten bei Glare (beidseitiges gleichzeitiges Wählen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlarePolicy {
    /// Zweiter eingehender Request wird mit Besetzt abgelehnt
    #[default]
    RejectIncoming,
    /// Der Anruf der lexikografisch kleineren Identität gewinnt;
    /// die größere Seite verwirft ihren eigenen Wählversuch
    PreferLowerIdentity,
}

/// Konfiguration eines Orchestrators
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub identity: PeerId,
    pub glare: GlarePolicy,
    /// Beendet Dialing/Ringing nach Ablauf; `None` = kein Timeout
    pub ring_timeout: Option<Duration>,
    pub event_capacity: usize,
    pub command_capacity: usize,
}

impl EngineConfig {
    pub fn new(identity: impl Into<PeerId>) -> Self {
        Self {
            identity: identity.into(),
            glare: GlarePolicy::default(),
            ring_timeout: None,
            event_capacity: 100,
            command_capacity: 64,
        }
    }

    pub fn with_glare_policy(mut self, glare: GlarePolicy) -> Self {
        self.glare = glare;
        self
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Beobachtbare Ereignisse für die UI-Anbindung
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Session-Zustand hat sich geändert; bei Failed mit Fehlerklassifikation
    StateChanged {
        state: CallState,
        error: Option<CallError>,
    },
    /// Eingehender Anruf wartet auf Annahme oder Ablehnung
    IncomingCall { call_id: CallId, from: PeerId },
    /// Entfernter Track ist am Peer-Link angekommen
    RemoteTrack { call_id: CallId, track: RemoteTrack },
}

// ============================================================================
// COMMANDS (geschlossene Menge interner Nachrichten)
// ============================================================================

enum Command {
    StartCall {
        remote: PeerId,
        reply: oneshot::Sender<Result<CallId, CallError>>,
    },
    AcceptCall {
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    RejectCall {
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    EndCall {
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    ToggleMute {
        reply: oneshot::Sender<Result<bool, CallError>>,
    },
    ToggleVideo {
        reply: oneshot::Sender<Result<bool, CallError>>,
    },
    Peer {
        call_id: CallId,
        event: PeerEvent,
    },
    RingTimeout {
        call_id: CallId,
    },
}

// ============================================================================
// ORCHESTRATOR HANDLE
// ============================================================================

/// Öffentliches Handle auf die Engine-Schleife
///
/// Lokale Übergänge sind beim Rückkehren des Aufrufs bereits angewendet.
pub struct CallOrchestrator {
    identity: PeerId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<CallEvent>,
    snapshot: Arc<Mutex<CallSession>>,
    task: Option<JoinHandle<()>>,
}

impl CallOrchestrator {
    /// Startet die Engine für eine Identität
    ///
    /// Abonniert den Transport und spawnt die Verarbeitungs-Schleife.
    pub async fn spawn(
        config: EngineConfig,
        transport: Arc<dyn SignalTransport>,
        media: Arc<dyn MediaCapability>,
        links: Arc<dyn PeerLinkFactory>,
    ) -> Result<Self, CallError> {
        let inbound = transport.subscribe(&config.identity).await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        let machine = SessionStateMachine::new(config.identity.clone());
        let snapshot = Arc::new(Mutex::new(machine.session().clone()));

        let task = EngineTask {
            router: SignalRouter::new(config.identity.clone()),
            config: config.clone(),
            machine,
            ice: IceCandidateBuffer::new(),
            transport,
            media,
            links,
            link: None,
            tracks: None,
            pending_offer: None,
            forwarder: None,
            ring_timer: None,
            commands: cmd_tx.downgrade(),
            events: event_tx.clone(),
            snapshot: Arc::clone(&snapshot),
        };

        let handle = tokio::spawn(task.run(cmd_rx, inbound));

        tracing::info!("Call engine started for {}", config.identity);

        Ok(Self {
            identity: config.identity,
            commands: cmd_tx,
            events: event_tx,
            snapshot,
            task: Some(handle),
        })
    }

    pub fn identity(&self) -> &PeerId {
        &self.identity
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Aktueller Zustand (Snapshot)
    pub fn state(&self) -> CallState {
        self.snapshot.lock().state
    }

    /// Aktuelle Session (Snapshot)
    pub fn session(&self) -> CallSession {
        self.snapshot.lock().clone()
    }

    /// Startet einen ausgehenden Anruf; liefert die frische Call-ID
    pub async fn start_call(&self, remote: impl Into<PeerId>) -> Result<CallId, CallError> {
        self.request(|reply| Command::StartCall {
            remote: remote.into(),
            reply,
        })
        .await
    }

    /// Nimmt den klingelnden Anruf an
    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::AcceptCall { reply }).await
    }

    /// Lehnt den klingelnden Anruf ab
    pub async fn reject_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::RejectCall { reply }).await
    }

    /// Beendet den aktuellen Anruf; aus Idle ein stilles No-op
    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::EndCall { reply }).await
    }

    /// Schaltet das Mikrofon um; liefert den neuen Mute-Status
    pub async fn toggle_mute(&self) -> Result<bool, CallError> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    /// Schaltet das Video um; liefert den neuen Enabled-Status
    pub async fn toggle_video(&self) -> Result<bool, CallError> {
        self.request(|reply| Command::ToggleVideo { reply }).await
    }

    /// Beendet laufende Anrufe und fährt die Engine herunter
    pub async fn shutdown(mut self) {
        let _ = self.end_call().await;
        let task = self.task.take();
        drop(self);
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, CallError>>) -> Command,
    ) -> Result<T, CallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| CallError::Terminated)?;
        reply_rx.await.map_err(|_| CallError::Terminated)?
    }
}

impl std::fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// ENGINE TASK (die serielle Verarbeitungs-Schleife)
// ============================================================================

struct EngineTask {
    config: EngineConfig,
    router: SignalRouter,
    machine: SessionStateMachine,
    ice: IceCandidateBuffer,
    transport: Arc<dyn SignalTransport>,
    media: Arc<dyn MediaCapability>,
    links: Arc<dyn PeerLinkFactory>,
    /// Exklusiv der aktiven Session gehörende Ressourcen
    link: Option<Arc<dyn PeerLink>>,
    tracks: Option<TrackHandle>,
    /// Offer eines klingelnden Anrufs, bis zur Annahme
    pending_offer: Option<SessionDescription>,
    forwarder: Option<JoinHandle<()>>,
    ring_timer: Option<JoinHandle<()>>,
    commands: mpsc::WeakSender<Command>,
    events: broadcast::Sender<CallEvent>,
    snapshot: Arc<Mutex<CallSession>>,
}

impl EngineTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::Receiver<CallSignal>,
    ) {
        let mut inbound_open = true;
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Handle weggeworfen: Schleife beenden
                    None => break,
                },
                signal = inbound.recv(), if inbound_open => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => {
                        tracing::warn!("Signaling stream closed for {}", self.config.identity);
                        inbound_open = false;
                        if self.machine.state().is_active() {
                            self.fail_call(CallError::TransportUnavailable(
                                "signaling stream closed".to_string(),
                            ))
                            .await;
                        }
                    }
                },
            }
        }

        // Aufräumen beim Herunterfahren
        if self.machine.state() != CallState::Idle {
            if let Some(signal) = self.end_signal() {
                self.publish_best_effort(signal).await;
            }
            self.machine.terminate(None);
            self.emit_state();
            self.finish_teardown().await;
        }
        self.transport.unsubscribe().await;
        tracing::info!("Call engine stopped for {}", self.config.identity);
    }

    // ========================================================================
    // COMMAND HANDLING (lokale API)
    // ========================================================================

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartCall { remote, reply } => {
                let _ = reply.send(self.handle_start_call(remote).await);
            }
            Command::AcceptCall { reply } => {
                let _ = reply.send(self.handle_accept_call().await);
            }
            Command::RejectCall { reply } => {
                let _ = reply.send(self.handle_reject_call().await);
            }
            Command::EndCall { reply } => {
                let _ = reply.send(self.handle_end_call().await);
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(self.handle_toggle(TrackKind::Audio).await);
            }
            Command::ToggleVideo { reply } => {
                let _ = reply.send(self.handle_toggle(TrackKind::Video).await);
            }
            Command::Peer { call_id, event } => self.handle_peer_event(call_id, event).await,
            Command::RingTimeout { call_id } => self.handle_ring_timeout(call_id).await,
        }
    }

    async fn handle_start_call(&mut self, remote: PeerId) -> Result<CallId, CallError> {
        let call_id = self.machine.start_dialing(remote.clone())?;
        tracing::info!("Dialing {} (call {})", remote, call_id);
        self.ice.bind(call_id);
        self.emit_state();

        if let Err(e) = self.setup_outgoing(call_id, &remote).await {
            tracing::warn!("Outgoing call setup failed: {}", e);
            // Übergang zurückrollen: keine halb-initialisierte Session
            self.release_resources().await;
            self.machine.reset();
            self.emit_state();
            return Err(e);
        }

        self.arm_ring_timeout(call_id);
        Ok(call_id)
    }

    /// Media erwerben, Link aufbauen, Offer erzeugen und veröffentlichen
    async fn setup_outgoing(&mut self, call_id: CallId, remote: &PeerId) -> Result<(), CallError> {
        self.acquire_tracks().await?;
        let link = self.create_link(call_id).await?;

        if let Some(handle) = self.tracks.clone() {
            link.add_track(&handle).await?;
        }

        let offer = link.create_offer().await?;
        link.set_local_description(offer.clone()).await?;

        let signal = CallSignal::request(
            self.config.identity.clone(),
            remote.clone(),
            call_id,
            offer.sdp,
        );
        self.transport.publish(signal).await?;
        Ok(())
    }

    async fn handle_accept_call(&mut self) -> Result<(), CallError> {
        // Zustand prüfen, bevor irgendetwas erworben wird
        self.machine.accept()?;
        self.clear_ring_timeout();
        self.emit_state();

        let call_id = self.machine.call_id().ok_or(CallError::NoIncomingCall)?;
        let remote = self.machine.remote().cloned().ok_or(CallError::NoIncomingCall)?;
        tracing::info!("Accepting call {} from {}", call_id, remote);

        if let Err(e) = self.setup_incoming(call_id, &remote).await {
            tracing::warn!("Incoming call setup failed: {}", e);
            // Anrufer nicht hängen lassen
            self.publish_best_effort(CallSignal::reject(
                self.config.identity.clone(),
                remote,
                call_id,
            ))
            .await;
            self.release_resources().await;
            self.machine.terminate(Some(e.clone()));
            self.emit_state();
            self.machine.reset();
            self.emit_state();
            return Err(e);
        }

        Ok(())
    }

    /// Media erwerben, Remote-Offer anwenden, Answer erzeugen und veröffentlichen
    async fn setup_incoming(&mut self, call_id: CallId, remote: &PeerId) -> Result<(), CallError> {
        let offer = self
            .pending_offer
            .take()
            .ok_or_else(|| CallError::PeerLinkFailed("missing stored offer".to_string()))?;

        self.acquire_tracks().await?;
        let link = self.create_link(call_id).await?;

        link.set_remote_description(offer).await?;
        // Während des Klingelns gepufferte Candidates jetzt anwenden
        self.ice.flush(link.as_ref()).await?;

        if let Some(handle) = self.tracks.clone() {
            link.add_track(&handle).await?;
        }

        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;

        let signal = CallSignal::accept(
            self.config.identity.clone(),
            remote.clone(),
            call_id,
            answer.sdp,
        );
        self.transport.publish(signal).await?;
        Ok(())
    }

    async fn handle_reject_call(&mut self) -> Result<(), CallError> {
        self.machine.reject()?;
        self.clear_ring_timeout();

        if let (Some(call_id), Some(remote)) =
            (self.machine.call_id(), self.machine.remote().cloned())
        {
            tracing::info!("Rejecting call {} from {}", call_id, remote);
            self.publish_best_effort(CallSignal::reject(
                self.config.identity.clone(),
                remote,
                call_id,
            ))
            .await;
        }

        self.emit_state();
        self.finish_teardown().await;
        Ok(())
    }

    async fn handle_end_call(&mut self) -> Result<(), CallError> {
        if !self.machine.begin_ending() {
            // endCall aus Idle ist ein stilles No-op
            return Ok(());
        }
        self.clear_ring_timeout();
        self.emit_state();

        // Best-effort: lokales Aufräumen hängt nicht am Publish
        if let Some(signal) = self.end_signal() {
            self.publish_best_effort(signal).await;
        }

        self.machine.terminate(None);
        self.emit_state();
        self.finish_teardown().await;
        Ok(())
    }

    async fn handle_toggle(&mut self, kind: TrackKind) -> Result<bool, CallError> {
        let value = match kind {
            TrackKind::Audio => self.machine.toggle_mute()?,
            TrackKind::Video => self.machine.toggle_video()?,
        };

        if let Some(handle) = self.tracks.clone() {
            let enabled = match kind {
                // value ist hier der Mute-Status, Track-Flag ist invertiert
                TrackKind::Audio => !value,
                TrackKind::Video => value,
            };
            self.media.set_enabled(&handle, kind, enabled).await;
        }

        self.refresh_snapshot();
        Ok(value)
    }

    // ========================================================================
    // SIGNAL HANDLING (eingehende Nachrichten)
    // ========================================================================

    async fn handle_signal(&mut self, signal: CallSignal) {
        if !self.router.admit(&signal, self.machine.call_id().as_ref()) {
            return;
        }

        match signal.kind {
            SignalKind::CallRequest => self.on_call_request(signal).await,
            SignalKind::CallAccept => self.on_call_accept(signal).await,
            SignalKind::CallReject | SignalKind::CallEnd => self.on_remote_terminate(signal).await,
            SignalKind::IceCandidate => self.on_remote_candidate(signal).await,
        }
    }

    async fn on_call_request(&mut self, signal: CallSignal) {
        match self.machine.ring(signal.call_id, signal.from.clone()) {
            Ok(()) => self.begin_ringing(signal),
            Err(_) => {
                // Wiederholter Request für den laufenden Anruf: kein Besetzt
                if self.machine.call_id() == Some(signal.call_id) {
                    tracing::debug!("Ignoring duplicate call-request for {}", signal.call_id);
                    return;
                }

                // Besetzt oder Glare
                let glare = self.machine.state() == CallState::Dialing
                    && self.machine.remote() == Some(&signal.from);

                if glare
                    && self.config.glare == GlarePolicy::PreferLowerIdentity
                    && signal.from < self.config.identity
                {
                    // Der Anruf der kleineren Identität gewinnt
                    tracing::info!("Glare with {}: yielding to their call", signal.from);
                    self.release_resources().await;
                    self.clear_ring_timeout();
                    self.machine.reset();
                    if self
                        .machine
                        .ring(signal.call_id, signal.from.clone())
                        .is_ok()
                    {
                        self.begin_ringing(signal);
                    }
                } else {
                    tracing::info!("Busy: rejecting call {} from {}", signal.call_id, signal.from);
                    self.publish_best_effort(CallSignal::reject_busy(
                        self.config.identity.clone(),
                        signal.from,
                        signal.call_id,
                    ))
                    .await;
                }
            }
        }
    }

    /// Gemeinsamer Pfad nach erfolgreichem Übergang in Ringing
    fn begin_ringing(&mut self, signal: CallSignal) {
        tracing::info!("Incoming call {} from {}", signal.call_id, signal.from);
        self.ice.bind(signal.call_id);
        self.pending_offer = Some(SessionDescription::offer(signal.payload));
        self.emit_state();
        let _ = self.events.send(CallEvent::IncomingCall {
            call_id: signal.call_id,
            from: signal.from,
        });
        self.arm_ring_timeout(signal.call_id);
    }

    async fn on_call_accept(&mut self, signal: CallSignal) {
        if !self.machine.answered() {
            tracing::debug!("Discarding call-accept in state {}", self.machine.state());
            return;
        }
        self.clear_ring_timeout();

        let Some(link) = self.link.clone() else {
            self.fail_call(CallError::PeerLinkFailed("link missing on accept".to_string()))
                .await;
            return;
        };

        if let Err(e) = link
            .set_remote_description(SessionDescription::answer(signal.payload))
            .await
        {
            self.fail_call(e.into()).await;
            return;
        }

        // Gepufferte Candidates in Ankunftsreihenfolge anwenden
        if let Err(e) = self.ice.flush(link.as_ref()).await {
            self.fail_call(e.into()).await;
            return;
        }

        self.emit_state();
    }

    async fn on_remote_terminate(&mut self, signal: CallSignal) {
        if self.machine.state() == CallState::Idle {
            return;
        }

        let reason = if signal.is_busy() {
            Some(CallError::CallBusy)
        } else {
            None
        };
        tracing::info!("Call {} terminated by {} ({})", signal.call_id, signal.from, signal.kind);

        self.clear_ring_timeout();
        self.machine.terminate(reason);
        self.emit_state();
        self.finish_teardown().await;
    }

    async fn on_remote_candidate(&mut self, signal: CallSignal) {
        let candidate = IceCandidate(signal.payload);

        if self.ice.remote_ready() {
            if let Some(link) = self.link.clone() {
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    tracing::warn!("Failed to apply ICE candidate: {}", e);
                }
            }
        } else {
            self.ice.enqueue(&signal.call_id, candidate);
        }
    }

    // ========================================================================
    // PEER-LINK-EREIGNISSE
    // ========================================================================

    async fn handle_peer_event(&mut self, call_id: CallId, event: PeerEvent) {
        // Ereignisse toter Links ignorieren
        if self.machine.call_id() != Some(call_id) {
            return;
        }

        match event {
            PeerEvent::StateChanged(LinkState::Connected) => {
                if self.machine.connected() {
                    tracing::info!("Call {} connected", call_id);
                    self.emit_state();
                }
            }
            PeerEvent::StateChanged(state @ (LinkState::Failed | LinkState::Disconnected)) => {
                if matches!(
                    self.machine.state(),
                    CallState::Negotiating | CallState::Connected
                ) {
                    self.fail_call(CallError::PeerLinkFailed(format!("link {:?}", state)))
                        .await;
                }
            }
            PeerEvent::StateChanged(_) => {}
            PeerEvent::Candidate(candidate) => {
                if let Some(remote) = self.machine.remote().cloned() {
                    self.publish_best_effort(CallSignal::candidate(
                        self.config.identity.clone(),
                        remote,
                        call_id,
                        candidate.0,
                    ))
                    .await;
                }
            }
            PeerEvent::RemoteTrack(track) => {
                let _ = self.events.send(CallEvent::RemoteTrack { call_id, track });
            }
        }
    }

    async fn handle_ring_timeout(&mut self, call_id: CallId) {
        if self.machine.call_id() != Some(call_id)
            || !matches!(self.machine.state(), CallState::Dialing | CallState::Ringing)
        {
            return;
        }

        tracing::info!("Call {} timed out unanswered", call_id);
        if let Some(signal) = self.end_signal() {
            self.publish_best_effort(signal).await;
        }
        self.machine.terminate(None);
        self.emit_state();
        self.finish_teardown().await;
    }

    // ========================================================================
    // RESSOURCEN & HILFSFUNKTIONEN
    // ========================================================================

    /// Lokale Tracks gemäß Session-Flags erwerben
    async fn acquire_tracks(&mut self) -> Result<(), CallError> {
        let session = self.machine.session();
        let handle = self
            .media
            .acquire(true, session.is_video_enabled)
            .await
            .map_err(CallError::from)?;

        if session.is_muted {
            self.media
                .set_enabled(&handle, TrackKind::Audio, false)
                .await;
        }

        self.tracks = Some(handle);
        Ok(())
    }

    /// Erzeugt den Peer-Link und verdrahtet seine Ereignisse in die Schleife
    async fn create_link(&mut self, call_id: CallId) -> Result<Arc<dyn PeerLink>, CallError> {
        let (peer_tx, mut peer_rx) = mpsc::channel(PEER_EVENT_CAPACITY);
        let link = self.links.create(peer_tx).await.map_err(CallError::from)?;

        let commands = self.commands.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = peer_rx.recv().await {
                let Some(tx) = commands.upgrade() else { break };
                if tx.send(Command::Peer { call_id, event }).await.is_err() {
                    break;
                }
            }
        });

        self.forwarder = Some(forwarder);
        self.link = Some(Arc::clone(&link));
        Ok(link)
    }

    /// Peer-Link-Fehler: Failed → Ended, Ressourcen bedingungslos freigeben
    async fn fail_call(&mut self, error: CallError) {
        tracing::error!("Call failed: {}", error);
        self.clear_ring_timeout();
        self.machine.fail(error.clone());
        self.emit_state();
        self.release_resources().await;
        self.machine.terminate(Some(error));
        self.emit_state();
        self.machine.reset();
        self.emit_state();
    }

    /// Nach einem Terminal-Übergang: freigeben und frisch auf Idle
    async fn finish_teardown(&mut self) {
        self.release_resources().await;
        self.machine.reset();
        self.emit_state();
    }

    /// Gibt Link und Tracks frei; doppelte Freigabe ist ein No-op
    async fn release_resources(&mut self) {
        if let Some(timer) = self.ring_timer.take() {
            timer.abort();
        }
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(handle) = self.tracks.take() {
            self.media.release(handle).await;
        }
        self.pending_offer = None;
        self.ice.discard();
    }

    /// call-end für die aktuelle Session, falls adressierbar
    fn end_signal(&self) -> Option<CallSignal> {
        let call_id = self.machine.call_id()?;
        let remote = self.machine.remote().cloned()?;
        Some(CallSignal::end(
            self.config.identity.clone(),
            remote,
            call_id,
        ))
    }

    fn arm_ring_timeout(&mut self, call_id: CallId) {
        let Some(timeout) = self.config.ring_timeout else {
            return;
        };

        let commands = self.commands.clone();
        self.ring_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::RingTimeout { call_id }).await;
            }
        }));
    }

    fn clear_ring_timeout(&mut self) {
        if let Some(timer) = self.ring_timer.take() {
            timer.abort();
        }
    }

    async fn publish_best_effort(&self, signal: CallSignal) {
        if let Err(e) = self.transport.publish(signal).await {
            tracing::warn!("Failed to publish signal: {}", e);
        }
    }

    fn refresh_snapshot(&self) {
        *self.snapshot.lock() = self.machine.session().clone();
    }

    /// Snapshot aktualisieren und Zustandsänderung verbreiten
    fn emit_state(&self) {
        self.refresh_snapshot();
        let session = self.machine.session();
        let _ = self.events.send(CallEvent::StateChanged {
            state: session.state,
            error: session.last_error.clone(),
        });
    }
}
