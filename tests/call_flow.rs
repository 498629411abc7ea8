//! End-to-End-Tests der Call-Engine
//!
//! Zwei Engines laufen über das In-Prozess-Relay gegeneinander;
//! Media und Peer-Link sind Attrappen aus `common`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use common::{MockLinkFactory, MockMedia};
use wavecall::{
    CallError, CallEvent, CallId, CallOrchestrator, CallSignal, CallState, EngineConfig,
    GlarePolicy, LinkState, MemoryRelay, PeerEvent, PeerId, SignalTransport,
};

// ============================================================================
// TEST HARNESS
// ============================================================================

struct Peer {
    engine: CallOrchestrator,
    media: Arc<MockMedia>,
    links: Arc<MockLinkFactory>,
    events: broadcast::Receiver<CallEvent>,
}

async fn spawn_peer(relay: &MemoryRelay, name: &str) -> Peer {
    spawn_peer_with(relay, EngineConfig::new(name)).await
}

async fn spawn_peer_with(relay: &MemoryRelay, config: EngineConfig) -> Peer {
    let media = MockMedia::new();
    let links = MockLinkFactory::new();
    let engine = CallOrchestrator::spawn(
        config,
        Arc::new(relay.endpoint()),
        media.clone(),
        links.clone(),
    )
    .await
    .unwrap();
    let events = engine.subscribe();

    Peer {
        engine,
        media,
        links,
        events,
    }
}

/// Wartet bis der Event-Stream den gewünschten Zustand meldet
async fn wait_for_state(rx: &mut broadcast::Receiver<CallEvent>, want: CallState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(CallEvent::StateChanged { state, .. }) if state == want => break,
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for state {want}"));
}

/// Wartet auf den eingehenden Anruf
async fn wait_for_incoming(rx: &mut broadcast::Receiver<CallEvent>) -> (CallId, PeerId) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(CallEvent::IncomingCall { call_id, from }) => break (call_id, from),
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for incoming call")
}

/// Wartet auf Failed und liefert die Fehlerklassifikation
async fn wait_for_failure(rx: &mut broadcast::Receiver<CallEvent>) -> CallError {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(CallEvent::StateChanged {
                    state: CallState::Failed,
                    error,
                }) => break error.expect("Failed without error classification"),
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for failure")
}

/// Signale zustellen lassen
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Kompletter Aufbau bis Connected auf beiden Seiten
async fn establish(alice: &mut Peer, bob: &mut Peer) -> CallId {
    let call_id = alice
        .engine
        .start_call(bob.engine.identity().clone())
        .await
        .unwrap();

    wait_for_incoming(&mut bob.events).await;
    bob.engine.accept_call().await.unwrap();
    wait_for_state(&mut alice.events, CallState::Negotiating).await;

    alice
        .links
        .emit(PeerEvent::StateChanged(LinkState::Connected))
        .await;
    bob.links
        .emit(PeerEvent::StateChanged(LinkState::Connected))
        .await;

    wait_for_state(&mut alice.events, CallState::Connected).await;
    wait_for_state(&mut bob.events, CallState::Connected).await;
    call_id
}

// ============================================================================
// VERBINDUNGSAUFBAU
// ============================================================================

#[tokio::test]
async fn test_dial_rings_the_callee() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    let call_id = alice.engine.start_call("bob").await.unwrap();

    // Lokaler Übergang ist beim Rückkehren bereits angewendet
    assert_eq!(alice.engine.state(), CallState::Dialing);
    wait_for_state(&mut alice.events, CallState::Dialing).await;

    // Genau ein Request kommt beim Angerufenen an
    let (incoming_id, from) = wait_for_incoming(&mut bob.events).await;
    assert_eq!(incoming_id, call_id);
    assert_eq!(from, PeerId::from("alice"));
    assert_eq!(bob.engine.state(), CallState::Ringing);

    // Klingeln erwirbt noch keine Media
    assert_eq!(bob.media.acquire_calls(), 0);
}

#[tokio::test]
async fn test_full_call_reaches_connected_via_negotiating() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    let call_id = alice.engine.start_call("bob").await.unwrap();
    wait_for_incoming(&mut bob.events).await;

    bob.engine.accept_call().await.unwrap();
    assert_eq!(bob.engine.state(), CallState::Negotiating);

    // Beide Seiten haben lokale und entfernte Description gesetzt,
    // bevor irgendjemand Connected melden darf
    wait_for_state(&mut alice.events, CallState::Negotiating).await;
    let alice_link = alice.links.last_link().unwrap();
    let bob_link = bob.links.last_link().unwrap();
    assert!(alice_link.local_desc.lock().is_some());
    assert!(alice_link.remote_desc.lock().is_some());
    assert!(bob_link.local_desc.lock().is_some());
    assert!(bob_link.remote_desc.lock().is_some());

    alice
        .links
        .emit(PeerEvent::StateChanged(LinkState::Connected))
        .await;
    bob.links
        .emit(PeerEvent::StateChanged(LinkState::Connected))
        .await;
    wait_for_state(&mut alice.events, CallState::Connected).await;
    wait_for_state(&mut bob.events, CallState::Connected).await;

    assert_eq!(alice.engine.session().call_id, Some(call_id));
    assert_eq!(alice.media.held(), 1);
    assert_eq!(bob.media.held(), 1);
}

#[tokio::test]
async fn test_second_start_call_is_rejected_without_mutation() {
    let relay = MemoryRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let _bob = spawn_peer(&relay, "bob").await;

    let call_id = alice.engine.start_call("bob").await.unwrap();

    let err = alice.engine.start_call("carol").await.unwrap_err();
    assert_eq!(err, CallError::AlreadyInCall);

    // Bestehende Session ist unangetastet
    let session = alice.engine.session();
    assert_eq!(session.state, CallState::Dialing);
    assert_eq!(session.call_id, Some(call_id));
    assert_eq!(session.remote, Some(PeerId::from("bob")));
}

#[tokio::test]
async fn test_accept_without_incoming_call() {
    let relay = MemoryRelay::new();
    let alice = spawn_peer(&relay, "alice").await;

    let err = alice.engine.accept_call().await.unwrap_err();
    assert_eq!(err, CallError::NoIncomingCall);
    // Keine Media-Akquise für einen abgelehnten Aufruf
    assert_eq!(alice.media.acquire_calls(), 0);

    let err = alice.engine.reject_call().await.unwrap_err();
    assert_eq!(err, CallError::NoIncomingCall);
}

// ============================================================================
// ABLEHNEN & AUFLEGEN
// ============================================================================

#[tokio::test]
async fn test_reject_ends_both_sides_without_media() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    alice.engine.start_call("bob").await.unwrap();
    wait_for_incoming(&mut bob.events).await;

    bob.engine.reject_call().await.unwrap();

    // Angerufener: Ended, dann frisches Idle, niemals Media erworben
    wait_for_state(&mut bob.events, CallState::Ended).await;
    wait_for_state(&mut bob.events, CallState::Idle).await;
    assert_eq!(bob.media.acquire_calls(), 0);

    // Anrufer: Reject kommt an, Ressourcen sind weg
    wait_for_state(&mut alice.events, CallState::Ended).await;
    wait_for_state(&mut alice.events, CallState::Idle).await;
    assert_eq!(alice.media.held(), 0);
    assert!(alice.links.last_link().unwrap().is_closed());
}

#[tokio::test]
async fn test_end_call_is_idempotent_and_releases_everything() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    // Aus Idle ein stilles No-op
    alice.engine.end_call().await.unwrap();
    assert_eq!(alice.engine.state(), CallState::Idle);

    establish(&mut alice, &mut bob).await;

    alice.engine.end_call().await.unwrap();
    assert_eq!(alice.engine.state(), CallState::Idle);
    assert_eq!(alice.media.held(), 0);
    assert!(alice.links.last_link().unwrap().is_closed());

    // Gegenseite räumt auf das call-end hin ab
    wait_for_state(&mut bob.events, CallState::Ended).await;
    wait_for_state(&mut bob.events, CallState::Idle).await;
    assert_eq!(bob.media.held(), 0);
    assert!(bob.links.last_link().unwrap().is_closed());

    // Doppeltes Auflegen bleibt in Ordnung
    alice.engine.end_call().await.unwrap();
    assert_eq!(alice.engine.state(), CallState::Idle);
}

// ============================================================================
// ICE-PUFFERUNG
// ============================================================================

#[tokio::test]
async fn test_early_candidates_buffer_and_flush_in_order() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    let call_id = alice.engine.start_call("bob").await.unwrap();
    wait_for_incoming(&mut bob.events).await;

    // Candidates treffen vor dem call-accept ein
    let ghost = relay.endpoint();
    for i in 0..2 {
        ghost
            .publish(CallSignal::candidate(
                PeerId::from("bob"),
                PeerId::from("alice"),
                call_id,
                format!("cand-{i}"),
            ))
            .await
            .unwrap();
    }
    settle().await;

    // Noch nichts am Link angewendet
    let alice_link = alice.links.last_link().unwrap();
    assert!(alice_link.applied_candidates().is_empty());

    bob.engine.accept_call().await.unwrap();
    wait_for_state(&mut alice.events, CallState::Negotiating).await;
    settle().await;

    // Genau einmal angewendet, in Ankunftsreihenfolge
    assert_eq!(alice_link.applied_candidates(), vec!["cand-0", "cand-1"]);

    // Nach der Remote Description geht es direkt an den Link
    ghost
        .publish(CallSignal::candidate(
            PeerId::from("bob"),
            PeerId::from("alice"),
            call_id,
            "cand-2".to_string(),
        ))
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        alice_link.applied_candidates(),
        vec!["cand-0", "cand-1", "cand-2"]
    );
}

#[tokio::test]
async fn test_stale_signals_are_ignored() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    establish(&mut alice, &mut bob).await;

    // call-end und Candidate mit fremder Call-ID prallen ab
    let ghost = relay.endpoint();
    let stale = CallId::generate();
    ghost
        .publish(CallSignal::end(
            PeerId::from("bob"),
            PeerId::from("alice"),
            stale,
        ))
        .await
        .unwrap();
    ghost
        .publish(CallSignal::candidate(
            PeerId::from("bob"),
            PeerId::from("alice"),
            stale,
            "cand-x".to_string(),
        ))
        .await
        .unwrap();
    settle().await;

    assert_eq!(alice.engine.state(), CallState::Connected);
    let candidates = alice.links.last_link().unwrap().applied_candidates();
    assert!(!candidates.contains(&"cand-x".to_string()));
}

// ============================================================================
// FEHLERPFADE
// ============================================================================

#[tokio::test]
async fn test_link_failure_tears_down_automatically() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    establish(&mut alice, &mut bob).await;

    alice
        .links
        .emit(PeerEvent::StateChanged(LinkState::Failed))
        .await;

    // Failed → Ended → Idle, ganz ohne weiteren API-Aufruf
    let error = wait_for_failure(&mut alice.events).await;
    assert!(matches!(error, CallError::PeerLinkFailed(_)));
    wait_for_state(&mut alice.events, CallState::Ended).await;
    wait_for_state(&mut alice.events, CallState::Idle).await;

    assert_eq!(alice.media.held(), 0);
    assert!(alice.links.last_link().unwrap().is_closed());
}

#[tokio::test]
async fn test_media_failure_aborts_dial() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    spawn_peer(&relay, "bob").await;

    alice.media.set_fail(true);
    let err = alice.engine.start_call("bob").await.unwrap_err();
    assert!(matches!(err, CallError::MediaAcquisitionFailed(_)));

    // Keine halb-initialisierte Session
    wait_for_state(&mut alice.events, CallState::Idle).await;
    assert_eq!(alice.engine.state(), CallState::Idle);
    assert_eq!(alice.links.created(), 0);
    assert_eq!(alice.media.held(), 0);
}

#[tokio::test]
async fn test_media_failure_on_accept_rejects_the_caller() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    alice.engine.start_call("bob").await.unwrap();
    wait_for_incoming(&mut bob.events).await;

    bob.media.set_fail(true);
    let err = bob.engine.accept_call().await.unwrap_err();
    assert!(matches!(err, CallError::MediaAcquisitionFailed(_)));
    assert_eq!(bob.engine.state(), CallState::Idle);
    assert_eq!(bob.media.held(), 0);

    // Der Anrufer bleibt nicht hängen
    wait_for_state(&mut alice.events, CallState::Ended).await;
    wait_for_state(&mut alice.events, CallState::Idle).await;
}

// ============================================================================
// GLARE
// ============================================================================

#[tokio::test]
async fn test_glare_rejects_second_request_with_busy() {
    let relay = MemoryRelay::new();
    let alice = spawn_peer(&relay, "alice").await;

    // "bob" ist nur ein roher Endpunkt, damit wir beide Seiten steuern
    let bob = relay.endpoint();
    let mut bob_rx = bob.subscribe(&PeerId::from("bob")).await.unwrap();

    alice.engine.start_call("bob").await.unwrap();
    let request = bob_rx.recv().await.unwrap();

    // Bobs konkurrierender Anruf trifft ein, während Alice wählt
    let glare_id = CallId::generate();
    bob.publish(CallSignal::request(
        PeerId::from("bob"),
        PeerId::from("alice"),
        glare_id,
        "v=0 glare-offer".to_string(),
    ))
    .await
    .unwrap();

    // Alice lehnt mit Besetzt ab und bleibt beim eigenen Anruf
    let reject = bob_rx.recv().await.unwrap();
    assert!(reject.is_busy());
    assert_eq!(reject.call_id, glare_id);
    assert_eq!(alice.engine.state(), CallState::Dialing);
    assert_eq!(alice.engine.session().call_id, Some(request.call_id));
}

#[tokio::test]
async fn test_glare_prefer_lower_identity_yields() {
    let relay = MemoryRelay::new();
    let config =
        EngineConfig::new("bob").with_glare_policy(GlarePolicy::PreferLowerIdentity);
    let mut bob = spawn_peer_with(&relay, config).await;

    let alice = relay.endpoint();
    let mut alice_rx = alice.subscribe(&PeerId::from("alice")).await.unwrap();

    bob.engine.start_call("alice").await.unwrap();
    alice_rx.recv().await.unwrap();
    assert_eq!(bob.media.held(), 1);

    // Die kleinere Identität gewinnt: Bob verwirft den eigenen Wählversuch
    let glare_id = CallId::generate();
    alice
        .publish(CallSignal::request(
            PeerId::from("alice"),
            PeerId::from("bob"),
            glare_id,
            "v=0 glare-offer".to_string(),
        ))
        .await
        .unwrap();

    let (incoming_id, from) = wait_for_incoming(&mut bob.events).await;
    assert_eq!(incoming_id, glare_id);
    assert_eq!(from, PeerId::from("alice"));
    assert_eq!(bob.engine.state(), CallState::Ringing);

    // Ressourcen des verworfenen Anrufs sind frei
    assert_eq!(bob.media.held(), 0);
    assert!(bob.links.last_link().unwrap().is_closed());

    // Annahme läuft ganz normal gegen den gewonnenen Anruf
    bob.engine.accept_call().await.unwrap();
    let accept = alice_rx.recv().await.unwrap();
    assert_eq!(accept.call_id, glare_id);
}

// ============================================================================
// TOGGLES & TIMEOUT
// ============================================================================

#[tokio::test]
async fn test_toggle_mute_and_video() {
    let relay = MemoryRelay::new();
    let mut alice = spawn_peer(&relay, "alice").await;
    let mut bob = spawn_peer(&relay, "bob").await;

    // Ohne Session gibt es nichts zu schalten
    assert_eq!(
        alice.engine.toggle_mute().await.unwrap_err(),
        CallError::NoActiveSession
    );

    establish(&mut alice, &mut bob).await;

    assert!(alice.engine.toggle_mute().await.unwrap());
    assert!(alice.engine.session().is_muted);

    assert!(!alice.engine.toggle_video().await.unwrap());
    assert!(!alice.engine.session().is_video_enabled);

    // Die Flags sind am Track angekommen
    let log = alice.media.enabled_log.lock().clone();
    assert!(log.contains(&(wavecall::TrackKind::Audio, false)));
    assert!(log.contains(&(wavecall::TrackKind::Video, false)));

    assert!(!alice.engine.toggle_mute().await.unwrap());
    assert!(!alice.engine.session().is_muted);
}

#[tokio::test]
async fn test_ring_timeout_ends_unanswered_dial() {
    let relay = MemoryRelay::new();
    let config = EngineConfig::new("alice").with_ring_timeout(Duration::from_millis(100));
    let mut alice = spawn_peer_with(&relay, config).await;

    let bob = relay.endpoint();
    let mut bob_rx = bob.subscribe(&PeerId::from("bob")).await.unwrap();

    alice.engine.start_call("bob").await.unwrap();
    let request = bob_rx.recv().await.unwrap();

    // Niemand nimmt ab: die Engine räumt von selbst auf
    wait_for_state(&mut alice.events, CallState::Ended).await;
    wait_for_state(&mut alice.events, CallState::Idle).await;
    assert_eq!(alice.media.held(), 0);

    // Die Gegenseite bekommt ein call-end für denselben Anruf
    let end = bob_rx.recv().await.unwrap();
    assert_eq!(end.kind, wavecall::SignalKind::CallEnd);
    assert_eq!(end.call_id, request.call_id);
}

#[tokio::test]
async fn test_shutdown_unsubscribes() {
    let relay = MemoryRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    assert_eq!(relay.subscriber_count(), 1);

    alice.engine.shutdown().await;
    assert_eq!(relay.subscriber_count(), 0);
}
