//! End-to-end interaction loop tests with scripted engines.
//!
//! These drive the coordinator with mock recognition/synthesis engines and a
//! wiremock relay, with every timing window shrunk so the loop runs in
//! milliseconds.

use async_trait::async_trait;
use onerobo::capture::{
    CaptureSession, RecognitionEngine, RecognitionError, RecognitionErrorKind, RecognitionEvent,
};
use onerobo::config::{AssistantConfig, CaptureConfig, PlaybackConfig, RelayConfig};
use onerobo::pipeline::messages::{GameId, MicStatus, UiEvent};
use onerobo::playback::{
    SynthesisEngine, SynthesisError, SynthesisEvent, Utterance, Voice,
};
use onerobo::relay::RelayClient;
use onerobo::InteractionCoordinator;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ────────────────────────────────────────────────────────────────────────────
// Scripted engines
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct RecognitionScript {
    starts: Arc<AtomicUsize>,
    events: Arc<Mutex<VecDeque<RecognitionEvent>>>,
}

impl RecognitionScript {
    fn new() -> Self {
        Self {
            starts: Arc::new(AtomicUsize::new(0)),
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn push(&self, ev: RecognitionEvent) {
        self.events.lock().unwrap().push_back(ev);
    }

    fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

struct MockRecognition {
    script: RecognitionScript,
    /// When set, every start immediately runs to a normal end.
    end_on_start: bool,
}

#[async_trait]
impl RecognitionEngine for MockRecognition {
    async fn start(&mut self) -> Result<(), RecognitionError> {
        self.script.starts.fetch_add(1, Ordering::SeqCst);
        let mut events = self.script.events.lock().unwrap();
        events.push_back(RecognitionEvent::Started);
        if self.end_on_start {
            events.push_back(RecognitionEvent::Ended);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RecognitionError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RecognitionEvent> {
        loop {
            if let Some(ev) = self.script.events.lock().unwrap().pop_front() {
                return Some(ev);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[derive(Clone)]
struct SynthesisScript {
    spoken: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<VecDeque<SynthesisEvent>>>,
}

impl SynthesisScript {
    fn new() -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

struct MockSynthesis {
    script: SynthesisScript,
    /// When set, every utterance immediately starts and ends.
    auto_finish: bool,
    seq: u64,
}

#[async_trait]
impl SynthesisEngine for MockSynthesis {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Google US English Female", "en-US")]
    }

    async fn speak(&mut self, utterance: &Utterance) -> Result<u64, SynthesisError> {
        self.seq += 1;
        self.script
            .spoken
            .lock()
            .unwrap()
            .push(utterance.text.clone());
        if self.auto_finish {
            let mut events = self.script.events.lock().unwrap();
            events.push_back(SynthesisEvent::Started { token: self.seq });
            events.push_back(SynthesisEvent::Ended { token: self.seq });
        }
        Ok(self.seq)
    }

    async fn cancel(&mut self) {}

    async fn resume(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }

    fn is_pending(&self) -> bool {
        false
    }

    async fn next_event(&mut self) -> Option<SynthesisEvent> {
        loop {
            if let Some(ev) = self.script.events.lock().unwrap().pop_front() {
                return Some(ev);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

fn fast_config(relay_endpoint: String) -> AssistantConfig {
    AssistantConfig {
        capture: CaptureConfig {
            restart_cooldown_ms: 30,
            restart_delay_ms: 10,
            error_backoff_ms: 20,
            health_check_interval_ms: 100,
            silence_commit_ms: 40,
            ..CaptureConfig::default()
        },
        playback: PlaybackConfig {
            cancel_settle_ms: 1,
            permission_fallback_display_ms: 20,
            error_fallback_display_ms: 20,
            watchdog_ms_per_char: 1,
            watchdog_min_ms: 100,
            supervisor_interval_ms: 400,
            resume_delay_ms: 10,
            ..PlaybackConfig::default()
        },
        relay: RelayConfig {
            endpoint: relay_endpoint,
            timeout_ms: 1_000,
            emergency_launch_ms: 100,
        },
        ..AssistantConfig::default()
    }
}

struct Loop {
    recognition: RecognitionScript,
    synthesis: SynthesisScript,
    ui_rx: broadcast::Receiver<UiEvent>,
    handle: onerobo::CoordinatorHandle,
    cancel: CancellationToken,
}

async fn spawn_loop(
    config: AssistantConfig,
    end_on_start: bool,
    auto_finish: bool,
) -> Loop {
    let recognition = RecognitionScript::new();
    let synthesis = SynthesisScript::new();
    let (ui_tx, ui_rx) = broadcast::channel(256);

    let coordinator = InteractionCoordinator::new(config).with_ui_events(ui_tx);
    let handle = coordinator.handle();
    let cancel = coordinator.cancel_token();

    let rec = MockRecognition {
        script: recognition.clone(),
        end_on_start,
    };
    let syn = MockSynthesis {
        script: synthesis.clone(),
        auto_finish,
        seq: 0,
    };
    tokio::spawn(coordinator.run(Box::new(rec), Box::new(syn)));

    Loop {
        recognition,
        synthesis,
        ui_rx,
        handle,
        cancel,
    }
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<UiEvent>, mut pred: F) -> UiEvent
where
    F: FnMut(&UiEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let ev = rx.recv().await.expect("ui channel open");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("expected ui event within deadline")
}

// ────────────────────────────────────────────────────────────────────────────
// Scenarios
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn speaking_a_game_phrase_opens_the_game_after_the_reply() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"message": "let's play tic tac toe"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Okay, let's play!"})),
        )
        .expect(1)
        .mount(&relay)
        .await;

    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        true,
    )
    .await;

    // permission prompt first, nothing started yet
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::PermissionRequired)
    })
    .await;
    assert_eq!(looped.recognition.start_count(), 0);

    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Partial("let's play tic tac toe".to_owned()));

    let opened = wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::GameOpened { .. })
    })
    .await;
    let UiEvent::GameOpened {
        game,
        auto_opponent,
    } = opened
    else {
        unreachable!();
    };
    assert_eq!(game, GameId::TicTacToe);
    assert!(auto_opponent);

    assert_eq!(looped.synthesis.spoken(), vec!["Okay, let's play!".to_owned()]);

    // and the loop resumes listening afterwards
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;
    looped.cancel.cancel();
}

#[tokio::test]
async fn final_result_commits_without_waiting_for_silence() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi!"})))
        .expect(1)
        .mount(&relay)
        .await;

    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        true,
    )
    .await;
    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("hello there".to_owned()));

    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::DisplayReply(text) if text == "Hi!")
    })
    .await;
    looped.cancel.cancel();
}

#[tokio::test]
async fn relay_failure_speaks_the_fixed_fallback() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&relay)
        .await;

    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        true,
    )
    .await;
    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("what's the weather".to_owned()));

    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::ClearDisplay)
    })
    .await;
    assert_eq!(
        looped.synthesis.spoken(),
        vec!["Sorry, I had trouble understanding that.".to_owned()]
    );
    looped.cancel.cancel();
}

#[tokio::test]
async fn failed_exchange_stays_out_of_the_conversation_history() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&relay)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi!"})))
        .mount(&relay)
        .await;

    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        true,
    )
    .await;
    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("hello".to_owned()));
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::ClearDisplay)
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("are you there".to_owned()));
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::DisplayReply(text) if text == "Hi!")
    })
    .await;

    // the failed first exchange left no dangling user turn behind
    let requests = relay.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: serde_json::Value = requests[1].body_json().unwrap();
    assert_eq!(second["conversationHistory"], json!([]));
    looped.cancel.cancel();
}

#[tokio::test]
async fn pending_launch_fires_exactly_once_when_completion_races_the_emergency_timer() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Sudoku!"})))
        .mount(&relay)
        .await;

    // synthesis never reports events, so the playback watchdog (100ms) and
    // the emergency launch timer (100ms) race to consume the pending game
    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        false,
    )
    .await;
    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("please open sudoku".to_owned()));

    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::GameOpened { game: GameId::Sudoku, .. })
    })
    .await;

    // drain for a while; no second launch may appear
    let extra_launch = tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            if let Ok(UiEvent::GameOpened { .. }) = looped.ui_rx.recv().await {
                return;
            }
        }
    })
    .await;
    assert!(extra_launch.is_err(), "game was opened twice");
    looped.cancel.cancel();
}

#[tokio::test]
async fn closing_a_game_clears_leftovers_and_keeps_listening() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Trivia time!"})))
        .mount(&relay)
        .await;

    let mut looped = spawn_loop(
        fast_config(format!("{}/api/chat", relay.uri())),
        false,
        true,
    )
    .await;
    looped.handle.grant_permission();
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;

    looped
        .recognition
        .push(RecognitionEvent::Final("let's play trivia".to_owned()));
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::GameOpened { game: GameId::Trivia, .. })
    })
    .await;

    looped.handle.close_game();
    wait_for(&mut looped.ui_rx, |ev| matches!(ev, UiEvent::GameClosed)).await;
    wait_for(&mut looped.ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;
    looped.cancel.cancel();
}

// ────────────────────────────────────────────────────────────────────────────
// Capture start guard
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_attempts_respect_the_cooldown_window() {
    let script = RecognitionScript::new();
    let engine = MockRecognition {
        script: script.clone(),
        // every run ends immediately, provoking constant restart pressure
        end_on_start: true,
    };

    let config = CaptureConfig {
        restart_cooldown_ms: 100,
        restart_delay_ms: 5,
        error_backoff_ms: 5,
        health_check_interval_ms: 20,
        silence_commit_ms: 1_000,
        ..CaptureConfig::default()
    };
    let (gate_tx, gate_rx) = watch::channel(true);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = CaptureSession::new(config, Box::new(engine), gate_rx, event_tx, cancel.clone());
    tokio::spawn(session.run());

    tokio::time::sleep(Duration::from_millis(450)).await;
    cancel.cancel();
    drop(gate_tx);

    let starts = script.start_count();
    assert!(starts >= 2, "expected restarts, got {starts}");
    // 450ms at one start per 100ms cooldown, plus the initial attempt
    assert!(starts <= 6, "cooldown violated: {starts} starts in 450ms");

    // events flowed for each run
    let mut saw_started = false;
    while let Ok(ev) = event_rx.try_recv() {
        if matches!(ev, onerobo::capture::CaptureEvent::ListeningStarted) {
            saw_started = true;
        }
    }
    assert!(saw_started);
}

#[tokio::test]
async fn invalid_state_start_counts_as_listening() {
    struct AlreadyRunning {
        starts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecognitionEngine for AlreadyRunning {
        async fn start(&mut self) -> Result<(), RecognitionError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Err(RecognitionError::new(
                RecognitionErrorKind::InvalidState,
                "recognition has already started",
            ))
        }

        async fn stop(&mut self) -> Result<(), RecognitionError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Option<RecognitionEvent> {
            std::future::pending().await
        }
    }

    let starts = Arc::new(AtomicUsize::new(0));
    let config = CaptureConfig {
        restart_cooldown_ms: 10,
        restart_delay_ms: 5,
        error_backoff_ms: 5,
        health_check_interval_ms: 20,
        ..CaptureConfig::default()
    };
    let (gate_tx, gate_rx) = watch::channel(true);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = CaptureSession::new(
        config,
        Box::new(AlreadyRunning {
            starts: starts.clone(),
        }),
        gate_rx,
        event_tx,
        cancel.clone(),
    );
    tokio::spawn(session.run());

    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    drop(gate_tx);

    // the failed start counts as already-listening, so neither the restart
    // machinery nor the health tick piles on further attempts
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    let ev = event_rx.try_recv().expect("listening event");
    assert!(matches!(ev, onerobo::capture::CaptureEvent::ListeningStarted));
    assert!(event_rx.try_recv().is_err());
}

// ────────────────────────────────────────────────────────────────────────────
// Relay client wiring through the coordinator
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn coordinator_accepts_an_injected_relay_client() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hello!"})))
        .mount(&relay)
        .await;

    let config = fast_config(format!("{}/api/chat", relay.uri()));
    let client = RelayClient::new(&config.relay).unwrap();

    let recognition = RecognitionScript::new();
    let synthesis = SynthesisScript::new();
    let (ui_tx, mut ui_rx) = broadcast::channel(256);
    let coordinator = InteractionCoordinator::new(config)
        .with_ui_events(ui_tx)
        .with_relay(client);
    let handle = coordinator.handle();
    let cancel = coordinator.cancel_token();
    tokio::spawn(coordinator.run(
        Box::new(MockRecognition {
            script: recognition.clone(),
            end_on_start: false,
        }),
        Box::new(MockSynthesis {
            script: synthesis.clone(),
            auto_finish: true,
            seq: 0,
        }),
    ));

    handle.grant_permission();
    wait_for(&mut ui_rx, |ev| {
        matches!(ev, UiEvent::MicStatus(MicStatus::Listening))
    })
    .await;
    recognition.push(RecognitionEvent::Final("hi".to_owned()));
    wait_for(&mut ui_rx, |ev| {
        matches!(ev, UiEvent::DisplayReply(text) if text == "Hello!")
    })
    .await;
    cancel.cancel();
}
