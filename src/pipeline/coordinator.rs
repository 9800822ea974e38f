//! Orchestrates the full listen-relay-speak loop.
//!
//! One task owns all mutable interaction state. Capture and playback run as
//! separate session tasks; everything they report, every timer, and every UI
//! command funnels back into the coordinator's single event loop, so state
//! transitions never race. Deferred work (silence commits, the emergency
//! game launch, the capture resume delay) is generation-stamped: a timer
//! that fires after its generation moved on is ignored.

use crate::capture::{CaptureEvent, CaptureSession, CommitAction, CommitBuffer, RecognitionEngine};
use crate::config::AssistantConfig;
use crate::error::Result;
use crate::games::GameHost;
use crate::intent::detect_game_intent;
use crate::pipeline::messages::{
    CaptureState, ConversationTurn, MicStatus, PendingGameLaunch, UiEvent,
};
use crate::playback::{PlaybackEvent, PlaybackSession, SpeakRequest, SynthesisEngine};
use crate::relay::{RelayClient, RelayFailure, FALLBACK_REPLY};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands the rendering layer can send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorCommand {
    /// The user granted microphone/speech permission.
    GrantPermission,
    /// The open game was dismissed.
    CloseGame,
}

/// Cheap handle for sending [`CoordinatorCommand`]s.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::UnboundedSender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Report that permission was granted.
    pub fn grant_permission(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::GrantPermission);
    }

    /// Report that the open game was closed.
    pub fn close_game(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::CloseGame);
    }
}

/// Interaction phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Permission not granted (or permanently denied); everything inert.
    Paused,
    /// Waiting on the child to speak.
    Listening,
    /// A relay round trip is in flight.
    Relaying,
    /// The reply is being spoken.
    Speaking,
}

/// Microphone/speech permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    /// Not asked yet.
    Unset,
    /// Granted by the user.
    Granted,
    /// Denied. Terminal for this run.
    Denied,
}

/// Deferred-callback messages delivered back to the event loop.
#[derive(Debug)]
enum LoopMsg {
    /// The silence-commit window elapsed.
    SilenceElapsed {
        generation: u64,
    },
    /// A relay round trip resolved.
    RelayDone {
        generation: u64,
        reply: std::result::Result<String, RelayFailure>,
    },
    /// The dead-man timer for a pending game launch fired.
    EmergencyLaunch {
        utterance: u64,
    },
    /// The post-playback resume delay elapsed.
    ResumeElapsed {
        generation: u64,
    },
}

/// Whether capture should currently be running.
///
/// This single predicate governs every auto-restart and health-check
/// decision in the capture session.
fn gate_is_open(permission: Permission, phase: Phase, resume_pending: bool) -> bool {
    permission == Permission::Granted && phase == Phase::Listening && !resume_pending
}

/// Best-effort microphone status for the UI.
fn derive_status(phase: Phase, capture_state: CaptureState) -> MicStatus {
    match phase {
        Phase::Speaking => MicStatus::Speaking,
        Phase::Relaying => MicStatus::ListeningPaused,
        Phase::Listening if capture_state == CaptureState::Listening => MicStatus::Listening,
        _ => MicStatus::Idle,
    }
}

/// Orchestrates capture, relay, playback, and game launches.
pub struct InteractionCoordinator {
    config: AssistantConfig,
    cancel: CancellationToken,
    ui_tx: Option<broadcast::Sender<UiEvent>>,
    relay: Option<RelayClient>,
    cmd_tx: mpsc::UnboundedSender<CoordinatorCommand>,
    cmd_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
}

impl InteractionCoordinator {
    /// Create a coordinator with the given configuration.
    pub fn new(config: AssistantConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            config,
            cancel: CancellationToken::new(),
            ui_tx: None,
            relay: None,
            cmd_tx,
            cmd_rx,
        }
    }

    /// Attach a UI event broadcaster.
    pub fn with_ui_events(mut self, tx: broadcast::Sender<UiEvent>) -> Self {
        self.ui_tx = Some(tx);
        self
    }

    /// Override the relay client (the default is built from configuration).
    pub fn with_relay(mut self, relay: RelayClient) -> Self {
        self.relay = Some(relay);
        self
    }

    /// A handle for sending commands into the running loop.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// The coordinator's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown of the coordinator and its sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run the interaction loop with the given engines until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay client cannot be built.
    pub async fn run(
        self,
        recognition: Box<dyn RecognitionEngine>,
        synthesis: Box<dyn SynthesisEngine>,
    ) -> Result<()> {
        let relay = match self.relay {
            Some(relay) => relay,
            None => RelayClient::new(&self.config.relay)?,
        };

        let (gate_tx, gate_rx) = watch::channel(false);
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (speak_tx, speak_rx) = mpsc::channel(4);
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();

        let capture = CaptureSession::new(
            self.config.capture.clone(),
            recognition,
            gate_rx,
            capture_tx,
            self.cancel.child_token(),
        );
        let playback = PlaybackSession::new(
            self.config.playback.clone(),
            synthesis,
            speak_rx,
            playback_tx,
            self.cancel.child_token(),
        );
        tokio::spawn(capture.run());
        tokio::spawn(playback.run());

        info!("interaction coordinator starting");

        let event_loop = EventLoop {
            config: self.config,
            relay,
            ui_tx: self.ui_tx,
            gate_tx,
            speak_tx,
            loop_tx,
            cancel: self.cancel.clone(),
            phase: Phase::Paused,
            permission: Permission::Unset,
            capture_state: CaptureState::Idle,
            commit: CommitBuffer::default(),
            history: Vec::new(),
            inflight_message: None,
            pending_launch: None,
            games: GameHost::default(),
            relay_generation: 0,
            utterance_seq: 0,
            current_utterance: None,
            resume_generation: 0,
            resume_pending: false,
            last_status: None,
        };
        event_loop.run(self.cmd_rx, capture_rx, playback_rx, loop_rx).await;

        self.cancel.cancel();
        Ok(())
    }
}

/// The single task that owns all interaction state.
struct EventLoop {
    config: AssistantConfig,
    relay: RelayClient,
    ui_tx: Option<broadcast::Sender<UiEvent>>,
    gate_tx: watch::Sender<bool>,
    speak_tx: mpsc::Sender<SpeakRequest>,
    loop_tx: mpsc::UnboundedSender<LoopMsg>,
    cancel: CancellationToken,

    phase: Phase,
    permission: Permission,
    capture_state: CaptureState,
    commit: CommitBuffer,
    history: Vec<ConversationTurn>,
    /// The message of the relay round trip in flight. It joins the history
    /// only when the relay succeeds, so a failed exchange leaves no trace in
    /// later prompts.
    inflight_message: Option<String>,
    pending_launch: Option<PendingGameLaunch>,
    games: GameHost,
    /// Bumped per relay round trip; stale resolutions are dropped.
    relay_generation: u64,
    /// Bumped per spoken utterance.
    utterance_seq: u64,
    /// The utterance whose completion we are waiting on.
    current_utterance: Option<u64>,
    /// Bumped per resume delay; stale elapses are dropped.
    resume_generation: u64,
    /// Capture stays gated off until the post-playback delay elapses.
    resume_pending: bool,
    last_status: Option<MicStatus>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
        mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
        mut playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
        mut loop_rx: mpsc::UnboundedReceiver<LoopMsg>,
    ) {
        if self.permission == Permission::Unset {
            self.emit(UiEvent::PermissionRequired);
        }
        self.update_status();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("coordinator cancelled");
                    break;
                }
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
                ev = capture_rx.recv() => {
                    let Some(ev) = ev else { break };
                    self.handle_capture(ev).await;
                }
                ev = playback_rx.recv() => {
                    let Some(ev) = ev else { break };
                    self.handle_playback(ev);
                }
                msg = loop_rx.recv() => {
                    let Some(msg) = msg else { break };
                    self.handle_loop_msg(msg).await;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::GrantPermission => {
                if self.permission == Permission::Denied {
                    warn!("permission grant after denial ignored");
                    return;
                }
                info!("permission granted, starting capture");
                self.permission = Permission::Granted;
                if self.phase == Phase::Paused {
                    self.phase = Phase::Listening;
                }
                self.publish_gate();
                self.update_status();
            }
            CoordinatorCommand::CloseGame => {
                if let Some(closed) = self.games.close() {
                    info!(game = %closed.game, "game closed");
                    self.emit(UiEvent::GameClosed);
                }
                // drop anything left over from the launching utterance
                self.commit.reset();
                self.pending_launch = None;
                self.emit(UiEvent::ClearDisplay);
                self.publish_gate();
                self.update_status();
            }
        }
    }

    async fn handle_capture(&mut self, ev: CaptureEvent) {
        match ev {
            CaptureEvent::ListeningStarted => {
                self.capture_state = CaptureState::Listening;
                self.update_status();
            }
            CaptureEvent::Partial(text) => {
                if self.suppressing_commits() {
                    return;
                }
                if let CommitAction::ArmTimer { generation } = self.commit.on_partial(&text) {
                    self.arm_silence_timer(generation);
                    self.emit(UiEvent::DisplayTranscript(
                        self.commit.display_text().to_owned(),
                    ));
                }
            }
            CaptureEvent::Final(text) => {
                if self.suppressing_commits() {
                    return;
                }
                if let CommitAction::Commit(committed) = self.commit.on_final(&text) {
                    self.emit(UiEvent::DisplayTranscript(committed.clone()));
                    self.begin_commit(committed).await;
                }
            }
            CaptureEvent::Ended => {
                self.capture_state = CaptureState::Idle;
                self.update_status();
            }
            CaptureEvent::PermissionDenied => {
                warn!("microphone permission denied, pausing for good");
                self.permission = Permission::Denied;
                self.phase = Phase::Paused;
                self.publish_gate();
                self.update_status();
            }
        }
    }

    async fn handle_loop_msg(&mut self, msg: LoopMsg) {
        match msg {
            LoopMsg::SilenceElapsed { generation } => {
                if self.suppressing_commits() {
                    return;
                }
                if let Some(text) = self.commit.timer_fired(generation) {
                    self.begin_commit(text).await;
                }
            }
            LoopMsg::RelayDone { generation, reply } => {
                if generation != self.relay_generation || self.phase != Phase::Relaying {
                    debug!("dropping stale relay resolution");
                    return;
                }
                match reply {
                    Ok(text) => {
                        if let Some(message) = self.inflight_message.take() {
                            self.history.push(ConversationTurn::user(message));
                        }
                        self.history.push(ConversationTurn::assistant(&text));
                        self.speak(text).await;
                    }
                    Err(err) => {
                        warn!(%err, "relay failed, speaking fallback");
                        self.inflight_message = None;
                        self.speak(FALLBACK_REPLY.to_owned()).await;
                    }
                }
            }
            LoopMsg::EmergencyLaunch { utterance } => {
                if self.current_utterance != Some(utterance) || self.pending_launch.is_none() {
                    return;
                }
                warn!("emergency timer fired, launching game without playback completion");
                self.current_utterance = None;
                self.finish_speaking();
            }
            LoopMsg::ResumeElapsed { generation } => {
                if generation != self.resume_generation {
                    return;
                }
                self.resume_pending = false;
                self.publish_gate();
            }
        }
    }

    fn handle_playback(&mut self, ev: PlaybackEvent) {
        match ev {
            PlaybackEvent::Started { id } => {
                if self.current_utterance == Some(id) {
                    self.update_status();
                }
            }
            PlaybackEvent::PermissionDenied => {
                // the session latched the denial; replies show as text from here on
                debug!("speech output unavailable, reply shown as text");
            }
            PlaybackEvent::Finished { id } => {
                if self.current_utterance != Some(id) {
                    debug!("dropping completion for a superseded utterance");
                    return;
                }
                self.current_utterance = None;
                self.finish_speaking();
            }
        }
    }

    /// A transcript became final or the silence window closed around it.
    async fn begin_commit(&mut self, text: String) {
        info!(%text, "committing utterance");
        if let Some(game) = detect_game_intent(&text) {
            info!(%game, "game intent detected");
            self.pending_launch = Some(PendingGameLaunch {
                game,
                auto_opponent: true,
            });
        }

        self.phase = Phase::Relaying;
        self.publish_gate();
        self.update_status();

        // the snapshot sent upstream excludes the new message
        self.relay_generation += 1;
        let generation = self.relay_generation;
        let relay = self.relay.clone();
        let history = self.history.clone();
        let tx = self.loop_tx.clone();
        let message = text.clone();
        tokio::spawn(async move {
            let reply = relay.send(&message, &history).await;
            let _ = tx.send(LoopMsg::RelayDone { generation, reply });
        });

        self.inflight_message = Some(text);
    }

    async fn speak(&mut self, text: String) {
        self.phase = Phase::Speaking;
        self.publish_gate();
        self.update_status();

        self.utterance_seq += 1;
        let id = self.utterance_seq;
        self.current_utterance = Some(id);
        self.emit(UiEvent::DisplayReply(text.clone()));

        if self.speak_tx.send(SpeakRequest { id, text }).await.is_err() {
            warn!("playback session is gone, completing utterance immediately");
            self.current_utterance = None;
            self.finish_speaking();
            return;
        }

        if self.pending_launch.is_some() {
            self.arm_emergency_timer(id);
        }
    }

    /// The spoken reply is over, one way or another.
    fn finish_speaking(&mut self) {
        // single consumer: whichever completion path got here first takes it
        if let Some(launch) = self.pending_launch.take() {
            let replaced = self.games.open(launch.game, launch.auto_opponent);
            if let Some(old) = replaced {
                warn!(game = %old.game, "replacing an already open game");
            }
            info!(game = %launch.game, "game opened");
            self.emit(UiEvent::GameOpened {
                game: launch.game,
                auto_opponent: launch.auto_opponent,
            });
        }

        self.emit(UiEvent::ClearDisplay);
        self.commit.reset();
        self.phase = Phase::Listening;
        self.resume_pending = true;
        self.resume_generation += 1;
        self.arm_resume_timer(self.resume_generation);
        self.publish_gate();
        self.update_status();
    }

    /// Commits are ignored while a relay is in flight or a reply is playing.
    fn suppressing_commits(&self) -> bool {
        matches!(self.phase, Phase::Relaying | Phase::Speaking)
    }

    fn arm_silence_timer(&self, generation: u64) {
        let delay = self.config.capture.silence_commit();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopMsg::SilenceElapsed { generation });
        });
    }

    fn arm_emergency_timer(&self, utterance: u64) {
        let delay = self.config.relay.emergency_launch();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopMsg::EmergencyLaunch { utterance });
        });
    }

    fn arm_resume_timer(&self, generation: u64) {
        let delay = self.config.playback.resume_delay();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopMsg::ResumeElapsed { generation });
        });
    }

    fn publish_gate(&self) {
        let open = gate_is_open(self.permission, self.phase, self.resume_pending);
        let _ = self.gate_tx.send(open);
    }

    fn update_status(&mut self) {
        let status = derive_status(self.phase, self.capture_state);
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            self.emit(UiEvent::MicStatus(status));
        }
    }

    fn emit(&self, ev: UiEvent) {
        if let Some(tx) = &self.ui_tx {
            let _ = tx.send(ev);
        }
    }
}
