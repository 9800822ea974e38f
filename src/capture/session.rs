//! The capture session actor.
//!
//! Owns the recognition engine and keeps it running whenever the gate says
//! listening should be active. Restarts are rate-limited by a cooldown,
//! delayed after normal ends, backed off after errors, and double-checked
//! by a periodic health tick. Permission denial is terminal.

use crate::capture::{RecognitionEngine, RecognitionErrorKind, RecognitionEvent};
use crate::config::CaptureConfig;
use crate::error::Result;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Events forwarded from the capture session to the coordinator.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The engine confirmed it is listening.
    ListeningStarted,
    /// Interim transcript text.
    Partial(String),
    /// Final transcript text.
    Final(String),
    /// The current recognition run ended.
    Ended,
    /// Microphone permission was denied; capture will not restart.
    PermissionDenied,
}

/// Start-guard state machine, kept pure for unit testing.
///
/// A start attempt is admitted only when the session is idle, no attempt is
/// in flight, the gate is open, permission has not been denied, and the
/// cooldown since the previous attempt has elapsed.
#[derive(Debug)]
struct CaptureController {
    phase: Phase,
    gate_open: bool,
    denied: bool,
    last_attempt: Option<Instant>,
    cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Listening,
}

impl CaptureController {
    fn new(cooldown: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            gate_open: false,
            denied: false,
            last_attempt: None,
            cooldown,
        }
    }

    fn can_start(&self, now: Instant) -> bool {
        self.phase == Phase::Idle
            && self.gate_open
            && !self.denied
            && self
                .last_attempt
                .is_none_or(|at| now.duration_since(at) >= self.cooldown)
    }

    fn note_attempt(&mut self, now: Instant) {
        self.phase = Phase::Starting;
        self.last_attempt = Some(now);
    }

    fn note_started(&mut self) {
        self.phase = Phase::Listening;
    }

    fn note_stopped(&mut self) {
        self.phase = Phase::Idle;
    }

    fn note_denied(&mut self) {
        self.denied = true;
        self.phase = Phase::Idle;
    }

    fn set_gate(&mut self, open: bool) {
        self.gate_open = open;
    }

    fn gate_open(&self) -> bool {
        self.gate_open && !self.denied
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// Long-lived task owning the speech recognizer.
///
/// The coordinator publishes the listening gate through a watch channel and
/// receives [`CaptureEvent`]s back. The session never decides *whether* to
/// listen, only *how* to keep the engine alive while the gate is open.
pub struct CaptureSession {
    config: CaptureConfig,
    engine: Box<dyn RecognitionEngine>,
    gate_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<CaptureEvent>,
    cancel: CancellationToken,
}

impl CaptureSession {
    /// Build a session around the given engine and channels.
    pub fn new(
        config: CaptureConfig,
        engine: Box<dyn RecognitionEngine>,
        gate_rx: watch::Receiver<bool>,
        event_tx: mpsc::UnboundedSender<CaptureEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            engine,
            gate_rx,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the engine disappears.
    pub async fn run(mut self) -> Result<()> {
        let mut ctl = CaptureController::new(self.config.restart_cooldown());
        ctl.set_gate(*self.gate_rx.borrow());
        let mut restart_at: Option<Instant> = None;

        let mut health = tokio::time::interval(self.config.health_check_interval());
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // skip the immediate first tick
        health.tick().await;

        if ctl.gate_open() {
            self.try_start(&mut ctl, &mut restart_at).await;
        }

        loop {
            let pending_restart = restart_at;
            let restart_timer = async move {
                match pending_restart {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = self.engine.stop().await;
                    debug!("capture session cancelled");
                    break;
                }
                changed = self.gate_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let open = *self.gate_rx.borrow();
                    ctl.set_gate(open);
                    if open {
                        self.try_start(&mut ctl, &mut restart_at).await;
                    } else {
                        restart_at = None;
                        if ctl.phase() != Phase::Idle
                            && let Err(err) = self.engine.stop().await
                        {
                            debug!(%err, "recognizer stop failed");
                        }
                    }
                }
                _ = restart_timer => {
                    restart_at = None;
                    self.try_start(&mut ctl, &mut restart_at).await;
                }
                _ = health.tick() => {
                    if ctl.gate_open() && ctl.phase() == Phase::Idle && restart_at.is_none() {
                        debug!("health tick found capture idle, restarting");
                        self.try_start(&mut ctl, &mut restart_at).await;
                    }
                }
                ev = self.engine.next_event() => {
                    let Some(ev) = ev else {
                        warn!("recognition engine closed its event stream");
                        break;
                    };
                    self.handle_event(ev, &mut ctl, &mut restart_at);
                }
            }
        }
        Ok(())
    }

    fn handle_event(
        &mut self,
        ev: RecognitionEvent,
        ctl: &mut CaptureController,
        restart_at: &mut Option<Instant>,
    ) {
        match ev {
            RecognitionEvent::Started => {
                ctl.note_started();
                self.emit(CaptureEvent::ListeningStarted);
            }
            RecognitionEvent::Partial(text) => {
                self.emit(CaptureEvent::Partial(text));
            }
            RecognitionEvent::Final(text) => {
                self.emit(CaptureEvent::Final(text));
            }
            RecognitionEvent::Ended => {
                ctl.note_stopped();
                self.emit(CaptureEvent::Ended);
                if ctl.gate_open() {
                    *restart_at = Some(Instant::now() + self.config.restart_delay());
                }
            }
            RecognitionEvent::Error(RecognitionErrorKind::PermissionDenied) => {
                warn!("microphone permission denied");
                ctl.note_denied();
                *restart_at = None;
                self.emit(CaptureEvent::PermissionDenied);
            }
            RecognitionEvent::Error(RecognitionErrorKind::InvalidState) => {
                if ctl.phase() != Phase::Listening {
                    ctl.note_started();
                    self.emit(CaptureEvent::ListeningStarted);
                }
            }
            RecognitionEvent::Error(RecognitionErrorKind::Transient) => {
                debug!("transient recognition error, backing off");
                ctl.note_stopped();
                self.emit(CaptureEvent::Ended);
                if ctl.gate_open() {
                    *restart_at = Some(Instant::now() + self.config.error_backoff());
                }
            }
        }
    }

    async fn try_start(&mut self, ctl: &mut CaptureController, restart_at: &mut Option<Instant>) {
        let now = Instant::now();
        if !ctl.can_start(now) {
            return;
        }
        ctl.note_attempt(now);
        match self.engine.start().await {
            Ok(()) => {
                debug!("recognition start requested");
            }
            Err(err) if err.kind == RecognitionErrorKind::InvalidState => {
                debug!(%err, "recognizer already running, assuming listening");
                ctl.note_started();
                self.emit(CaptureEvent::ListeningStarted);
            }
            Err(err) if err.kind == RecognitionErrorKind::PermissionDenied => {
                warn!(%err, "microphone permission denied on start");
                ctl.note_denied();
                self.emit(CaptureEvent::PermissionDenied);
            }
            Err(err) => {
                warn!(%err, "recognition start failed, backing off");
                ctl.note_stopped();
                *restart_at = Some(Instant::now() + self.config.error_backoff());
            }
        }
    }

    fn emit(&self, ev: CaptureEvent) {
        if self.event_tx.send(ev).is_err() {
            debug!("capture event receiver dropped");
        }
    }
}
