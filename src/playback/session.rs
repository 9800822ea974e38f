//! The playback session actor.
//!
//! Owns the synthesis engine and guarantees exactly one [`PlaybackEvent::Finished`]
//! per requested utterance, whether it ends normally, errors, stalls silently,
//! or the engine simply never reports back. Error paths hold the completion
//! open long enough for the on-screen text fallback to be read.

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::playback::{select_voice, SynthesisEngine, SynthesisErrorKind, SynthesisEvent, Utterance};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A request to speak one reply.
#[derive(Debug, Clone)]
pub struct SpeakRequest {
    /// Coordinator-assigned utterance id, echoed back in events.
    pub id: u64,
    /// Text to speak.
    pub text: String,
}

/// Events forwarded from the playback session to the coordinator.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Audio output began for this utterance.
    Started {
        /// Utterance id from the originating [`SpeakRequest`].
        id: u64,
    },
    /// Audio output permission was denied. A `Finished` still follows after
    /// the text fallback window.
    PermissionDenied,
    /// This utterance is over. Emitted exactly once per request.
    Finished {
        /// Utterance id from the originating [`SpeakRequest`].
        id: u64,
    },
}

/// The one utterance currently in flight.
struct ActiveUtterance {
    id: u64,
    /// Engine event token, absent when `speak` itself failed.
    token: Option<u64>,
    /// Deadline after which silent failure is assumed.
    watchdog_at: Instant,
    watchdog_spent: bool,
    /// When set, the engine is done and we are only holding the completion
    /// open for the text fallback display window.
    finish_at: Option<Instant>,
}

/// Long-lived task owning the speech synthesizer.
pub struct PlaybackSession {
    config: PlaybackConfig,
    engine: Box<dyn SynthesisEngine>,
    request_rx: mpsc::Receiver<SpeakRequest>,
    event_tx: mpsc::UnboundedSender<PlaybackEvent>,
    cancel: CancellationToken,
    /// Latched on the first permission denial; later requests skip the
    /// engine and go straight to the text fallback.
    denied: bool,
}

impl PlaybackSession {
    /// Build a session around the given engine and channels.
    pub fn new(
        config: PlaybackConfig,
        engine: Box<dyn SynthesisEngine>,
        request_rx: mpsc::Receiver<SpeakRequest>,
        event_tx: mpsc::UnboundedSender<PlaybackEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            engine,
            request_rx,
            event_tx,
            cancel,
            denied: false,
        }
    }

    /// Run until cancelled or the request channel closes.
    pub async fn run(mut self) -> Result<()> {
        let mut active: Option<ActiveUtterance> = None;

        let mut supervisor = tokio::time::interval(self.config.supervisor_interval());
        supervisor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        supervisor.tick().await;

        loop {
            let watchdog_at = active
                .as_ref()
                .filter(|a| !a.watchdog_spent && a.finish_at.is_none())
                .map(|a| a.watchdog_at);
            let finish_at = active.as_ref().and_then(|a| a.finish_at);

            let watchdog_timer = async move {
                match watchdog_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let finish_timer = async move {
                match finish_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.engine.cancel().await;
                    debug!("playback session cancelled");
                    break;
                }
                req = self.request_rx.recv() => {
                    let Some(req) = req else { break };
                    self.begin(req, &mut active).await;
                }
                _ = watchdog_timer => {
                    if self.engine.is_speaking() {
                        if let Some(a) = active.as_mut() {
                            a.watchdog_spent = true;
                        }
                    } else {
                        warn!("no audio observed within the watchdog window");
                        self.finish(&mut active);
                    }
                }
                _ = finish_timer => {
                    self.finish(&mut active);
                }
                _ = supervisor.tick() => {
                    let stuck = active
                        .as_ref()
                        .is_some_and(|a| a.finish_at.is_none())
                        && !self.engine.is_speaking()
                        && !self.engine.is_pending();
                    if stuck {
                        warn!("synthesizer went quiet without reporting an end");
                        self.finish(&mut active);
                    }
                }
                ev = self.engine.next_event() => {
                    let Some(ev) = ev else {
                        warn!("synthesis engine closed its event stream");
                        break;
                    };
                    self.handle_event(ev, &mut active);
                }
            }
        }
        Ok(())
    }

    async fn begin(&mut self, req: SpeakRequest, active: &mut Option<ActiveUtterance>) {
        if active.is_some() {
            debug!("replacing in-flight utterance");
            self.finish(active);
        }

        if self.denied {
            debug!("speech permission denied earlier, showing text only");
            *active = Some(self.text_fallback(req.id, self.config.permission_fallback_display_ms));
            return;
        }

        // Clear anything the engine still holds, give it a moment to settle,
        // then make sure it is not stuck paused.
        self.engine.cancel().await;
        tokio::time::sleep(self.config.cancel_settle()).await;
        self.engine.resume().await;

        let voice = select_voice(&self.engine.voices(), &self.config).cloned();
        let utterance = Utterance::new(&req.text, voice, &self.config);
        let watchdog_at = Instant::now() + self.config.watchdog_timeout(&req.text);

        match self.engine.speak(&utterance).await {
            Ok(token) => {
                *active = Some(ActiveUtterance {
                    id: req.id,
                    token: Some(token),
                    watchdog_at,
                    watchdog_spent: false,
                    finish_at: None,
                });
            }
            Err(err) if err.kind == SynthesisErrorKind::PermissionDenied => {
                warn!(%err, "speech permission denied, showing text only");
                self.denied = true;
                self.emit(PlaybackEvent::PermissionDenied);
                *active = Some(self.text_fallback(req.id, self.config.permission_fallback_display_ms));
            }
            Err(err) => {
                warn!(%err, "synthesis request failed, showing text only");
                *active = Some(self.text_fallback(req.id, self.config.error_fallback_display_ms));
            }
        }
    }

    /// An utterance whose audio is gone; only the display window remains.
    fn text_fallback(&self, id: u64, display_ms: u64) -> ActiveUtterance {
        ActiveUtterance {
            id,
            token: None,
            watchdog_at: Instant::now(),
            watchdog_spent: true,
            finish_at: Some(Instant::now() + std::time::Duration::from_millis(display_ms)),
        }
    }

    fn handle_event(&mut self, ev: SynthesisEvent, active: &mut Option<ActiveUtterance>) {
        let Some(current) = active.as_mut() else {
            return;
        };
        if current.token != Some(ev.token()) {
            debug!("dropping synthesis event for a superseded utterance");
            return;
        }

        match ev {
            SynthesisEvent::Started { .. } => {
                self.emit(PlaybackEvent::Started { id: current.id });
            }
            SynthesisEvent::Ended { .. } => {
                self.finish(active);
            }
            SynthesisEvent::Error { kind, .. } => match kind {
                SynthesisErrorKind::PermissionDenied => {
                    warn!("speech permission revoked mid-utterance");
                    self.denied = true;
                    self.emit(PlaybackEvent::PermissionDenied);
                    current.finish_at = Some(
                        Instant::now()
                            + std::time::Duration::from_millis(
                                self.config.permission_fallback_display_ms,
                            ),
                    );
                }
                SynthesisErrorKind::Interrupted => {
                    self.finish(active);
                }
                SynthesisErrorKind::Other => {
                    warn!("utterance failed mid-flight, holding text on screen");
                    current.finish_at = Some(
                        Instant::now()
                            + std::time::Duration::from_millis(self.config.error_fallback_display_ms),
                    );
                }
            },
        }
    }

    /// Complete the active utterance. Taking it out of the slot is what makes
    /// the completion signal single-shot.
    fn finish(&mut self, active: &mut Option<ActiveUtterance>) {
        if let Some(done) = active.take() {
            self.emit(PlaybackEvent::Finished { id: done.id });
        }
    }

    fn emit(&self, ev: PlaybackEvent) {
        if self.event_tx.send(ev).is_err() {
            debug!("playback event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::playback::{SynthesisError, Voice};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scripted synthesizer for exercising the session loop.
    struct ScriptedEngine {
        voices: Vec<Voice>,
        speak_results: VecDeque<std::result::Result<u64, SynthesisError>>,
        speak_calls: Arc<Mutex<usize>>,
        events: Arc<Mutex<VecDeque<SynthesisEvent>>>,
        speaking: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl SynthesisEngine for ScriptedEngine {
        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        async fn speak(&mut self, _utterance: &Utterance) -> std::result::Result<u64, SynthesisError> {
            *self.speak_calls.lock().unwrap() += 1;
            self.speak_results
                .pop_front()
                .unwrap_or(Err(SynthesisError::new(SynthesisErrorKind::Other, "no script")))
        }

        async fn cancel(&mut self) {
            *self.speaking.lock().unwrap() = false;
        }

        async fn resume(&mut self) {}

        fn is_speaking(&self) -> bool {
            *self.speaking.lock().unwrap()
        }

        fn is_pending(&self) -> bool {
            false
        }

        async fn next_event(&mut self) -> Option<SynthesisEvent> {
            loop {
                if let Some(ev) = self.events.lock().unwrap().pop_front() {
                    return Some(ev);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    fn fast_config() -> PlaybackConfig {
        PlaybackConfig {
            cancel_settle_ms: 1,
            permission_fallback_display_ms: 30,
            error_fallback_display_ms: 20,
            watchdog_ms_per_char: 1,
            watchdog_min_ms: 50,
            supervisor_interval_ms: 500,
            resume_delay_ms: 1,
            ..PlaybackConfig::default()
        }
    }

    struct Harness {
        req_tx: mpsc::Sender<SpeakRequest>,
        event_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
        events: Arc<Mutex<VecDeque<SynthesisEvent>>>,
        speaking: Arc<Mutex<bool>>,
        speak_calls: Arc<Mutex<usize>>,
        cancel: CancellationToken,
    }

    fn spawn_session(
        config: PlaybackConfig,
        speak_results: VecDeque<std::result::Result<u64, SynthesisError>>,
    ) -> Harness {
        let events = Arc::new(Mutex::new(VecDeque::new()));
        let speaking = Arc::new(Mutex::new(false));
        let speak_calls = Arc::new(Mutex::new(0));
        let engine = ScriptedEngine {
            voices: vec![Voice::new("Google US English Female", "en-US")],
            speak_results,
            speak_calls: speak_calls.clone(),
            events: events.clone(),
            speaking: speaking.clone(),
        };
        let (req_tx, req_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = PlaybackSession::new(
            config,
            Box::new(engine),
            req_rx,
            event_tx,
            cancel.clone(),
        );
        tokio::spawn(session.run());
        Harness {
            req_tx,
            event_rx,
            events,
            speaking,
            speak_calls,
            cancel,
        }
    }

    async fn next_event(h: &mut Harness) -> PlaybackEvent {
        tokio::time::timeout(Duration::from_secs(2), h.event_rx.recv())
            .await
            .expect("event within deadline")
            .expect("channel open")
    }

    #[tokio::test]
    async fn normal_utterance_finishes_exactly_once() {
        let mut h = spawn_session(fast_config(), VecDeque::from([Ok(7)]));
        h.req_tx
            .send(SpeakRequest {
                id: 1,
                text: "hello".to_owned(),
            })
            .await
            .unwrap();

        // let the speak call land before scripting engine events
        tokio::time::sleep(Duration::from_millis(20)).await;
        *h.speaking.lock().unwrap() = true;
        h.events
            .lock()
            .unwrap()
            .push_back(SynthesisEvent::Started { token: 7 });

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Started { id: 1 }));

        *h.speaking.lock().unwrap() = false;
        h.events
            .lock()
            .unwrap()
            .push_back(SynthesisEvent::Ended { token: 7 });

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 1 }));

        // no duplicate completion from the supervisor afterwards
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.event_rx.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn speak_failure_still_finishes_after_display_window() {
        let mut h = spawn_session(
            fast_config(),
            VecDeque::from([Err(SynthesisError::new(SynthesisErrorKind::Other, "boom"))]),
        );
        h.req_tx
            .send(SpeakRequest {
                id: 3,
                text: "hi".to_owned(),
            })
            .await
            .unwrap();

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 3 }));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn permission_denial_is_reported_then_finished() {
        let mut h = spawn_session(
            fast_config(),
            VecDeque::from([Err(SynthesisError::new(SynthesisErrorKind::PermissionDenied, "blocked"))]),
        );
        h.req_tx
            .send(SpeakRequest {
                id: 4,
                text: "hi".to_owned(),
            })
            .await
            .unwrap();

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::PermissionDenied));
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 4 }));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn permission_denial_latches_and_stops_retrying_the_engine() {
        let mut h = spawn_session(
            fast_config(),
            VecDeque::from([
                Err(SynthesisError::new(SynthesisErrorKind::PermissionDenied, "blocked")),
                Err(SynthesisError::new(SynthesisErrorKind::PermissionDenied, "blocked")),
            ]),
        );
        h.req_tx
            .send(SpeakRequest {
                id: 1,
                text: "hi".to_owned(),
            })
            .await
            .unwrap();
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::PermissionDenied));
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 1 }));

        // the second request never reaches the engine and is not re-reported
        h.req_tx
            .send(SpeakRequest {
                id: 2,
                text: "hello again".to_owned(),
            })
            .await
            .unwrap();
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 2 }));
        assert_eq!(*h.speak_calls.lock().unwrap(), 1);
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn silent_failure_is_caught_by_watchdog() {
        // speak succeeds but the engine never starts audio or sends events
        let mut h = spawn_session(fast_config(), VecDeque::from([Ok(9)]));
        h.req_tx
            .send(SpeakRequest {
                id: 5,
                text: "x".to_owned(),
            })
            .await
            .unwrap();

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 5 }));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn supervisor_completes_a_stuck_utterance() {
        // watchdog far out, so only the supervisor can notice the stall
        let config = PlaybackConfig {
            watchdog_min_ms: 10_000,
            supervisor_interval_ms: 30,
            ..fast_config()
        };
        let mut h = spawn_session(config, VecDeque::from([Ok(6)]));
        h.req_tx
            .send(SpeakRequest {
                id: 8,
                text: "hello there".to_owned(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        *h.speaking.lock().unwrap() = true;
        h.events
            .lock()
            .unwrap()
            .push_back(SynthesisEvent::Started { token: 6 });
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Started { id: 8 }));

        // audio stops but the engine never reports Ended
        *h.speaking.lock().unwrap() = false;

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 8 }));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn stale_event_from_replaced_utterance_is_ignored() {
        let mut h = spawn_session(fast_config(), VecDeque::from([Ok(1), Ok(2)]));
        h.req_tx
            .send(SpeakRequest {
                id: 10,
                text: "first reply".to_owned(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        *h.speaking.lock().unwrap() = true;

        h.req_tx
            .send(SpeakRequest {
                id: 11,
                text: "second reply".to_owned(),
            })
            .await
            .unwrap();

        // replacement finishes the first utterance immediately
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 10 }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        *h.speaking.lock().unwrap() = true;
        // the cancelled utterance's interrupt arrives late, then the new one runs
        h.events.lock().unwrap().push_back(SynthesisEvent::Error {
            token: 1,
            kind: SynthesisErrorKind::Interrupted,
        });
        h.events
            .lock()
            .unwrap()
            .push_back(SynthesisEvent::Started { token: 2 });

        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Started { id: 11 }));

        *h.speaking.lock().unwrap() = false;
        h.events
            .lock()
            .unwrap()
            .push_back(SynthesisEvent::Ended { token: 2 });
        assert!(matches!(next_event(&mut h).await, PlaybackEvent::Finished { id: 11 }));
        h.cancel.cancel();
    }
}
