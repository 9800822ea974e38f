//! OneRobo: a continuous voice-interaction runtime for a kids' assistant.
//!
//! The runtime keeps one conversation loop alive:
//! Microphone → capture session → silence commit → dialogue relay → playback session → Speaker
//!
//! # Architecture
//!
//! Independent session tasks connected by async channels, coordinated by a
//! single event loop:
//! - **Capture**: continuous speech recognition behind [`capture::RecognitionEngine`],
//!   with auto-restart, cooldown, and a supervisory health tick
//! - **Commit**: silence-triggered transcript commit with generation-stamped timers
//! - **Intent**: phrase matching that turns committed speech into game launches
//! - **Relay**: HTTP hop to the reply engine, with a fixed spoken fallback on failure
//! - **Playback**: speech synthesis behind [`playback::SynthesisEngine`], guaranteed
//!   to complete exactly once per utterance
//! - **Coordinator**: the state machine gating capture while relaying/speaking and
//!   consuming pending game launches exactly once
//!
//! Games and the reminder store sit beside the loop as collaborators.

pub mod capture;
pub mod config;
pub mod error;
pub mod games;
pub mod intent;
pub mod pipeline;
pub mod playback;
pub mod relay;
pub mod reminders;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::coordinator::{CoordinatorCommand, CoordinatorHandle, InteractionCoordinator};
pub use pipeline::messages::{GameId, MicStatus, UiEvent};
pub use relay::{RelayClient, RelayServer};
