//! The interaction pipeline: shared message types and the coordinator that
//! drives capture, relay, playback, and game launches.

pub mod coordinator;
pub mod messages;

pub use coordinator::{CoordinatorCommand, CoordinatorHandle, InteractionCoordinator};
pub use messages::{
    CaptureState, ConversationTurn, GameId, MicStatus, PendingGameLaunch, Role, Transcript,
    UiEvent,
};
