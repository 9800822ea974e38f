//! Dialogue relay: the hop between captured speech and the reply engine.
//!
//! The client side posts the committed transcript plus the full conversation
//! history to the relay endpoint; the server side wraps the upstream
//! generative-text service and owns every child-facing apology string so the
//! client never has to interpret upstream failures.

pub mod client;
pub mod server;

pub use client::{RelayClient, RelayFailure, FALLBACK_REPLY};
pub use server::{RelayServer, RelayServerHandle};
