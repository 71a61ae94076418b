//! ComfyUI client and job orchestration.
//!
//! Provides the REST wrapper ([`api`]), the WebSocket push channel
//! ([`client`], [`messages`], [`events`]), and the three stages that take a
//! parameterized graph to an artifact: [`submitter`], [`watcher`] and the
//! composing [`orchestrator`].

pub mod api;
pub mod client;
pub mod events;
pub mod messages;
pub mod orchestrator;
pub mod submitter;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
