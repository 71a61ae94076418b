//! Pure building blocks of the generation orchestrator.
//!
//! Everything in this crate is free of I/O: loading and copying workflow
//! templates, resolving semantically named slots, injecting per-request
//! parameters, and extracting the artifact path from an engine payload.
//! The network-facing half lives in `clipgen-comfyui`.

pub mod artifact;
pub mod error;
pub mod injection;
pub mod request;
pub mod resolver;
pub mod workflow;
