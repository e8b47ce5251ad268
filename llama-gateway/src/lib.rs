//! llama-gateway: HTTP front for a local llama.cpp model.
//!
//! One crate serves both surfaces: the OpenAI-style completion endpoint and
//! the minimal chat endpoint. The model is reached through a subprocess
//! (`llama-cli`) or an in-process runtime, selected once at startup.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
