// Public API for integration tests and embedding

pub mod answer;
pub mod api;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod progress;
pub mod redact;
pub mod room;
pub mod scoring;
pub mod session;
pub mod types;
pub mod ws;
