//! Shared utilities for the wDOI workspace.

pub mod events;
pub mod logging;

pub use events::EventBus;
pub use logging::{init_tracing, LogFormat};
