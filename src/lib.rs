pub mod api;
pub mod command;
pub mod config;
pub mod services;

// Re-exports for the binary and integration tests
pub use services::network::{ModeState, NetworkModeOrchestrator};
