pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod health;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::OrchestratorError;
pub use types::*;
