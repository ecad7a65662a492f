pub mod coordinator;
pub mod engines;
pub mod error;
pub mod flow;
pub mod hud;
pub mod logger;
pub mod manifest;
pub mod orchestrator;
pub mod platform;
pub mod pool;
pub mod prefs;
pub mod rules;
pub mod runtime;
pub mod services;
pub mod settings;
pub mod sleep;
pub mod snapshot;
pub mod transport;
pub mod types;
pub mod vision;

pub use error::{Error, Result};
