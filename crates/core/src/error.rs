use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core. All of them are recoverable at the caller:
/// behaviors turn them into a `false` step result plus a HUD line.
#[derive(Debug, Error)]
pub enum Error {
    /// Pool path was empty.
    #[error("invalid pool path: {0:?}")]
    InvalidPath(String),
    /// Template parts did not resolve to a whitelisted file.
    #[error("template missing: {engine}/{server} {parts:?}")]
    TemplateMissing {
        engine: String,
        server: String,
        parts: Vec<String>,
    },
    /// Capture returned no pixels for the requested zone.
    #[error("frame unavailable for zone ({l},{t},{r},{b})")]
    FrameUnavailable { l: i32, t: i32, r: i32, b: i32 },
    /// Game window geometry is not known.
    #[error("game window not found")]
    NoWindow,
    /// No rule set handles this server or step.
    #[error("no rule for {server}/{step}")]
    NoRule { server: String, step: String },
    /// Record name or file rejected.
    #[error("record: {0}")]
    Record(String),
    /// Serial line failed after the reconnect attempt.
    #[error("transport: {0}")]
    Transport(String),
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn template_missing(engine: &str, server: &str, parts: &[String]) -> Self {
        Self::TemplateMissing {
            engine: engine.to_string(),
            server: server.to_string(),
            parts: parts.to_vec(),
        }
    }

    /// True for errors that mean "asset not shipped" rather than "screen not ready".
    pub fn is_missing_asset(&self) -> bool {
        matches!(self, Self::TemplateMissing { .. } | Self::Image { .. })
    }
}
