//! Highlighting error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from grammar loading and rendering.
#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    #[error("unknown theme: {0}")]
    UnknownTheme(String),

    #[error("failed to read grammar file '{}': {source}", path.display())]
    GrammarIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse grammar file '{}': {source}", path.display())]
    GrammarParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid grammar '{name}': {reason}")]
    InvalidGrammar { name: String, reason: String },

    #[error("failed to highlight {language}: {reason}")]
    Render { language: String, reason: String },
}
