//! # glint-highlight
//!
//! Highlighting engine behind the glint service.
//!
//! This crate provides:
//! - The [`Highlighter`] trait the service calls into
//! - Tree-sitter grammars and a registry keyed by name/alias
//! - Bundled `htt`, `lua` and `text` grammars, plus JSON grammar manifests
//! - Themes with color replacements
//! - An HTML renderer

pub mod error;
pub mod grammar;
pub mod registry;
pub mod render;
pub mod theme;

pub use error::HighlightError;
pub use grammar::{Grammar, GrammarManifest, ParserKind, Queries};
pub use registry::GrammarRegistry;
pub use render::HtmlRenderer;
pub use theme::{Theme, DEFAULT_THEME, HIGHLIGHT_NAMES};

/// Language used when a request does not name one.
pub const DEFAULT_LANGUAGE: &str = "htt";

/// Turns source code into highlighted HTML.
///
/// Implementations are shared across connections and must not mutate state
/// while rendering.
pub trait Highlighter: Send + Sync {
    fn render(&self, code: &str, language: &str) -> Result<String, HighlightError>;
}
