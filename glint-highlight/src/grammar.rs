//! Grammar definitions.
//!
//! A grammar pairs a bundled tree-sitter parser with highlight queries.
//! Extra grammars are described by a JSON manifest whose query paths are
//! relative to the manifest:
//!
//! ```json
//! {
//!   "name": "htt",
//!   "aliases": ["template"],
//!   "parser": "lua",
//!   "highlights": "queries/htt.scm"
//! }
//! ```

use crate::error::HighlightError;
use crate::theme::HIGHLIGHT_NAMES;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tree_sitter::Language;
use tree_sitter_highlight::HighlightConfiguration;

/// Highlight query bundled for Lua and the `htt` template language.
pub const LUA_HIGHLIGHTS: &str = include_str!("../queries/lua/highlights.scm");

/// Parsers compiled into the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Lua,
}

impl ParserKind {
    fn language(self) -> Language {
        match self {
            ParserKind::Lua => tree_sitter_lua::LANGUAGE.into(),
        }
    }
}

/// On-disk description of an extra grammar.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarManifest {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub parser: ParserKind,
    pub highlights: PathBuf,
    #[serde(default)]
    pub injections: Option<PathBuf>,
    #[serde(default)]
    pub locals: Option<PathBuf>,
}

/// Queries handed to [`Grammar::compile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Queries<'a> {
    pub highlights: &'a str,
    pub injections: &'a str,
    pub locals: &'a str,
}

/// A language grammar. Plain grammars render everything as unstyled text.
pub struct Grammar {
    /// Canonical language name.
    pub name: String,

    /// Additional names the grammar answers to.
    pub aliases: Vec<String>,

    config: Option<HighlightConfiguration>,
}

impl Grammar {
    /// Creates a grammar that renders everything as plain text.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            config: None,
        }
    }

    /// Builds a grammar on a bundled parser.
    ///
    /// Fails on an empty name or alias, on a query the parser rejects, and on
    /// a highlight query with no patterns.
    pub fn compile(
        name: impl Into<String>,
        aliases: Vec<String>,
        parser: ParserKind,
        queries: Queries<'_>,
    ) -> Result<Self, HighlightError> {
        let mut grammar = Self {
            name: name.into(),
            aliases,
            config: None,
        };
        grammar.validate()?;

        let mut config = HighlightConfiguration::new(
            parser.language(),
            grammar.name.clone(),
            queries.highlights,
            queries.injections,
            queries.locals,
        )
        .map_err(|e| HighlightError::InvalidGrammar {
            name: grammar.name.clone(),
            reason: e.to_string(),
        })?;

        if config.query.pattern_count() == 0 {
            return Err(HighlightError::InvalidGrammar {
                name: grammar.name,
                reason: "highlight query has no patterns".to_string(),
            });
        }

        config.configure(HIGHLIGHT_NAMES);
        grammar.config = Some(config);
        Ok(grammar)
    }

    /// Parses a JSON manifest and compiles the grammar it describes. Query
    /// paths are resolved against `base_dir`.
    pub fn from_json(json: &str, base_dir: &Path) -> Result<Self, HighlightError> {
        let manifest: GrammarManifest =
            serde_json::from_str(json).map_err(|source| HighlightError::GrammarParse {
                path: base_dir.to_path_buf(),
                source,
            })?;
        Self::from_manifest(manifest, base_dir)
    }

    /// Loads a grammar from a JSON manifest file.
    pub fn from_file(path: &Path) -> Result<Self, HighlightError> {
        let content = read(path)?;
        let manifest: GrammarManifest =
            serde_json::from_str(&content).map_err(|source| HighlightError::GrammarParse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(manifest, base_dir)
    }

    fn from_manifest(manifest: GrammarManifest, base_dir: &Path) -> Result<Self, HighlightError> {
        let highlights = read(&base_dir.join(&manifest.highlights))?;
        let injections = match &manifest.injections {
            Some(path) => read(&base_dir.join(path))?,
            None => String::new(),
        };
        let locals = match &manifest.locals {
            Some(path) => read(&base_dir.join(path))?,
            None => String::new(),
        };

        Self::compile(
            manifest.name,
            manifest.aliases,
            manifest.parser,
            Queries {
                highlights: &highlights,
                injections: &injections,
                locals: &locals,
            },
        )
    }

    /// Checks the grammar names.
    pub fn validate(&self) -> Result<(), HighlightError> {
        if self.name.trim().is_empty() {
            return Err(HighlightError::InvalidGrammar {
                name: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(HighlightError::InvalidGrammar {
                name: self.name.clone(),
                reason: "aliases must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The canonical name followed by the aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn is_plain(&self) -> bool {
        self.config.is_none()
    }

    pub(crate) fn config(&self) -> Option<&HighlightConfiguration> {
        self.config.as_ref()
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("plain", &self.is_plain())
            .finish()
    }
}

fn read(path: &Path) -> Result<String, HighlightError> {
    std::fs::read_to_string(path).map_err(|source| HighlightError::GrammarIo {
        path: path.to_path_buf(),
        source,
    })
}

/// The default template language. It parses with the Lua grammar, which
/// covers the code embedded in templates.
pub fn htt() -> Result<Grammar, HighlightError> {
    Grammar::compile(
        "htt",
        Vec::new(),
        ParserKind::Lua,
        Queries {
            highlights: LUA_HIGHLIGHTS,
            ..Default::default()
        },
    )
}

pub fn lua() -> Result<Grammar, HighlightError> {
    Grammar::compile(
        "lua",
        vec!["luajit".to_string()],
        ParserKind::Lua,
        Queries {
            highlights: LUA_HIGHLIGHTS,
            ..Default::default()
        },
    )
}

pub fn text() -> Grammar {
    let mut grammar = Grammar::plain("text");
    grammar.aliases = vec!["txt".to_string(), "plain".to_string()];
    grammar
}
