//! Grammar registry keyed by language name and alias.

use crate::error::HighlightError;
use crate::grammar::{self, Grammar};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter_highlight::HighlightConfiguration;

/// Maps language names (case-insensitive) to grammars.
///
/// Registering a grammar whose name or alias is already taken rebinds that
/// name to the new grammar.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    grammars: Vec<Grammar>,
    index: HashMap<String, usize>,
}

impl GrammarRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the bundled `htt`, `lua` and `text` grammars.
    pub fn with_builtins() -> Result<Self, HighlightError> {
        let mut registry = Self::new();
        for g in [grammar::htt()?, grammar::lua()?, grammar::text()] {
            registry.insert(g);
        }
        Ok(registry)
    }

    /// Validates and registers a grammar.
    pub fn register(&mut self, grammar: Grammar) -> Result<(), HighlightError> {
        grammar.validate()?;
        self.insert(grammar);
        Ok(())
    }

    /// Loads a grammar manifest and registers it. Returns the grammar name.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<String, HighlightError> {
        let grammar = Grammar::from_file(path.as_ref())?;
        let name = grammar.name.clone();
        tracing::info!(
            "Loaded grammar '{}' from {}",
            name,
            path.as_ref().display()
        );
        self.insert(grammar);
        Ok(name)
    }

    fn insert(&mut self, grammar: Grammar) {
        let slot = self.grammars.len();
        for name in grammar.names() {
            self.index.insert(normalize(name), slot);
        }
        self.grammars.push(grammar);
    }

    /// Finds the grammar for a language name or alias.
    pub fn resolve(&self, language: &str) -> Option<&Grammar> {
        self.index
            .get(&normalize(language))
            .map(|&slot| &self.grammars[slot])
    }

    /// Finds the highlight configuration for an injected language.
    pub(crate) fn injection(&self, language: &str) -> Option<&HighlightConfiguration> {
        self.resolve(language).and_then(Grammar::config)
    }

    /// Returns the registered language names, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
