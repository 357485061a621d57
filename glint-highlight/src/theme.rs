//! Color themes.

use std::collections::BTreeMap;
use tree_sitter_highlight::Highlight;

/// Name of the theme used when none is configured.
pub const DEFAULT_THEME: &str = "one-light";

/// Capture names the renderer recognizes. A query capture resolves to the
/// longest entry it starts with, so `punctuation.bracket` paints as
/// `punctuation`.
pub const HIGHLIGHT_NAMES: &[&str] = &[
    "comment",
    "constant",
    "constant.builtin",
    "function",
    "keyword",
    "number",
    "operator",
    "property",
    "punctuation",
    "string",
    "type",
    "variable.parameter",
];

/// Colors used by the HTML renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub background: String,
    pub foreground: String,

    /// Colors keyed by entries of [`HIGHLIGHT_NAMES`]. Captures without an
    /// entry use the foreground.
    pub styles: BTreeMap<String, String>,

    /// Colors substituted at render time, keyed by the lowercase original.
    pub color_replacements: BTreeMap<String, String>,
}

impl Theme {
    fn from_table(name: &str, background: &str, foreground: &str, styles: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            background: background.to_string(),
            foreground: foreground.to_string(),
            styles: styles
                .iter()
                .map(|(capture, color)| (capture.to_string(), color.to_string()))
                .collect(),
            color_replacements: BTreeMap::new(),
        }
    }

    pub fn one_light() -> Self {
        Self::from_table(
            "one-light",
            "#fafafa",
            "#383a42",
            &[
                ("comment", "#a0a1a7"),
                ("constant", "#986801"),
                ("constant.builtin", "#986801"),
                ("function", "#4078f2"),
                ("keyword", "#a626a4"),
                ("number", "#986801"),
                ("operator", "#0184bc"),
                ("property", "#e45649"),
                ("punctuation", "#383a42"),
                ("string", "#50a14f"),
                ("type", "#c18401"),
                ("variable.parameter", "#383a42"),
            ],
        )
    }

    pub fn one_dark() -> Self {
        Self::from_table(
            "one-dark",
            "#282c34",
            "#abb2bf",
            &[
                ("comment", "#5c6370"),
                ("constant", "#d19a66"),
                ("constant.builtin", "#d19a66"),
                ("function", "#61afef"),
                ("keyword", "#c678dd"),
                ("number", "#d19a66"),
                ("operator", "#56b6c2"),
                ("property", "#e06c75"),
                ("punctuation", "#abb2bf"),
                ("string", "#98c379"),
                ("type", "#e5c07b"),
                ("variable.parameter", "#abb2bf"),
            ],
        )
    }

    /// Looks up a bundled theme by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "one-light" => Some(Self::one_light()),
            "one-dark" => Some(Self::one_dark()),
            _ => None,
        }
    }

    pub fn with_color_replacements(mut self, replacements: &BTreeMap<String, String>) -> Self {
        for (from, to) in replacements {
            self.color_replacements
                .insert(from.to_ascii_lowercase(), to.clone());
        }
        self
    }

    /// Returns the color a capture is painted with, after replacements.
    pub fn color(&self, capture: &str) -> &str {
        let color = self.styles.get(capture).unwrap_or(&self.foreground);
        self.resolve(color)
    }

    /// Returns the color for a highlight produced with [`HIGHLIGHT_NAMES`].
    pub fn highlight_color(&self, highlight: Highlight) -> &str {
        match HIGHLIGHT_NAMES.get(highlight.0) {
            Some(capture) => self.color(capture),
            None => self.foreground(),
        }
    }

    pub fn background(&self) -> &str {
        self.resolve(&self.background)
    }

    pub fn foreground(&self) -> &str {
        self.resolve(&self.foreground)
    }

    fn resolve<'a>(&'a self, color: &'a str) -> &'a str {
        self.color_replacements
            .get(&color.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(color)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::one_light()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Theme::builtin("one-light").unwrap().name, "one-light");
        assert_eq!(Theme::builtin("One-Dark").unwrap().name, "one-dark");
        assert!(Theme::builtin("solarized").is_none());
    }

    #[test]
    fn test_every_highlight_name_is_styled() {
        for theme in [Theme::one_light(), Theme::one_dark()] {
            for name in HIGHLIGHT_NAMES {
                assert!(theme.styles.contains_key(*name), "{} lacks {}", theme.name, name);
            }
        }
    }

    #[test]
    fn test_highlight_color() {
        let theme = Theme::one_light();
        let keyword = HIGHLIGHT_NAMES.iter().position(|n| *n == "keyword").unwrap();
        assert_eq!(theme.highlight_color(Highlight(keyword)), "#a626a4");
        assert_eq!(theme.highlight_color(Highlight(usize::MAX)), "#383a42");
        assert_eq!(theme.color("label"), "#383a42");
    }

    #[test]
    fn test_color_replacements() {
        let mut replacements = BTreeMap::new();
        replacements.insert(
            "#FAFAFA".to_string(),
            "rgb(245 245 244 / var(--tw-bg-opacity))".to_string(),
        );
        let theme = Theme::one_light().with_color_replacements(&replacements);

        assert_eq!(theme.background(), "rgb(245 245 244 / var(--tw-bg-opacity))");
        assert_eq!(theme.foreground(), "#383a42");
        assert_eq!(theme.color("keyword"), "#a626a4");
    }
}
