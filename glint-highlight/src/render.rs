//! HTML rendering.
//!
//! Output shape:
//!
//! ```html
//! <pre class="glint one-light" style="background-color:#fafafa;color:#383a42" tabindex="0"><code>
//! <span class="line"><span style="color:#a626a4">local</span> x</span>
//! </code></pre>
//! ```
//!
//! (without the line breaks around `<code>`). Lines are joined with `\n`.

use crate::error::HighlightError;
use crate::registry::GrammarRegistry;
use crate::theme::Theme;
use crate::Highlighter;
use tree_sitter_highlight::{Highlight, HighlightEvent};

/// Renders code to HTML using a grammar registry and a theme.
#[derive(Debug)]
pub struct HtmlRenderer {
    grammars: GrammarRegistry,
    theme: Theme,
}

impl HtmlRenderer {
    pub fn new(grammars: GrammarRegistry, theme: Theme) -> Self {
        Self { grammars, theme }
    }

    /// Bundled grammars with the default theme.
    pub fn bundled() -> Result<Self, HighlightError> {
        Ok(Self::new(GrammarRegistry::with_builtins()?, Theme::default()))
    }

    fn push_text(&self, html: &mut String, color: Option<&str>, text: &str) {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.push_segment(html, color, first);
        }
        for line in lines {
            html.push_str("</span>\n<span class=\"line\">");
            self.push_segment(html, color, line);
        }
    }

    fn push_segment(&self, html: &mut String, color: Option<&str>, segment: &str) {
        if segment.is_empty() {
            return;
        }
        let color = match color {
            Some(color) => color,
            None if segment.trim().is_empty() => {
                escape_into(html, segment);
                return;
            }
            None => self.theme.foreground(),
        };
        html.push_str("<span style=\"color:");
        html.push_str(color);
        html.push_str("\">");
        escape_into(html, segment);
        html.push_str("</span>");
    }
}

impl Highlighter for HtmlRenderer {
    fn render(&self, code: &str, language: &str) -> Result<String, HighlightError> {
        let grammar = self
            .grammars
            .resolve(language)
            .ok_or_else(|| HighlightError::UnknownLanguage(language.to_string()))?;

        let mut html = String::with_capacity(128 + code.len() * 4);
        html.push_str("<pre class=\"glint ");
        escape_into(&mut html, &self.theme.name);
        html.push_str("\" style=\"background-color:");
        html.push_str(self.theme.background());
        html.push_str(";color:");
        html.push_str(self.theme.foreground());
        html.push_str("\" tabindex=\"0\"><code><span class=\"line\">");

        match grammar.config() {
            None => self.push_text(&mut html, None, code),
            Some(config) => {
                let failed = |e: tree_sitter_highlight::Error| HighlightError::Render {
                    language: grammar.name.clone(),
                    reason: format!("{:?}", e),
                };

                let mut highlighter = tree_sitter_highlight::Highlighter::new();
                let events = highlighter
                    .highlight(config, code.as_bytes(), None, |injected| {
                        self.grammars.injection(injected)
                    })
                    .map_err(failed)?;

                // innermost capture wins
                let mut active: Vec<Highlight> = Vec::new();
                for event in events {
                    match event.map_err(failed)? {
                        HighlightEvent::HighlightStart(highlight) => active.push(highlight),
                        HighlightEvent::HighlightEnd => {
                            active.pop();
                        }
                        HighlightEvent::Source { start, end } => {
                            let Some(text) = code.get(start..end) else {
                                continue;
                            };
                            let color = active.last().map(|h| self.theme.highlight_color(*h));
                            self.push_text(&mut html, color, text);
                        }
                    }
                }
            }
        }

        html.push_str("</span></code></pre>");
        Ok(html)
    }
}

fn escape_into(html: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            '\'' => html.push_str("&#39;"),
            _ => html.push(c),
        }
    }
}
