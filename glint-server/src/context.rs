//! State shared by every stream the service handles.

use crate::config::{Config, LimitsConfig};
use crate::dispatch::HighlightRequest;
use glint_highlight::{HighlightError, Highlighter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Service statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Highlighter, limits and counters, cloned into each connection task.
#[derive(Clone)]
pub struct ServiceContext {
    pub highlighter: Arc<dyn Highlighter>,
    pub default_language: String,
    pub limits: LimitsConfig,
    pub stats: Arc<ServerStats>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("default_language", &self.default_language)
            .field("limits", &self.limits)
            .finish()
    }
}

impl ServiceContext {
    pub fn new(highlighter: Arc<dyn Highlighter>) -> Self {
        Self {
            highlighter,
            default_language: glint_highlight::DEFAULT_LANGUAGE.to_string(),
            limits: LimitsConfig::default(),
            stats: Arc::new(ServerStats::default()),
        }
    }

    /// Builds the context from configuration, loading grammar files.
    pub fn from_config(config: &Config) -> Result<Self, HighlightError> {
        let renderer = config.highlight.build_renderer()?;
        Ok(Self::new(Arc::new(renderer))
            .with_default_language(config.highlight.default_language.clone())
            .with_limits(config.limits.clone()))
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Returns a blocking job rendering `request`.
    ///
    /// Failures are logged and yield `None`, so only that request goes
    /// unanswered.
    pub fn render_job(
        &self,
        request: HighlightRequest,
    ) -> impl FnOnce() -> Option<String> + Send + 'static {
        let highlighter = Arc::clone(&self.highlighter);
        let stats = Arc::clone(&self.stats);
        stats.requests_total.fetch_add(1, Ordering::Relaxed);
        move || match highlighter.render(&request.code, &request.language) {
            Ok(html) => Some(html),
            Err(e) => {
                stats.errors_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Highlight failed for language {:?}: {}", request.language, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Echoes `language:code` and sleeps when the code starts with "slow".
    #[derive(Debug)]
    pub struct EchoHighlighter;

    impl Highlighter for EchoHighlighter {
        fn render(&self, code: &str, language: &str) -> Result<String, HighlightError> {
            if code.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(200));
            }
            if code == "panic" {
                panic!("highlighter panicked");
            }
            if language == "missing" {
                return Err(HighlightError::UnknownLanguage(language.to_string()));
            }
            Ok(format!("{}:{}", language, code))
        }
    }

    pub fn echo_context() -> ServiceContext {
        ServiceContext::new(Arc::new(EchoHighlighter))
    }
}
