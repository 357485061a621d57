//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via GLINT_CONFIG or --config)
//! 3. Environment variables

use glint_highlight::{GrammarRegistry, HighlightError, HtmlRenderer, Theme};
use glint_protocol::{DEFAULT_MAX_PENDING_BYTES, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Per-stream resource limits.
    pub limits: LimitsConfig,
    /// Highlighting configuration.
    pub highlight: HighlightConfig,
}

impl Config {
    /// Loads configuration from an optional YAML file, then applies
    /// environment variable overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.limits.apply_env_overrides();
        self.highlight.apply_env_overrides();
    }

    /// Checks limits that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be at least 1".to_string(),
            ));
        }
        self.limits.validate()?;
        if self.highlight.default_language.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "highlight.default_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the binary transport binds to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("GLINT_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(port) = std::env::var("GLINT_PORT") {
            if let Ok(port) = port.parse() {
                self.bind_addr.set_port(port);
            }
        }

        if let Ok(max) = std::env::var("GLINT_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }
}

/// Per-stream resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest frame (and undelimited header block) a peer may send. A stream
    /// exceeding it is failed.
    pub max_pending_bytes: usize,
    /// Size of the socket/pipe read buffer.
    pub read_buffer_size: usize,
    /// Highlight requests a single stream may have in flight before reading
    /// pauses.
    pub max_in_flight: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            read_buffer_size: 8 * 1024,
            max_in_flight: 64,
        }
    }
}

impl LimitsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("GLINT_MAX_PENDING_BYTES") {
            if let Ok(n) = max.parse() {
                self.max_pending_bytes = n;
            }
        }

        if let Ok(size) = std::env::var("GLINT_READ_BUFFER_SIZE") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }

        if let Ok(max) = std::env::var("GLINT_MAX_IN_FLIGHT") {
            if let Ok(n) = max.parse() {
                self.max_in_flight = n;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("limits.max_pending_bytes", self.max_pending_bytes),
            ("limits.read_buffer_size", self.read_buffer_size),
            ("limits.max_in_flight", self.max_in_flight),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Highlighting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Language used when a request does not name one.
    pub default_language: String,
    /// Bundled theme name.
    pub theme: String,
    /// Extra JSON grammar manifests registered at startup.
    pub grammar_files: Vec<PathBuf>,
    /// Colors substituted in rendered HTML.
    pub color_replacements: BTreeMap<String, String>,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        let mut color_replacements = BTreeMap::new();
        color_replacements.insert(
            "#fafafa".to_string(),
            "rgb(245 245 244 / var(--tw-bg-opacity))".to_string(),
        );
        Self {
            default_language: glint_highlight::DEFAULT_LANGUAGE.to_string(),
            theme: glint_highlight::DEFAULT_THEME.to_string(),
            grammar_files: Vec::new(),
            color_replacements,
        }
    }
}

impl HighlightConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(lang) = std::env::var("GLINT_DEFAULT_LANG") {
            if !lang.is_empty() {
                self.default_language = lang;
            }
        }

        if let Ok(theme) = std::env::var("GLINT_THEME") {
            if !theme.is_empty() {
                self.theme = theme;
            }
        }

        if let Some(paths) = std::env::var_os("GLINT_GRAMMAR_FILES") {
            self.grammar_files
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
    }

    /// Builds the renderer: bundled grammars, configured grammar manifests, theme.
    ///
    /// Any grammar file that fails to load is a startup error.
    pub fn build_renderer(&self) -> Result<HtmlRenderer, HighlightError> {
        let mut grammars = GrammarRegistry::with_builtins()?;
        for path in &self.grammar_files {
            grammars.load_file(path)?;
        }

        let theme = Theme::builtin(&self.theme)
            .ok_or_else(|| HighlightError::UnknownTheme(self.theme.clone()))?
            .with_color_replacements(&self.color_replacements);

        Ok(HtmlRenderer::new(grammars, theme))
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
