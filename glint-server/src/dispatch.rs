//! Binary-protocol command dispatch.

use crate::error::DispatchError;
use glint_protocol::{BinaryFrame, CMD_EXIT, CMD_HIGHLIGHT};

/// Prefix selecting a language inside a highlight argument.
pub const LANG_PREFIX: &str = "lang:";

/// A highlight job: code and the language to render it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightRequest {
    pub language: String,
    pub code: String,
}

impl HighlightRequest {
    /// Parses a highlight argument.
    ///
    /// `lang:<name>;<code>` selects `<name>`; the split is on the first `;`.
    /// Anything else (including a `lang:` prefix with no `;`) is code in the
    /// default language.
    pub fn parse(argument: &str, default_language: &str) -> Self {
        if let Some((language, code)) = argument
            .strip_prefix(LANG_PREFIX)
            .and_then(|rest| rest.split_once(';'))
        {
            return Self {
                language: language.to_string(),
                code: code.to_string(),
            };
        }
        Self {
            language: default_language.to_string(),
            code: argument.to_string(),
        }
    }
}

/// Commands of the binary protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Terminate the hosting process. Nothing is written back.
    Exit,
    /// Render code; the response is `[u32 LE len][html]`.
    Highlight(HighlightRequest),
}

/// Decodes binary frames into commands.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    default_language: String,
}

impl CommandDispatcher {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }

    /// Decodes a frame. Frames too short for a command code and unknown
    /// codes are protocol violations.
    pub fn decode(&self, frame: &BinaryFrame) -> Result<Command, DispatchError> {
        match frame.command_code()? {
            CMD_EXIT => Ok(Command::Exit),
            CMD_HIGHLIGHT => {
                let argument = frame.argument();
                let argument = String::from_utf8_lossy(&argument);
                Ok(Command::Highlight(HighlightRequest::parse(
                    &argument,
                    &self.default_language,
                )))
            }
            code => Err(DispatchError::UnknownCommand(code)),
        }
    }
}
