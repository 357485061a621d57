//! Header-frame request routing.

use crate::dispatch::HighlightRequest;
use crate::error::RouteError;
use glint_protocol::{DeclaredLength, HeaderFrame};

/// Route served by the highlighter.
pub const HIGHLIGHT_ROUTE: &str = "/highlight";

/// Route stamped on highlight responses.
pub const HIGHLIGHT_RESPONSE_ROUTE: &str = "/highlight/rsp";

/// Optional header selecting the language.
pub const LANG_HEADER: &str = "lang";

/// Optional header echoed back on the response.
pub const REQUEST_ID_HEADER: &str = "rid";

/// Routes known to the stdio transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Highlight,
    Unknown(String),
}

impl Route {
    pub fn parse(path: &str) -> Self {
        match path {
            HIGHLIGHT_ROUTE => Route::Highlight,
            other => Route::Unknown(other.to_string()),
        }
    }
}

/// A request accepted by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedRequest {
    /// Value of the `rid` header, if the client sent one.
    pub request_id: Option<String>,
    pub highlight: HighlightRequest,
}

/// Maps header frames to highlight requests and builds responses.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    default_language: String,
}

impl RequestRouter {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }

    /// Routes a frame.
    ///
    /// The highlight route needs a numeric `$length`; the body is the code,
    /// decoded lossily. `lang` is lowercased.
    pub fn route(&self, frame: HeaderFrame) -> Result<RoutedRequest, RouteError> {
        let path = frame.route().unwrap_or_default();
        match Route::parse(path) {
            Route::Highlight => {}
            Route::Unknown(path) => return Err(RouteError::UnknownRoute(path)),
        }

        match frame.headers.declared_length() {
            DeclaredLength::Bytes(_) => {}
            DeclaredLength::Absent => return Err(RouteError::MissingLength),
            DeclaredLength::Invalid(value) => return Err(RouteError::InvalidLength(value)),
        }

        let language = frame
            .headers
            .get(LANG_HEADER)
            .filter(|lang| !lang.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_language.clone());
        let code = frame
            .body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .unwrap_or_default();

        Ok(RoutedRequest {
            request_id: frame.headers.get(REQUEST_ID_HEADER).map(str::to_string),
            highlight: HighlightRequest { language, code },
        })
    }

    /// Builds the response frame for a rendered request.
    pub fn highlight_response(&self, request_id: Option<&str>, html: String) -> HeaderFrame {
        let mut frame = HeaderFrame::new(HIGHLIGHT_RESPONSE_ROUTE);
        if let Some(rid) = request_id {
            frame = frame.with_header(REQUEST_ID_HEADER, rid);
        }
        frame.with_body(html)
    }
}
