//! Error taxonomy.
//!
//! # Categories
//! - `RuleError`: a rule could not be parsed or failed validation. Raised at
//!   startup; the proxy refuses to serve a partial rule table.
//! - `DispatchError`: a matched request could not be served. Raised per
//!   request and converted into a 500 response at the request boundary.
//!
//! A request that matches no rule is not an error: lookups return `None`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure to turn raw rule text into a structured rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// No rules were supplied at all.
    #[error("no rules defined")]
    EmptyRuleSet,

    /// The rule text is malformed.
    #[error("invalid rule `{raw}`: {kind}")]
    Parse { raw: String, kind: ParseErrorKind },

    /// The rule parsed but violates a structural invariant.
    #[error("rule `{raw}` failed validation: {message}")]
    Validation { raw: String, message: String },
}

impl RuleError {
    pub(crate) fn parse(raw: &str, kind: ParseErrorKind) -> Self {
        Self::Parse {
            raw: raw.to_string(),
            kind,
        }
    }

    pub(crate) fn validation(raw: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            raw: raw.to_string(),
            message: message.into(),
        }
    }
}

/// The specific reason a rule failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("origin is empty")]
    EmptyOrigin,

    #[error("target is empty")]
    EmptyTarget,

    #[error("target is missing the `TYPE:` separator")]
    MissingTypeSeparator,

    #[error("target type is empty")]
    EmptyType,

    #[error("target value is empty")]
    EmptyValue,

    #[error("unknown target type `{0}` (expected STATIC, PROXY or REDIRECT)")]
    UnknownType(String),

    #[error("unclosed `{{` in `{0}`")]
    UnclosedVariable(String),

    #[error("variable `{{{0}}}` is not a number")]
    InvalidVariable(String),

    #[error("static target `{0}` must not contain a URL scheme")]
    StaticScheme(String),

    #[error("static target `{0}` is not an absolute path")]
    StaticNotAbsolute(String),

    #[error("target `{0}` is missing a host")]
    MissingHost(String),

    #[error("target `{0}` is missing a port")]
    MissingPort(String),

    #[error("target `{0}` has an invalid port")]
    InvalidPort(String),

    #[error("proxy target `{0}` must not contain a path")]
    ProxyPath(String),

    #[error("invalid host label `{0}`")]
    InvalidLabel(String),

    #[error("wildcard `*` is only allowed as the leftmost label of `{0}`")]
    MisplacedWildcard(String),

    #[error("unsupported protocol `{0}`")]
    UnsupportedProtocol(String),
}

/// Failure while serving a matched request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A `{n}` placeholder refers to a host label or path segment the
    /// request does not have.
    #[error("variable `{placeholder}` has no value for this request")]
    MissingVariable { placeholder: String },

    /// The rewritten outbound URL could not be built.
    #[error("invalid outbound url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The backend could not be reached or the exchange failed.
    #[error("upstream request to {target} failed: {source}")]
    Upstream {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    /// The WebSocket upgrade could not be completed.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// The static file collaborator failed.
    #[error("static file error: {0}")]
    Static(#[from] std::io::Error),

    /// A response could not be assembled.
    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

impl DispatchError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::MissingVariable { .. } => "missing_variable",
            DispatchError::InvalidUrl { .. } => "invalid_url",
            DispatchError::Upstream { .. } => "upstream",
            DispatchError::Upgrade(_) => "upgrade",
            DispatchError::Static(_) => "static",
            DispatchError::Http(_) => "http",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_raw_rule() {
        let err = RuleError::parse("example.com=FOO:bar", ParseErrorKind::UnknownType("FOO".into()));
        let msg = err.to_string();
        assert!(msg.contains("example.com=FOO:bar"));
        assert!(msg.contains("unknown target type `FOO`"));
    }

    #[test]
    fn variable_errors_render_braces() {
        assert_eq!(
            ParseErrorKind::InvalidVariable("x".into()).to_string(),
            "variable `{x}` is not a number"
        );
        assert_eq!(
            ParseErrorKind::UnclosedVariable("/srv/{1".into()).to_string(),
            "unclosed `{` in `/srv/{1`"
        );
    }

    #[test]
    fn dispatch_error_maps_to_500() {
        let err = DispatchError::MissingVariable { placeholder: "{3}".into() };
        assert_eq!(err.kind(), "missing_variable");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
