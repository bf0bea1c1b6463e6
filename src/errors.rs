//! # Error Types Module
//!
//! This module defines the failure taxonomy of the proposal generation
//! pipeline. Transport-level failures are classified once, in the invoker,
//! and travel as typed values from there on.

/// Coarse failure classification used to drive the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No provider credentials at all
    Unconfigured,
    /// Provider asked us to slow down
    RateLimited,
    /// Model or endpoint is not usable this run
    NotFound,
    /// Network trouble, timeouts, 5xx
    Transient,
    /// The backend answered, but the answer is unusable
    Malformed,
    /// Anything we could not classify
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Unconfigured => "unconfigured",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::NotFound => "not-found",
            FailureKind::Transient => "transient",
            FailureKind::Malformed => "malformed",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Failure of a single backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// Provider credential is missing; no request was sent
    Unconfigured(String),
    /// HTTP 429 or an equivalent error body
    RateLimited(String),
    /// HTTP 401/403/404: the model is not viable for this run
    NotFound(String),
    /// Timeouts, connection failures and server errors
    Transient(String),
    /// Successful status without usable content
    Malformed(String),
    /// Any other status
    Unknown(String),
}

impl InvokeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InvokeError::Unconfigured(_) => FailureKind::Unconfigured,
            InvokeError::RateLimited(_) => FailureKind::RateLimited,
            InvokeError::NotFound(_) => FailureKind::NotFound,
            InvokeError::Transient(_) => FailureKind::Transient,
            InvokeError::Malformed(_) => FailureKind::Malformed,
            InvokeError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Map an HTTP status code to the failure taxonomy
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            429 => InvokeError::RateLimited(detail),
            401 | 403 | 404 => InvokeError::NotFound(detail),
            408 | 500..=599 => InvokeError::Transient(detail),
            _ => InvokeError::Unknown(detail),
        }
    }
}

impl std::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeError::Unconfigured(msg) => write!(f, "Backend not configured: {msg}"),
            InvokeError::RateLimited(msg) => write!(f, "Rate limited: {msg}"),
            InvokeError::NotFound(msg) => write!(f, "Backend not available: {msg}"),
            InvokeError::Transient(msg) => write!(f, "Transient error: {msg}"),
            InvokeError::Malformed(msg) => write!(f, "Malformed response: {msg}"),
            InvokeError::Unknown(msg) => write!(f, "Unexpected error: {msg}"),
        }
    }
}

impl std::error::Error for InvokeError {}

impl From<reqwest::Error> for InvokeError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return InvokeError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            InvokeError::Transient(err.to_string())
        } else if err.is_decode() || err.is_body() {
            InvokeError::Malformed(err.to_string())
        } else {
            InvokeError::Unknown(err.to_string())
        }
    }
}

/// The response normalizer could not recover a JSON object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `{ ... }` pair in the cleaned text
    NoObject,
    /// The braces were found but the content is not valid JSON
    InvalidJson(String),
    /// Valid JSON, but not an object
    NotAnObject,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::NoObject => write!(f, "Parse error: no JSON object found"),
            ParseError::InvalidJson(msg) => write!(f, "Parse error: {msg}"),
            ParseError::NotAnObject => write!(f, "Parse error: top-level value is not an object"),
        }
    }
}

impl std::error::Error for ParseError {}

/// The parsed object does not satisfy the proposal schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent or null
    MissingField(&'static str),
    /// A field has a shape that cannot be coerced
    WrongType { field: &'static str, expected: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField(field) => {
                write!(f, "Validation error: missing required field '{field}'")
            }
            ValidationError::WrongType { field, expected } => {
                write!(f, "Validation error: field '{field}' must be {expected}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Hard failure surfaced by the orchestrator.
///
/// Every other failure resolves to a placeholder document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    Unconfigured(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Unconfigured(msg) => write!(f, "Generation is not configured: {msg}"),
        }
    }
}

impl std::error::Error for GenerationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(InvokeError::from_status(429, "").kind(), FailureKind::RateLimited);
        assert_eq!(InvokeError::from_status(404, "").kind(), FailureKind::NotFound);
        assert_eq!(InvokeError::from_status(401, "").kind(), FailureKind::NotFound);
        assert_eq!(InvokeError::from_status(503, "").kind(), FailureKind::Transient);
        assert_eq!(InvokeError::from_status(408, "").kind(), FailureKind::Transient);
        assert_eq!(InvokeError::from_status(418, "").kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_display_messages() {
        let err = ValidationError::MissingField("cta");
        assert_eq!(err.to_string(), "Validation error: missing required field 'cta'");

        let err = InvokeError::RateLimited("slow down".to_string());
        assert_eq!(err.to_string(), "Rate limited: slow down");
    }
}
