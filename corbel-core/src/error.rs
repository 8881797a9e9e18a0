// Error types for the corbel framework

use crate::HttpStatus;
use serde::Serialize;
use thiserror::Error;

/// A single failing field reported by a validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// How the exception filter layer treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised deliberately by application code with its own status and message.
    Declared,
    /// A well-known failure shape mapped through a fixed status table.
    Recognized,
    /// Anything else; always a 500.
    Unclassified,
}

#[derive(Error, Debug)]
pub enum Error {
    // Declared HTTP exceptions
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    // Recognized failure shapes
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Token error: {0}")]
    Token(String),

    // Unclassified
    #[error("Invalid controller metadata: {0}")]
    InvalidMetadata(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unhandled(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Declared exception with an explicit status.
    pub fn http(status: impl Into<u16>, message: impl Into<String>) -> Self {
        Error::Http {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Wrap any foreign error as an unclassified failure.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Unhandled(Box::new(err))
    }

    /// Validation failure for a single field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError::new(field, message)])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http { .. }
            | Error::BadRequest(_)
            | Error::Unauthorized(_)
            | Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::Conflict(_)
            | Error::UnprocessableEntity(_)
            | Error::TooManyRequests(_)
            | Error::ServiceUnavailable(_)
            | Error::Internal(_)
            | Error::RouteNotFound(_)
            | Error::MethodNotAllowed(_) => ErrorKind::Declared,
            Error::Parse(_) | Error::Type(_) | Error::Validation(_) | Error::Token(_) => {
                ErrorKind::Recognized
            }
            Error::InvalidMetadata(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Unhandled(_) => ErrorKind::Unclassified,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Http { status, .. } => *status,
            Error::BadRequest(_) => HttpStatus::BadRequest.code(),
            Error::Unauthorized(_) => HttpStatus::Unauthorized.code(),
            Error::Forbidden(_) => HttpStatus::Forbidden.code(),
            Error::NotFound(_) | Error::RouteNotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::Conflict(_) => HttpStatus::Conflict.code(),
            Error::UnprocessableEntity(_) => HttpStatus::UnprocessableEntity.code(),
            Error::TooManyRequests(_) => HttpStatus::TooManyRequests.code(),
            Error::ServiceUnavailable(_) => HttpStatus::ServiceUnavailable.code(),
            Error::Internal(_) => HttpStatus::InternalServerError.code(),
            Error::Parse(_) | Error::Type(_) | Error::Validation(_) | Error::Token(_) => {
                recognized_entry(self).map_or(500, |(status, _)| status.code())
            }
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Message suitable for the `message` field of an error body.
    ///
    /// Declared errors expose the text they were constructed with; recognized
    /// shapes use the fixed table; unclassified errors are masked when
    /// `production` is set.
    pub fn public_message(&self, production: bool) -> String {
        match self {
            Error::Http { message, .. }
            | Error::BadRequest(message)
            | Error::Unauthorized(message)
            | Error::Forbidden(message)
            | Error::NotFound(message)
            | Error::Conflict(message)
            | Error::UnprocessableEntity(message)
            | Error::TooManyRequests(message)
            | Error::ServiceUnavailable(message)
            | Error::RouteNotFound(message)
            | Error::MethodNotAllowed(message) => message.clone(),
            Error::Internal(message) => {
                if production {
                    "Internal server error".to_string()
                } else {
                    message.clone()
                }
            }
            Error::Parse(_) | Error::Type(_) | Error::Validation(_) | Error::Token(_) => {
                recognized_entry(self)
                    .map(|(_, message)| message.to_string())
                    .unwrap_or_else(|| self.to_string())
            }
            _ => {
                if production {
                    "Internal server error".to_string()
                } else {
                    self.to_string()
                }
            }
        }
    }

    /// Variant name, used by filters to select which errors they handle.
    pub fn name(&self) -> &'static str {
        match self {
            Error::Http { .. } => "Http",
            Error::BadRequest(_) => "BadRequest",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::UnprocessableEntity(_) => "UnprocessableEntity",
            Error::TooManyRequests(_) => "TooManyRequests",
            Error::ServiceUnavailable(_) => "ServiceUnavailable",
            Error::Internal(_) => "Internal",
            Error::RouteNotFound(_) => "RouteNotFound",
            Error::MethodNotAllowed(_) => "MethodNotAllowed",
            Error::Parse(_) => "Parse",
            Error::Type(_) => "Type",
            Error::Validation(_) => "Validation",
            Error::Token(_) => "Token",
            Error::InvalidMetadata(_) => "InvalidMetadata",
            Error::Config(_) => "Config",
            Error::Serialization(_) => "Serialization",
            Error::Io(_) => "Io",
            Error::Unhandled(_) => "Unhandled",
        }
    }

    /// Field-level detail carried by validation errors.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Error::Validation(fields) => Some(fields),
            _ => None,
        }
    }

    /// The error and every `source()` below it, outermost first.
    pub fn diagnostic_chain(&self) -> Vec<String> {
        let mut chain = vec![format!("{}: {}", self.name(), self)];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        chain
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Fixed table for recognized failure shapes.
fn recognized_entry(error: &Error) -> Option<(HttpStatus, &'static str)> {
    match error {
        Error::Parse(_) => Some((HttpStatus::BadRequest, "Invalid request body")),
        Error::Type(_) => Some((HttpStatus::BadRequest, "Invalid parameter type")),
        Error::Validation(_) => Some((HttpStatus::BadRequest, "Validation failed")),
        Error::Token(_) => Some((HttpStatus::Unauthorized, "Invalid or expired token")),
        _ => None,
    }
}
