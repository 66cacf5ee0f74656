// Error types for the dispatch core

use crate::MiddlewareResolution;
use http::StatusCode;
use thiserror::Error;

/// Every failure the dispatch core can report.
///
/// Errors are returned, never swallowed, and are expected to be caught once
/// at the transport boundary (see [`crate::Application`]), which maps them to
/// a status code through [`Error::status_code`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Handler group not found: {0}")]
    HandlerGroupNotFound(String),

    #[error("Handler method not found: {0}")]
    HandlerMethodNotFound(String),

    #[error("Method not allowed: expected {expected}, got {actual}")]
    MethodNotAllowed { expected: String, actual: String },

    #[error("Dependencies not met: {0}")]
    DependenciesNotMet(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Mapping mismatch: {0}")]
    MappingMismatch(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Request rejected by middleware ({}): {}", .0.status, .0.message)]
    RequestRejected(MiddlewareResolution),

    #[error("Handler group is restricted to the command line: {0}")]
    CliOnly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::HandlerGroupNotFound(_) | Error::HandlerMethodNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::DependenciesNotMet(_) | Error::MappingMismatch(_) | Error::InvalidValue(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::RequestRejected(resolution) => resolution.status,
            Error::CircularDependency(_)
            | Error::CliOnly(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for the "module/group/method not found" family
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self,
            Error::HandlerGroupNotFound(_) | Error::HandlerMethodNotFound(_)
        )
    }

    /// True when the error came out of structural mapping
    pub fn is_mapping_failure(&self) -> bool {
        matches!(self, Error::MappingMismatch(_) | Error::InvalidValue(_))
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_failures_map_to_not_found() {
        let err = Error::HandlerGroupNotFound("App::Users::UsersController".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.is_routing_failure());

        let err = Error::HandlerMethodNotFound("index".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rejection_carries_resolution_status() {
        let resolution = MiddlewareResolution::reject("nope", StatusCode::UNAUTHORIZED);
        let err = Error::RequestRejected(resolution);

        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_dependency_errors_are_bad_requests() {
        assert_eq!(
            Error::DependenciesNotMet("id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidValue("age".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(Error::CircularDependency("A".into()).is_server_error());
    }
}
