// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(kube::Error),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Optimistic concurrency conflict: {0}")]
    Conflict(String),

    #[error("Object rejected as invalid: {0}")]
    Invalid(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Name already used by another repository: {0}")]
    NameTaken(String),

    #[error("Outcome unknown, the server may have applied it: {0}")]
    Unconfirmed(String),

    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

impl ControllerError {
    /// Whether a later attempt of the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Conflict(_) | ControllerError::Timeout(_) => true,
            ControllerError::KubeError(kube::Error::Api(resp)) => {
                resp.code == 429 || resp.code >= 500
            }
            // Transport, TLS and decoding failures
            ControllerError::KubeError(_) => true,
            _ => false,
        }
    }
}

impl From<kube::Error> for ControllerError {
    fn from(e: kube::Error) -> Self {
        let kube::Error::Api(resp) = &e else {
            return ControllerError::KubeError(e);
        };
        let code = resp.code;
        let reason = resp.reason.clone();
        let message = resp.message.clone();

        match code {
            409 if reason == "AlreadyExists" => ControllerError::AlreadyExists(message),
            409 => ControllerError::Conflict(message),
            404 => ControllerError::NotFound(message),
            400 | 422 => ControllerError::Invalid(message),
            401 | 403 => ControllerError::Forbidden(message),
            _ => ControllerError::KubeError(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_already_exists_is_not_a_conflict() {
        let err = ControllerError::from(api_error(409, "AlreadyExists"));
        assert!(matches!(err, ControllerError::AlreadyExists(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_version_conflict_is_retryable() {
        let err = ControllerError::from(api_error(409, "Conflict"));
        assert!(matches!(err, ControllerError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found() {
        let err = ControllerError::from(api_error(404, "NotFound"));
        assert!(matches!(err, ControllerError::NotFound(_)));
    }

    #[test]
    fn test_validation_errors_are_dropped() {
        let err = ControllerError::from(api_error(422, "Invalid"));
        assert!(matches!(err, ControllerError::Invalid(_)));
        assert!(!err.is_retryable());

        let err = ControllerError::from(api_error(403, "Forbidden"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(ControllerError::from(api_error(500, "InternalError")).is_retryable());
        assert!(ControllerError::from(api_error(503, "ServiceUnavailable")).is_retryable());
        assert!(ControllerError::from(api_error(429, "TooManyRequests")).is_retryable());
        assert!(!ControllerError::from(api_error(405, "MethodNotAllowed")).is_retryable());
    }

    #[test]
    fn test_timeout_retryable_cancel_not() {
        assert!(ControllerError::Timeout("create".to_string()).is_retryable());
        assert!(!ControllerError::Cancelled.is_retryable());
        assert!(!ControllerError::NameTaken("apprepo-x-sync-y-sync-z".to_string()).is_retryable());
        assert!(!ControllerError::Unconfirmed("create cleanup job".to_string()).is_retryable());
    }
}
