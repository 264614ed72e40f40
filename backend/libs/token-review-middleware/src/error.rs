//! Error types for token review authentication
//!
//! `AuthFailure` is what the middleware rejects a request with. Its
//! `Display` output is the canonical description written to the client;
//! the underlying remote errors (`ReviewError`, `AuthorizeError`) are only
//! ever logged.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::Decision;

/// Reasons a request is rejected before reaching the wrapped service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No Authorization header was presented
    #[error("unable to find authentication token")]
    MissingCredential,

    /// Authorization header is not exactly `bearer <token>`
    #[error("invalid authentication")]
    MalformedCredential,

    /// Token review ran and reported the token as unauthenticated
    #[error("user was not authenticated")]
    NotAuthenticated,

    /// Token review call itself failed
    #[error("unable to authenticate token")]
    VerificationUnavailable,

    /// Access review call failed
    #[error("unable to authorize user")]
    AuthorizationUnavailable,

    /// Access review returned anything other than an explicit allow
    #[error("unable to authorize user")]
    NotAuthorized,
}

impl AuthFailure {
    /// Stable snake_case label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthFailure::MissingCredential => "missing_credential",
            AuthFailure::MalformedCredential => "malformed_credential",
            AuthFailure::NotAuthenticated => "not_authenticated",
            AuthFailure::VerificationUnavailable => "verification_unavailable",
            AuthFailure::AuthorizationUnavailable => "authorization_unavailable",
            AuthFailure::NotAuthorized => "not_authorized",
        }
    }
}

impl ResponseError for AuthFailure {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ErrorResponse::from(*self))
    }
}

/// JSON body written on every rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Human-readable description
    pub description: String,
}

impl ErrorResponse {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            error: None,
            description: description.into(),
        }
    }
}

impl From<AuthFailure> for ErrorResponse {
    fn from(failure: AuthFailure) -> Self {
        ErrorResponse::new(failure.to_string())
    }
}

/// Failure talking to a review API (TokenReview or SubjectAccessReview)
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Kubernetes API call failed
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The API accepted the review but returned no status
    #[error("{0} returned no status")]
    MissingStatus(&'static str),

    /// Any other failure reported by a reviewer implementation
    #[error("review request failed: {0}")]
    Request(String),
}

/// Failure produced by a `UserInfoAuthorizer`
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// The access review could not be completed; no decision is available
    #[error("access review failed: {0}")]
    Review(#[from] ReviewError),

    /// The reviewer both allowed and denied the request
    #[error("access review both allowed and denied the request")]
    Conflicting {
        /// Reason supplied by the reviewer, if any
        reason: Option<String>,
    },
}

impl AuthorizeError {
    /// Decision that still applies alongside this error, if any.
    ///
    /// A conflicting verdict resolves to `Denied`; a failed review has none.
    pub fn decision(&self) -> Option<Decision> {
        match self {
            AuthorizeError::Review(_) => None,
            AuthorizeError::Conflicting { .. } => Some(Decision::Denied),
        }
    }
}
