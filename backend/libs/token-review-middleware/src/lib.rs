//! # Token Review Middleware
//!
//! Actix middleware that authenticates in-cluster callers with the Kubernetes
//! TokenReview API and, optionally, authorizes them with a
//! SubjectAccessReview on the request path and method.
//!
//! ## Modules
//! - `middleware`: the `TokenReviewMiddleware` transform
//! - `identity`: token review boundary and its Kubernetes client
//! - `access_review`: subject access review boundary and its Kubernetes client
//! - `authorizer`: reduces access reviews to a `Decision`
//! - `decision`: allow / deny / no-opinion outcome
//! - `error`: rejection kinds and the JSON error body
//! - `config`: environment configuration and exempt paths
//! - `metrics`: Prometheus counters for outcomes and remote latency

pub mod access_review;
pub mod authorizer;
pub mod config;
pub mod decision;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod middleware;

pub use access_review::{
    AccessQuery, AccessReviewStatus, KubeSubjectAccessReviewer, SubjectAccessReviewer,
};
pub use authorizer::{SarUserInfoAuthorizer, UserInfoAuthorizer};
pub use config::{ExemptPaths, MiddlewareConfig};
pub use decision::Decision;
pub use error::{AuthFailure, AuthorizeError, ErrorResponse, ReviewError};
pub use identity::{KubeTokenReviewer, TokenReviewStatus, TokenReviewer, UserInfo};
pub use middleware::{bearer_token, TokenReviewMiddleware};
