//! Token review authentication middleware
//!
//! Every request not on an exempt path must carry `Authorization: bearer <token>`.
//! The token is checked with a [`TokenReviewer`]; if an authorizer is
//! configured the reviewed user must then be explicitly allowed. Any failure
//! ends the request with 401 and a JSON [`ErrorResponse`](crate::ErrorResponse);
//! the wrapped service is only called on success.
//!
//! ```rust,ignore
//! let client = kube::Client::try_default().await?;
//! let config = MiddlewareConfig::from_env()?;
//! let auth = TokenReviewMiddleware::from_config(&config, client);
//!
//! HttpServer::new(move || App::new().wrap(auth.clone()).service(api()))
//! ```

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderMap},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use tracing::{debug, warn};

use crate::access_review::KubeSubjectAccessReviewer;
use crate::authorizer::{SarUserInfoAuthorizer, UserInfoAuthorizer};
use crate::config::{ExemptPaths, MiddlewareConfig};
use crate::error::AuthFailure;
use crate::identity::{KubeTokenReviewer, TokenReviewer, UserInfo};
use crate::metrics;

/// Authentication scheme accepted in the Authorization header (case-insensitive)
pub const BEARER_SCHEME: &str = "bearer";

/// TokenReview authentication middleware
#[derive(Clone)]
pub struct TokenReviewMiddleware {
    reviewer: Arc<dyn TokenReviewer>,
    authorizer: Option<Arc<dyn UserInfoAuthorizer>>,
    exempt_paths: ExemptPaths,
}

impl TokenReviewMiddleware {
    /// Authenticate with `reviewer` only; `/healthz` is exempt
    pub fn new(reviewer: Arc<dyn TokenReviewer>) -> Self {
        Self {
            reviewer,
            authorizer: None,
            exempt_paths: ExemptPaths::default(),
        }
    }

    /// Also require an explicit allow from `authorizer`
    pub fn with_authorizer(mut self, authorizer: Arc<dyn UserInfoAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Replace the set of paths served without authentication
    pub fn with_exempt_paths(mut self, exempt_paths: ExemptPaths) -> Self {
        self.exempt_paths = exempt_paths;
        self
    }

    /// Build the middleware against the cluster's TokenReview and
    /// SubjectAccessReview APIs
    pub fn from_config(config: &MiddlewareConfig, client: kube::Client) -> Self {
        let reviewer = match config.token_audiences.clone() {
            Some(audiences) => KubeTokenReviewer::with_audiences(client.clone(), audiences),
            None => KubeTokenReviewer::new(client.clone()),
        };

        let middleware = Self {
            reviewer: Arc::new(reviewer),
            authorizer: None,
            exempt_paths: config.exempt_paths(),
        };

        if config.authorize {
            let sar = SarUserInfoAuthorizer::new(Arc::new(KubeSubjectAccessReviewer::new(client)));
            middleware.with_authorizer(Arc::new(sar))
        } else {
            middleware
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TokenReviewMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = TokenReviewMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TokenReviewMiddlewareService {
            service: Rc::new(service),
            reviewer: self.reviewer.clone(),
            authorizer: self.authorizer.clone(),
            exempt_paths: self.exempt_paths.clone(),
        }))
    }
}

pub struct TokenReviewMiddlewareService<S> {
    service: Rc<S>,
    reviewer: Arc<dyn TokenReviewer>,
    authorizer: Option<Arc<dyn UserInfoAuthorizer>>,
    exempt_paths: ExemptPaths,
}

impl<S, B> Service<ServiceRequest> for TokenReviewMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if self.exempt_paths.contains(req.path()) {
            debug!(path = %req.path(), "Path exempt from token review");
            metrics::record_outcome(metrics::OUTCOME_EXEMPT);
            return Box::pin(async move {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            });
        }

        let reviewer = self.reviewer.clone();
        let authorizer = self.authorizer.clone();

        Box::pin(async move {
            let outcome = authenticate(&req, &*reviewer, authorizer.as_deref()).await;

            match outcome {
                Ok(user) => {
                    debug!(
                        user = %user.username,
                        groups = user.groups.len(),
                        method = %req.method(),
                        path = %req.path(),
                        "Request authenticated"
                    );
                    metrics::record_outcome(metrics::OUTCOME_FORWARDED);

                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(failure) => {
                    metrics::record_outcome(failure.kind());
                    Ok(req.error_response(failure).map_into_right_body())
                }
            }
        })
    }
}

/// Extract the token from an `Authorization: bearer <token>` header
///
/// A missing or empty header is [`AuthFailure::MissingCredential`]; anything
/// other than exactly a bearer scheme followed by one token is
/// [`AuthFailure::MalformedCredential`].
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers
        .get(header::AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .ok_or(AuthFailure::MissingCredential)?;

    let value = value
        .to_str()
        .map_err(|_| AuthFailure::MalformedCredential)?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => {
            Ok(token)
        }
        _ => Err(AuthFailure::MalformedCredential),
    }
}

async fn authenticate(
    req: &ServiceRequest,
    reviewer: &dyn TokenReviewer,
    authorizer: Option<&dyn UserInfoAuthorizer>,
) -> Result<UserInfo, AuthFailure> {
    let token = bearer_token(req.headers()).map_err(|failure| {
        warn!(path = %req.path(), reason = failure.kind(), "Rejected request credentials");
        failure
    })?;

    let start = Instant::now();
    let reviewed = reviewer.review(token).await;
    metrics::observe_remote(metrics::CALL_TOKEN_REVIEW, start);

    let status = reviewed.map_err(|e| {
        warn!(path = %req.path(), error = %e, "TokenReview failed");
        AuthFailure::VerificationUnavailable
    })?;

    if !status.authenticated {
        warn!(
            path = %req.path(),
            error = status.error.as_deref().unwrap_or(""),
            "Token was not authenticated"
        );
        return Err(AuthFailure::NotAuthenticated);
    }

    let user = status.user;

    let Some(authorizer) = authorizer else {
        return Ok(user);
    };

    let start = Instant::now();
    let authorized = authorizer.authorize(&user, req.request()).await;
    metrics::observe_remote(metrics::CALL_SUBJECT_ACCESS_REVIEW, start);

    match authorized {
        Ok(decision) if decision.is_allowed() => Ok(user),
        Ok(decision) => {
            warn!(
                user = %user.username,
                method = %req.method(),
                path = %req.path(),
                decision = %decision,
                "User not authorized"
            );
            Err(AuthFailure::NotAuthorized)
        }
        Err(e) => match e.decision() {
            Some(decision) => {
                warn!(
                    user = %user.username,
                    method = %req.method(),
                    path = %req.path(),
                    decision = %decision,
                    error = %e,
                    "User not authorized"
                );
                Err(AuthFailure::NotAuthorized)
            }
            None => {
                warn!(
                    user = %user.username,
                    path = %req.path(),
                    error = %e,
                    "Authorization failed"
                );
                Err(AuthFailure::AuthorizationUnavailable)
            }
        },
    }
}
