//! Token verification via the Kubernetes TokenReview API
//!
//! The middleware only depends on the [`TokenReviewer`] trait, so tests and
//! non-Kubernetes hosts can substitute their own reviewer. [`KubeTokenReviewer`]
//! is the production implementation.
//!
//! ```rust,ignore
//! let client = kube::Client::try_default().await?;
//! let reviewer = KubeTokenReviewer::new(client);
//! let status = reviewer.review(token).await?;
//! ```

use std::collections::BTreeMap;

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use async_trait::async_trait;
use futures::future::{ready, Ready};
use k8s_openapi::api::authentication::v1::{self as authn, TokenReview, TokenReviewSpec};
use kube::{api::PostParams, Api, Client};
use tracing::debug;

use crate::error::{AuthFailure, ReviewError};

/// Identity of a reviewed token
///
/// Inserted into request extensions once a request has passed the
/// middleware; handlers can take it as an extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub uid: Option<String>,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.extra
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

impl From<authn::UserInfo> for UserInfo {
    fn from(user: authn::UserInfo) -> Self {
        Self {
            username: user.username.unwrap_or_default(),
            uid: user.uid,
            groups: user.groups.unwrap_or_default(),
            extra: user.extra.unwrap_or_default(),
        }
    }
}

impl FromRequest for UserInfo {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<UserInfo>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(AuthFailure::NotAuthenticated.into())),
        }
    }
}

/// Result of reviewing a bearer token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReviewStatus {
    pub authenticated: bool,
    pub user: UserInfo,
    pub audiences: Vec<String>,
    /// Reviewer-side explanation when the token was not authenticated
    pub error: Option<String>,
}

impl TokenReviewStatus {
    /// An authenticated status for `user`
    pub fn authenticated(user: UserInfo) -> Self {
        Self {
            authenticated: true,
            user,
            ..Default::default()
        }
    }

    /// An unauthenticated status
    pub fn unauthenticated() -> Self {
        Self::default()
    }
}

impl From<authn::TokenReviewStatus> for TokenReviewStatus {
    fn from(status: authn::TokenReviewStatus) -> Self {
        Self {
            authenticated: status.authenticated.unwrap_or(false),
            user: status.user.map(UserInfo::from).unwrap_or_default(),
            audiences: status.audiences.unwrap_or_default(),
            error: status.error,
        }
    }
}

/// Verifies bearer tokens
#[async_trait]
pub trait TokenReviewer: Send + Sync {
    /// Submit `token` for review.
    ///
    /// An `Err` means the review could not be performed; a reviewed but
    /// rejected token is an `Ok` status with `authenticated == false`.
    async fn review(&self, token: &str) -> Result<TokenReviewStatus, ReviewError>;
}

/// TokenReviewer backed by the Kubernetes TokenReview API
#[derive(Clone)]
pub struct KubeTokenReviewer {
    client: Client,
    audiences: Option<Vec<String>>,
}

impl KubeTokenReviewer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            audiences: None,
        }
    }

    /// Restrict accepted tokens to the given audiences
    pub fn with_audiences(client: Client, audiences: Vec<String>) -> Self {
        Self {
            client,
            audiences: Some(audiences),
        }
    }

    fn build_review(&self, token: &str) -> TokenReview {
        TokenReview {
            metadata: Default::default(),
            spec: TokenReviewSpec {
                token: Some(token.to_string()),
                audiences: self.audiences.clone(),
            },
            status: None,
        }
    }
}

#[async_trait]
impl TokenReviewer for KubeTokenReviewer {
    async fn review(&self, token: &str) -> Result<TokenReviewStatus, ReviewError> {
        let api: Api<TokenReview> = Api::all(self.client.clone());

        let review = self.build_review(token);
        let result = api.create(&PostParams::default(), &review).await?;

        let status: TokenReviewStatus = result
            .status
            .ok_or(ReviewError::MissingStatus("TokenReview"))?
            .into();

        if !status.authenticated {
            debug!(
                error = status.error.as_deref().unwrap_or(""),
                "TokenReview rejected token"
            );
        }

        Ok(status)
    }
}
