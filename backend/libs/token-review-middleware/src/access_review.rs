//! Access decisions via the Kubernetes SubjectAccessReview API

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    self as authz, NonResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::{api::PostParams, Api, Client};

use crate::error::ReviewError;
use crate::identity::UserInfo;

/// Who wants to do what: a reviewed identity plus a non-resource path and verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessQuery {
    pub user: UserInfo,
    pub path: String,
    pub verb: String,
}

impl AccessQuery {
    pub fn new(user: UserInfo, path: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            user,
            path: path.into(),
            verb: verb.into(),
        }
    }

    /// Spec of the SubjectAccessReview submitted for this query
    pub fn to_spec(&self) -> SubjectAccessReviewSpec {
        let extra = if self.user.extra.is_empty() {
            None
        } else {
            Some(self.user.extra.clone())
        };

        SubjectAccessReviewSpec {
            user: Some(self.user.username.clone()),
            uid: self.user.uid.clone(),
            groups: Some(self.user.groups.clone()),
            extra,
            non_resource_attributes: Some(NonResourceAttributes {
                path: Some(self.path.clone()),
                verb: Some(self.verb.clone()),
            }),
            ..Default::default()
        }
    }
}

/// Raw verdict returned by an access reviewer.
///
/// `allowed` and `denied` are independent; both may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessReviewStatus {
    pub allowed: bool,
    pub denied: bool,
    pub reason: Option<String>,
    pub evaluation_error: Option<String>,
}

impl AccessReviewStatus {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Default::default()
        }
    }
}

impl From<authz::SubjectAccessReviewStatus> for AccessReviewStatus {
    fn from(status: authz::SubjectAccessReviewStatus) -> Self {
        Self {
            allowed: status.allowed,
            denied: status.denied.unwrap_or(false),
            reason: status.reason,
            evaluation_error: status.evaluation_error,
        }
    }
}

/// Answers access queries
#[async_trait]
pub trait SubjectAccessReviewer: Send + Sync {
    async fn review(&self, query: &AccessQuery) -> Result<AccessReviewStatus, ReviewError>;
}

/// SubjectAccessReviewer backed by the Kubernetes SubjectAccessReview API
#[derive(Clone)]
pub struct KubeSubjectAccessReviewer {
    client: Client,
}

impl KubeSubjectAccessReviewer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubjectAccessReviewer for KubeSubjectAccessReviewer {
    async fn review(&self, query: &AccessQuery) -> Result<AccessReviewStatus, ReviewError> {
        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());

        let review = SubjectAccessReview {
            metadata: Default::default(),
            spec: query.to_spec(),
            status: None,
        };

        let result = api.create(&PostParams::default(), &review).await?;

        result
            .status
            .map(AccessReviewStatus::from)
            .ok_or(ReviewError::MissingStatus("SubjectAccessReview"))
    }
}
