//! Authorization of reviewed identities

use std::sync::Arc;

use actix_web::HttpRequest;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::access_review::{AccessQuery, SubjectAccessReviewer};
use crate::decision::Decision;
use crate::error::AuthorizeError;
use crate::identity::UserInfo;

/// Decides whether an authenticated user may perform a request
#[async_trait(?Send)]
pub trait UserInfoAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        user: &UserInfo,
        req: &HttpRequest,
    ) -> Result<Decision, AuthorizeError>;
}

/// Authorizes requests with a SubjectAccessReview on the request path and method
///
/// One review per call, no retries. A verdict that is both allowed and
/// denied is returned as [`AuthorizeError::Conflicting`], whose
/// [`decision`](AuthorizeError::decision) is `Denied`.
#[derive(Clone)]
pub struct SarUserInfoAuthorizer {
    reviewer: Arc<dyn SubjectAccessReviewer>,
}

impl SarUserInfoAuthorizer {
    pub fn new(reviewer: Arc<dyn SubjectAccessReviewer>) -> Self {
        Self { reviewer }
    }
}

#[async_trait(?Send)]
impl UserInfoAuthorizer for SarUserInfoAuthorizer {
    async fn authorize(
        &self,
        user: &UserInfo,
        req: &HttpRequest,
    ) -> Result<Decision, AuthorizeError> {
        let query = AccessQuery::new(user.clone(), req.path(), req.method().as_str());

        let status = self.reviewer.review(&query).await?;

        if Decision::is_conflicting(status.allowed, status.denied) {
            warn!(
                user = %user.username,
                path = %query.path,
                verb = %query.verb,
                reason = status.reason.as_deref().unwrap_or(""),
                evaluation_error = status.evaluation_error.as_deref().unwrap_or(""),
                "SubjectAccessReview both allowed and denied the request"
            );
            return Err(AuthorizeError::Conflicting {
                reason: status.reason,
            });
        }

        if let Some(error) = status.evaluation_error.as_deref() {
            warn!(
                user = %user.username,
                path = %query.path,
                verb = %query.verb,
                evaluation_error = error,
                "SubjectAccessReview reported an evaluation error"
            );
        }

        let decision = Decision::from_flags(status.allowed, status.denied);
        if !decision.is_allowed() {
            debug!(
                user = %user.username,
                path = %query.path,
                verb = %query.verb,
                decision = %decision,
                reason = status.reason.as_deref().unwrap_or(""),
                "SubjectAccessReview did not allow the request"
            );
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_review::AccessReviewStatus;
    use crate::error::ReviewError;
    use actix_web::test::TestRequest;
    use std::io;
    use std::sync::Mutex;

    const UNKNOWN_REVIEW: &str = "unknown subject access review";

    /// Answers only the exact query it was built with
    struct FakeSubjectAccessReview {
        query: AccessQuery,
        status: AccessReviewStatus,
    }

    #[async_trait]
    impl SubjectAccessReviewer for FakeSubjectAccessReview {
        async fn review(&self, query: &AccessQuery) -> Result<AccessReviewStatus, ReviewError> {
            if query.to_spec() != self.query.to_spec() {
                return Err(ReviewError::Request(UNKNOWN_REVIEW.into()));
            }
            Ok(self.status.clone())
        }
    }

    fn authorizer(query: AccessQuery, status: AccessReviewStatus) -> SarUserInfoAuthorizer {
        SarUserInfoAuthorizer::new(Arc::new(FakeSubjectAccessReview { query, status }))
    }

    fn get_testing() -> HttpRequest {
        TestRequest::get().uri("/testing").to_http_request()
    }

    /// Log sink shared between a test and its scoped subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[actix_web::test]
    async fn test_allowed_request() {
        let user = UserInfo::new("foo");
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/testing", "GET"),
            AccessReviewStatus::allowed(),
        );

        let decision = sar.authorize(&user, &get_testing()).await.unwrap();
        assert_eq!(decision, Decision::Allowed);
    }

    #[actix_web::test]
    async fn test_no_opinion_request() {
        let user = UserInfo::new("foo");
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/testing", "GET"),
            AccessReviewStatus::default(),
        );

        let decision = sar.authorize(&user, &get_testing()).await.unwrap();
        assert_eq!(decision, Decision::NoOpinion);
    }

    #[actix_web::test]
    async fn test_denied_request_with_extra() {
        let user = UserInfo::new("foo").with_extra("scope", ["hello"]);
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/testing", "GET"),
            AccessReviewStatus::denied(),
        );

        let decision = sar.authorize(&user, &get_testing()).await.unwrap();
        assert_eq!(decision, Decision::Denied);
    }

    #[actix_web::test]
    async fn test_denied_request_logs_reason_and_evaluation_error() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let user = UserInfo::new("foo");
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/testing", "GET"),
            AccessReviewStatus {
                allowed: false,
                denied: true,
                reason: Some("no rule grants access".to_string()),
                evaluation_error: Some("webhook timed out".to_string()),
            },
        );

        let decision = sar.authorize(&user, &get_testing()).await.unwrap();
        assert_eq!(decision, Decision::Denied);

        let output = logs.contents();
        assert!(output.contains("no rule grants access"), "{}", output);
        assert!(output.contains("webhook timed out"), "{}", output);
    }

    #[actix_web::test]
    async fn test_allowed_and_denied_is_conflicting() {
        let user = UserInfo::new("foo");
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/testing", "GET"),
            AccessReviewStatus {
                allowed: true,
                denied: true,
                reason: Some("two rules disagree".to_string()),
                evaluation_error: None,
            },
        );

        let err = sar.authorize(&user, &get_testing()).await.unwrap_err();
        assert_eq!(err.decision(), Some(Decision::Denied));
        match err {
            AuthorizeError::Conflicting { reason } => {
                assert_eq!(reason.as_deref(), Some("two rules disagree"));
            }
            other => panic!("expected conflicting verdict, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_review_failure_is_propagated() {
        let sar = authorizer(
            AccessQuery::new(UserInfo::new("unknown"), "/testing", "GET"),
            AccessReviewStatus::allowed(),
        );

        let err = sar
            .authorize(&UserInfo::new("foo"), &get_testing())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizeError::Review(_)));
        assert_eq!(err.decision(), None);
    }

    #[actix_web::test]
    async fn test_query_uses_request_method_and_path() {
        let user = UserInfo::new("foo");
        let sar = authorizer(
            AccessQuery::new(user.clone(), "/v2/catalog", "POST"),
            AccessReviewStatus::allowed(),
        );

        let req = TestRequest::post().uri("/v2/catalog?x=1").to_http_request();
        let decision = sar.authorize(&user, &req).await.unwrap();
        assert_eq!(decision, Decision::Allowed);

        // Same identity, different verb: not the reviewed query
        let req = TestRequest::get().uri("/v2/catalog").to_http_request();
        assert!(sar.authorize(&user, &req).await.is_err());
    }
}
