//! Middleware configuration
//!
//! Loaded once from `TOKEN_REVIEW_*` environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TOKEN_REVIEW_EXEMPT_PATHS` | `/healthz` | comma-separated unauthenticated paths |
//! | `TOKEN_REVIEW_TOKEN_AUDIENCES` | unset | comma-separated audiences required of tokens |
//! | `TOKEN_REVIEW_AUTHORIZE` | `true` | run a SubjectAccessReview after authentication |

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TOKEN_REVIEW_";

/// Liveness path exempt from authentication unless configured otherwise
pub const DEFAULT_EXEMPT_PATH: &str = "/healthz";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    #[serde(default)]
    pub token_audiences: Option<Vec<String>>,

    #[serde(default = "default_authorize")]
    pub authorize: bool,
}

fn default_exempt_paths() -> Vec<String> {
    vec![DEFAULT_EXEMPT_PATH.to_string()]
}

fn default_authorize() -> bool {
    true
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            exempt_paths: default_exempt_paths(),
            token_audiences: None,
            authorize: default_authorize(),
        }
    }
}

impl MiddlewareConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Exempt path set built from this configuration
    pub fn exempt_paths(&self) -> ExemptPaths {
        self.exempt_paths.iter().cloned().collect()
    }
}

/// Request paths that bypass authentication entirely (exact match)
///
/// Immutable after construction; clones share the same set.
#[derive(Debug, Clone)]
pub struct ExemptPaths(Arc<HashSet<String>>);

impl ExemptPaths {
    /// No exempt paths: every request is authenticated
    pub fn none() -> Self {
        Self(Arc::new(HashSet::new()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ExemptPaths {
    fn default() -> Self {
        std::iter::once(DEFAULT_EXEMPT_PATH).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ExemptPaths {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<MiddlewareConfig, envy::Error> {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, MiddlewareConfig::default());
        assert_eq!(config.exempt_paths, vec!["/healthz".to_string()]);
        assert!(config.token_audiences.is_none());
        assert!(config.authorize);
    }

    #[test]
    fn test_from_vars() {
        let config = load(&[
            ("TOKEN_REVIEW_EXEMPT_PATHS", "/healthz,/readyz"),
            ("TOKEN_REVIEW_TOKEN_AUDIENCES", "broker,api"),
            ("TOKEN_REVIEW_AUTHORIZE", "false"),
        ])
        .unwrap();

        assert_eq!(config.exempt_paths, vec!["/healthz", "/readyz"]);
        assert_eq!(
            config.token_audiences,
            Some(vec!["broker".to_string(), "api".to_string()])
        );
        assert!(!config.authorize);
    }

    #[test]
    fn test_invalid_bool_is_error() {
        assert!(load(&[("TOKEN_REVIEW_AUTHORIZE", "sometimes")]).is_err());
    }

    #[test]
    fn test_exempt_paths_exact_match() {
        let paths: ExemptPaths = ["/healthz", "/metrics"].into_iter().collect();
        assert!(paths.contains("/healthz"));
        assert!(paths.contains("/metrics"));
        assert!(!paths.contains("/healthz/"));
        assert!(!paths.contains("/health"));
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_exempt_paths_default_and_none() {
        assert!(ExemptPaths::default().contains("/healthz"));
        assert!(ExemptPaths::none().is_empty());
        let configured = MiddlewareConfig::default().exempt_paths();
        assert!(configured.contains("/healthz"));
    }
}
