//! Authorization decision
//!
//! A closed set of outcomes an access review can produce. Variants are
//! declared in precedence order so the derived `Ord` doubles as the
//! conflict-resolution rule: `Denied` beats `Allowed` beats `NoOpinion`.

use std::fmt;

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Decision {
    /// The reviewer expressed no opinion
    #[default]
    NoOpinion,
    /// The reviewer allowed the request
    Allowed,
    /// The reviewer denied the request
    Denied,
}

impl Decision {
    /// Reduce a reviewer's raw `allowed` / `denied` flags to a decision.
    ///
    /// Both flags set resolves to `Denied`; callers that need to surface the
    /// inconsistency should check [`Decision::is_conflicting`] first.
    pub fn from_flags(allowed: bool, denied: bool) -> Self {
        let allowed = if allowed {
            Decision::Allowed
        } else {
            Decision::NoOpinion
        };
        let denied = if denied {
            Decision::Denied
        } else {
            Decision::NoOpinion
        };
        allowed.combine(denied)
    }

    /// A verdict that both allows and denies is ambiguous
    pub fn is_conflicting(allowed: bool, denied: bool) -> bool {
        allowed && denied
    }

    /// Combine two decisions, keeping the one with higher precedence
    pub fn combine(self, other: Decision) -> Decision {
        self.max(other)
    }

    /// Only an explicit allow lets a request through
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NoOpinion => "no-opinion",
            Decision::Allowed => "allowed",
            Decision::Denied => "denied",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
