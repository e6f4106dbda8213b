//! Maps provider errors onto the four outcomes the retry loop understands.
//!
//! Classification is driven by a static rule table. A rule matches on the
//! provider's error code, a message marker, or both. Host capacity
//! exhaustion arrives as a generic `InternalError`, so the capacity and
//! throttling rules also match on message text alone.

use std::fmt;

use crate::cloud::ProviderError;

/// Classified reason a launch attempt did not produce an instance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttemptFailure {
    /// No hardware capacity for this shape; try the next profile.
    CapacityUnavailable,
    /// Too many requests; cool down before the next attempt.
    RateLimited,
    /// The account limit for this shape is exhausted; skip it for this pass.
    QuotaExceeded,
    /// Anything else, including connectivity failures.
    Transient,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CapacityUnavailable => "no capacity",
            Self::RateLimited => "rate limited",
            Self::QuotaExceeded => "limit exceeded",
            Self::Transient => "transient error",
        };
        f.write_str(label)
    }
}

struct ErrorRule {
    code: Option<&'static str>,
    message_marker: Option<&'static str>,
    kind: AttemptFailure,
}

const TOO_MANY_REQUESTS_STATUS: u16 = 429;

const ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        code: Some("OutOfHostCapacity"),
        message_marker: None,
        kind: AttemptFailure::CapacityUnavailable,
    },
    ErrorRule {
        code: Some("TooManyRequests"),
        message_marker: None,
        kind: AttemptFailure::RateLimited,
    },
    ErrorRule {
        code: Some("LimitExceeded"),
        message_marker: None,
        kind: AttemptFailure::QuotaExceeded,
    },
    ErrorRule {
        code: Some("QuotaExceeded"),
        message_marker: None,
        kind: AttemptFailure::QuotaExceeded,
    },
    ErrorRule {
        code: None,
        message_marker: Some("out of host capacity"),
        kind: AttemptFailure::CapacityUnavailable,
    },
    ErrorRule {
        code: None,
        message_marker: Some("too many"),
        kind: AttemptFailure::RateLimited,
    },
];

impl ErrorRule {
    fn matches(&self, code: &str, message: &str) -> bool {
        if self
            .code
            .is_some_and(|expected| !expected.eq_ignore_ascii_case(code))
        {
            return false;
        }
        self.message_marker
            .is_none_or(|marker| message.to_ascii_lowercase().contains(marker))
    }
}

/// Classifies a provider error. Unknown errors are treated as transient so
/// the retry loop keeps running.
#[must_use]
pub fn classify(error: &ProviderError) -> AttemptFailure {
    let ProviderError::Service {
        code,
        message,
        status,
    } = error
    else {
        return AttemptFailure::Transient;
    };

    ERROR_RULES
        .iter()
        .find(|rule| rule.matches(code, message))
        .map(|rule| rule.kind)
        .unwrap_or_else(|| {
            if *status == Some(TOO_MANY_REQUESTS_STATUS) {
                AttemptFailure::RateLimited
            } else {
                AttemptFailure::Transient
            }
        })
}
