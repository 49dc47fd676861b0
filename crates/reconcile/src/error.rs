//! Error taxonomy for reconciliation
//!
//! Every failure carries a [`ErrorKind`] so drivers can tell apart
//! conditions that need operator consent, transient provider faults worth a
//! retry, and fatal configuration or programming errors without matching on
//! message text.

use lockkit::RetryDecision;
use std::fmt;
use thiserror::Error;

/// Operator consent a handler may require before proceeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentFlag {
    AllowRecreate,
    AllowReboot,
}

impl fmt::Display for ConsentFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowRecreate => f.write_str("--allow-recreate"),
            Self::AllowReboot => f.write_str("--allow-reboot"),
        }
    }
}

/// Categories of reconciliation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or incomplete definition, detected before any remote call
    Configuration,
    /// No handler combination covers the changed keys
    Coverage,
    /// An immutable property changed; needs explicit consent
    ConsentRequired,
    /// Provider fault expected to go away on its own
    Transient,
    /// Provider fault that will not go away by retrying
    Permanent,
    /// State store, locking or handler registry failure
    Internal,
}

impl ErrorKind {
    /// Whether this kind is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get actionable advice for resolving this kind of error
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the resource definition and try again",
            Self::Coverage => "The resource type cannot realize this change; this is a bug in its handlers",
            Self::ConsentRequired => "Re-run with the named flag if the disruption is acceptable",
            Self::Transient => "Try again later",
            Self::Permanent => "Check the provider error and the resource definition",
            Self::Internal => "Check the state file and its lock",
        }
    }
}

/// Errors that can occur while reconciling a resource
#[derive(Debug, Error)]
pub enum Error {
    /// Missing required option or invalid combination
    #[error("{resource}: invalid configuration: {message}")]
    Config { resource: String, message: String },

    /// A definition refers to a resource that is not declared
    #[error("{resource}: reference to unknown resource '{target}'")]
    DanglingReference { resource: String, target: String },

    /// Changed keys that no registered handler owns
    #[error(
        "resource type '{resource_type}' has no handler for changed keys: {}",
        keys.join(", ")
    )]
    Coverage {
        resource_type: String,
        keys: Vec<String>,
    },

    /// Proceeding would destroy or reboot the resource
    #[error("{resource}: {reason}; re-run with {flag} to proceed")]
    ConsentRequired {
        resource: String,
        reason: String,
        flag: ConsentFlag,
    },

    /// Provider fault expected to clear up
    #[error("{resource}: transient provider error: {message}")]
    Transient {
        resource: String,
        message: String,
        /// The provider throttled the request
        rate_limited: bool,
    },

    /// Provider fault that retrying will not fix
    #[error("{resource}: provider error: {message}")]
    Provider { resource: String, message: String },

    /// The persisted status is not a known ordinal
    #[error("{resource}: stored status {value} is not a lifecycle status")]
    CorruptStatus { resource: String, value: String },

    /// Handlers whose "after" declarations form a cycle
    #[error("handler dependency cycle: {}", path.join(" -> "))]
    HandlerCycle { path: Vec<String> },

    /// A handler runs after a handler that was never registered
    #[error("handler '{handler}' runs after unknown handler '{dependency}'")]
    UnknownHandler { handler: String, dependency: String },

    /// Two handlers share an id
    #[error("handler '{0}' registered twice")]
    DuplicateHandler(String),

    /// State store error
    #[error("state store error: {0}")]
    Store(#[from] attrstore::Error),

    /// Locking or polling error
    #[error("{0}")]
    Lock(#[from] lockkit::Error),

    /// Worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),

    /// A confirmation prompt could not be shown or answered
    #[error("confirmation prompt failed: {0}")]
    Prompt(String),
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::DanglingReference { .. } => ErrorKind::Configuration,
            Self::Coverage { .. } => ErrorKind::Coverage,
            Self::ConsentRequired { .. } => ErrorKind::ConsentRequired,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Provider { .. } => ErrorKind::Permanent,
            Self::Lock(lockkit::Error::TimedOut { .. }) => ErrorKind::Transient,
            Self::CorruptStatus { .. }
            | Self::HandlerCycle { .. }
            | Self::UnknownHandler { .. }
            | Self::DuplicateHandler(_)
            | Self::Store(_)
            | Self::Lock(_)
            | Self::WorkerPool(_)
            | Self::Prompt(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classification used by [`lockkit::with_retry`]
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Transient {
                rate_limited: true,
                ..
            } => RetryDecision::RateLimited,
            e if e.is_retryable() => RetryDecision::Retry,
            _ => RetryDecision::Fail,
        }
    }

    pub fn config(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// An immutable property changed and recreating was not permitted
    pub fn recreate_required(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConsentRequired {
            resource: resource.into(),
            reason: reason.into(),
            flag: ConsentFlag::AllowRecreate,
        }
    }

    /// The change needs a reboot that was not permitted
    pub fn reboot_required(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConsentRequired {
            resource: resource.into(),
            reason: reason.into(),
            flag: ConsentFlag::AllowReboot,
        }
    }

    pub fn transient(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            resource: resource.into(),
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn rate_limited(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            resource: resource.into(),
            message: message.into(),
            rate_limited: true,
        }
    }

    pub fn provider(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::config("web", "no size").kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::recreate_required("web", "region changed").kind(),
            ErrorKind::ConsentRequired
        );
        assert_eq!(Error::provider("web", "denied").kind(), ErrorKind::Permanent);
        assert_eq!(
            Error::DuplicateHandler("create".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_retry_decisions() {
        assert_eq!(
            Error::transient("web", "timeout").retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(
            Error::rate_limited("web", "RequestLimitExceeded").retry_decision(),
            RetryDecision::RateLimited
        );
        assert_eq!(
            Error::provider("web", "InvalidParameter").retry_decision(),
            RetryDecision::Fail
        );
        assert_eq!(
            Error::recreate_required("web", "zone changed").retry_decision(),
            RetryDecision::Fail
        );
    }

    #[test]
    fn test_consent_message_names_flag() {
        let err = Error::recreate_required("db", "the region changed");
        assert_eq!(
            err.to_string(),
            "db: the region changed; re-run with --allow-recreate to proceed"
        );
        assert!(Error::reboot_required("db", "x").to_string().contains("--allow-reboot"));
    }

    #[test]
    fn test_coverage_message_lists_keys() {
        let err = Error::Coverage {
            resource_type: "vm".into(),
            keys: vec!["weirdAttr".into(), "zone".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("weirdAttr"));
        assert!(msg.contains("zone"));
        assert!(msg.contains("vm"));
    }
}
