//! Write-time validation shared by the sync caches and the stores.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{PlanTier, ProjectStatus};

/// Rejected input. Raised before any remote write is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("module '{0}' does not exist in this project")]
    UnknownModule(String),
    #[error("module '{0}' cannot depend on itself")]
    SelfDependency(String),
    #[error("a module named '{0}' already exists in this project")]
    DuplicateModule(String),
    #[error("no {0} left in this project")]
    Exhausted(&'static str),
    #[error("endpoint path must start with '/': {0}")]
    InvalidPath(String),
    #[error("cannot move project from {from} to {to}")]
    InvalidTransition {
        from: ProjectStatus,
        to: ProjectStatus,
    },
    #[error("no {0} selected")]
    MissingContext(&'static str),
    #[error("project limit reached ({max} projects on the {plan} plan)")]
    QuotaReached { max: i64, plan: PlanTier },
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

/// Trims and lowercases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalizes `email` and checks it looks like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let normalized = normalize_email(email);
    if email_pattern().is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidEmail(email.trim().to_string()))
    }
}

pub(crate) fn require_non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_normalizes() {
        assert_eq!(
            validate_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
    }

    #[test]
    fn test_validate_email_rejects_malformed() {
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("ada@@example.com").is_err());
        assert!(validate_email("a da@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("  ", "name").is_err());
        assert!(require_non_empty("x", "name").is_ok());
    }
}
