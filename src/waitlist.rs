//! Waitlist signup: one validated, idempotent write per email.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{NewSignup, WaitlistSignup};
use crate::store::{StoreError, WaitlistStore};
use crate::validation::{validate_email, ValidationError};

pub const DEFAULT_SOURCE: &str = "landing";

#[derive(Debug, Clone, PartialEq)]
pub enum SignupOutcome {
    Joined(WaitlistSignup),
    /// The email was already on the list. Reported as success.
    AlreadyJoined,
}

/// Wire form of a [`SignupOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStatus {
    Joined,
    AlreadyJoined,
}

impl SignupOutcome {
    pub fn status(&self) -> SignupStatus {
        match self {
            SignupOutcome::Joined(_) => SignupStatus::Joined,
            SignupOutcome::AlreadyJoined => SignupStatus::AlreadyJoined,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SignupOutcome::Joined(_) => "You're on the waitlist!",
            SignupOutcome::AlreadyJoined => "You're already on the waitlist.",
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Could not join the waitlist: {0}")]
    Store(#[from] StoreError),
}

/// Normalizes and validates `email`, then records the signup. An invalid
/// email never reaches the store.
pub async fn join_waitlist(
    store: &dyn WaitlistStore,
    email: &str,
    source: Option<&str>,
    user_agent: Option<String>,
) -> Result<SignupOutcome, WaitlistError> {
    let email = validate_email(email)?;
    let source = source
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SOURCE)
        .to_string();

    let signup = NewSignup {
        email,
        source,
        user_agent,
    };

    match store.insert_signup(signup).await {
        Ok(signup) => {
            tracing::info!("Waitlist signup from {}", signup.source);
            Ok(SignupOutcome::Joined(signup))
        }
        Err(StoreError::UniqueViolation(_)) => Ok(SignupOutcome::AlreadyJoined),
        Err(e) => Err(e.into()),
    }
}
