use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistSignup {
    pub id: Uuid,
    /// Normalized (trimmed, lowercase); unique.
    pub email: String,
    pub source: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignup {
    pub email: String,
    pub source: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl NewSignup {
    pub fn into_signup(self) -> WaitlistSignup {
        WaitlistSignup {
            id: Uuid::new_v4(),
            email: self.email,
            source: self.source,
            user_agent: self.user_agent,
            created_at: now(),
        }
    }
}
