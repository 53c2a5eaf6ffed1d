use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::now;

/// Project quota of the free plan unless configured otherwise.
pub const DEFAULT_FREE_MAX_PROJECTS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Project quota for the tier. Free accounts use the configured limit.
    pub fn quota(self, free_max_projects: i64) -> i64 {
        match self {
            PlanTier::Free => free_max_projects,
            PlanTier::Pro => 25,
            PlanTier::Enterprise => 1000,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTier::Free => write!(f, "free"),
            PlanTier::Pro => write!(f, "pro"),
            PlanTier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(format!(
                "Invalid plan '{}'. Valid options: free, pro, enterprise",
                s
            )),
        }
    }
}

/// Billing and ownership entity for one authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: String,
    pub plan: PlanTier,
    pub max_projects: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>, free_max_projects: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            plan: PlanTier::Free,
            max_projects: free_max_projects,
            created_at: now(),
        }
    }

    /// True when a free-tier account already owns its quota of projects.
    pub fn at_quota(&self, owned: usize) -> bool {
        self.plan == PlanTier::Free && owned as i64 >= self.max_projects
    }
}
