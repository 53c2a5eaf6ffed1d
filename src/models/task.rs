use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::{double_option, now, WorkStatus};
use crate::store::{Entity, Table};
use crate::validation::{require_non_empty, ValidationError};

/// A card on the project board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Human-readable code, e.g. `T-007`.
    pub code: String,
    pub title: String,
    /// Name of the owning module.
    pub module: String,
    pub status: WorkStatus,
    pub agent: Option<String>,
    /// Position among tasks with the same status.
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub module: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: WorkStatus,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            module: module.into(),
            code: None,
            status: WorkStatus::Todo,
            agent: None,
            position: None,
        }
    }

    pub fn with_status(mut self, status: WorkStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Next free position at the end of the `status` column.
pub fn next_position(tasks: &[Task], status: WorkStatus) -> Result<i64, ValidationError> {
    match tasks
        .iter()
        .filter(|t| t.status == status)
        .map(|t| t.position)
        .max()
    {
        Some(max) => max
            .checked_add(1)
            .ok_or(ValidationError::Exhausted("board position")),
        None => Ok(0),
    }
}

/// Next `T-nnn` code, one above the highest numeric code in use.
pub fn next_code(tasks: &[Task]) -> Result<String, ValidationError> {
    let highest = tasks
        .iter()
        .filter_map(|t| t.code.strip_prefix("T-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let next = highest
        .checked_add(1)
        .ok_or(ValidationError::Exhausted("task code"))?;
    Ok(format!("T-{:03}", next))
}

impl Entity for Task {
    type New = NewTask;
    type Patch = TaskPatch;

    const TABLE: Table = Table::Tasks;

    fn id(&self) -> Uuid {
        self.id
    }

    fn scope_id(&self) -> Uuid {
        self.project_id
    }

    fn cmp_order(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }

    fn create(scope: Uuid, new: NewTask, siblings: &[Self]) -> Result<Self, ValidationError> {
        require_non_empty(&new.title, "task title")?;
        require_non_empty(&new.module, "module")?;

        let code = match new.code {
            Some(code) if !code.trim().is_empty() => code.trim().to_string(),
            _ => next_code(siblings)?,
        };
        let position = match new.position {
            Some(position) => position,
            None => next_position(siblings, new.status)?,
        };

        let now = now();
        Ok(Self {
            id: Uuid::new_v4(),
            project_id: scope,
            code,
            title: new.title.trim().to_string(),
            module: new.module.trim().to_string(),
            status: new.status,
            agent: new.agent,
            position,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_patch(&self, patch: &TaskPatch, _siblings: &[Self]) -> Result<(), ValidationError> {
        if let Some(title) = &patch.title {
            require_non_empty(title, "task title")?;
        }
        if let Some(module) = &patch.module {
            require_non_empty(module, "module")?;
        }
        Ok(())
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(module) = &patch.module {
            self.module = module.trim().to_string();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(agent) = &patch.agent {
            self.agent = agent.clone();
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        self.updated_at = now();
    }
}
