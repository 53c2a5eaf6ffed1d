use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::{now, WorkStatus};
use crate::store::{Entity, Table};
use crate::validation::{require_non_empty, ValidationError};

/// A named subsystem of a project, e.g. "Users" or "Orders".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub status: WorkStatus,
    /// Names of sibling modules this one builds on.
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewModule {
    pub name: String,
    #[serde(default)]
    pub status: WorkStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl NewModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: WorkStatus::Todo,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

impl Module {
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    /// Points a dependency on `from` at `to` instead.
    pub fn rename_dependency(&mut self, from: &str, to: &str) {
        for dependency in self.dependencies.iter_mut().filter(|d| d.as_str() == from) {
            *dependency = to.to_string();
        }
        self.updated_at = now();
    }
}

fn check_dependencies(
    own_name: &str,
    dependencies: &[String],
    others: &[&Module],
) -> Result<(), ValidationError> {
    for dependency in dependencies {
        if dependency == own_name {
            return Err(ValidationError::SelfDependency(own_name.to_string()));
        }
        if !others.iter().any(|m| &m.name == dependency) {
            return Err(ValidationError::UnknownModule(dependency.clone()));
        }
    }
    Ok(())
}

impl Entity for Module {
    type New = NewModule;
    type Patch = ModulePatch;

    const TABLE: Table = Table::Modules;

    fn id(&self) -> Uuid {
        self.id
    }

    fn scope_id(&self) -> Uuid {
        self.project_id
    }

    fn cmp_order(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    fn create(scope: Uuid, new: NewModule, siblings: &[Self]) -> Result<Self, ValidationError> {
        let name = new.name.trim().to_string();
        require_non_empty(&name, "module name")?;
        if siblings.iter().any(|m| m.name == name) {
            return Err(ValidationError::DuplicateModule(name));
        }
        let others: Vec<&Module> = siblings.iter().collect();
        check_dependencies(&name, &new.dependencies, &others)?;

        let now = now();
        Ok(Self {
            id: Uuid::new_v4(),
            project_id: scope,
            name,
            status: new.status,
            dependencies: new.dependencies,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_patch(&self, patch: &ModulePatch, siblings: &[Self]) -> Result<(), ValidationError> {
        let others: Vec<&Module> = siblings.iter().filter(|m| m.id != self.id).collect();

        let name = match &patch.name {
            Some(name) => {
                let name = name.trim();
                require_non_empty(name, "module name")?;
                if name != self.name && others.iter().any(|m| m.name == name) {
                    return Err(ValidationError::DuplicateModule(name.to_string()));
                }
                name
            }
            None => self.name.as_str(),
        };

        let dependencies = patch.dependencies.as_ref().unwrap_or(&self.dependencies);
        check_dependencies(name, dependencies, &others)
    }

    fn apply_patch(&mut self, patch: &ModulePatch) {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(dependencies) = &patch.dependencies {
            self.dependencies = dependencies.clone();
        }
        self.updated_at = now();
    }
}
