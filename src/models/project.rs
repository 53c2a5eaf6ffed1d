use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{double_option, now};
use crate::store::{Entity, Table};
use crate::validation::{require_non_empty, ValidationError};

/// Lifecycle of a generated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Generating,
    Ready,
    Deployed,
}

impl ProjectStatus {
    /// Position in the lifecycle, draft first.
    pub fn rank(self) -> u8 {
        match self {
            ProjectStatus::Draft => 0,
            ProjectStatus::Generating => 1,
            ProjectStatus::Ready => 2,
            ProjectStatus::Deployed => 3,
        }
    }

    /// The next stage, if any.
    pub fn successor(self) -> Option<ProjectStatus> {
        match self {
            ProjectStatus::Draft => Some(ProjectStatus::Generating),
            ProjectStatus::Generating => Some(ProjectStatus::Ready),
            ProjectStatus::Ready => Some(ProjectStatus::Deployed),
            ProjectStatus::Deployed => None,
        }
    }

    /// Forward one step, stay put, or fall back to draft.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        next == self || next == ProjectStatus::Draft || next.rank() == self.rank() + 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Deployed => "deployed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ProjectStatus::Draft),
            "generating" => Ok(ProjectStatus::Generating),
            "ready" => Ok(ProjectStatus::Ready),
            "deployed" => Ok(ProjectStatus::Deployed),
            _ => Err(format!(
                "Invalid project status '{}'. Valid options: draft, generating, ready, deployed",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    /// Short display identifier, e.g. `SHO-001`.
    pub code: String,
    pub backend: String,
    pub database: String,
    pub status: ProjectStatus,
    pub prompt: Option<String>,
    pub entities: Vec<String>,
    pub auth_method: Option<String>,
    pub multi_tenant: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_backend() -> String {
    "node".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub auth_method: Option<String>,
    #[serde(default)]
    pub multi_tenant: bool,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            backend: default_backend(),
            database: default_database(),
            prompt: None,
            entities: Vec::new(),
            auth_method: None,
            multi_tenant: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, backend: impl Into<String>, database: impl Into<String>) -> Self {
        self.backend = backend.into();
        self.database = database.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_method: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_tenant: Option<bool>,
}

impl ProjectPatch {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Requirement fields read out of a free-form prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements {
    pub entities: Vec<String>,
    pub auth_method: Option<String>,
    pub multi_tenant: bool,
}

const ENTITY_VERBS: [&str; 6] = ["manage", "manages", "managing", "track", "tracks", "tracking"];

const AUTH_KEYWORDS: [(&str, &str); 5] = [
    ("oauth", "oauth"),
    ("magic link", "magic_link"),
    ("api key", "api_key"),
    ("jwt", "jwt"),
    ("password", "email_password"),
];

impl Requirements {
    /// Reads entities from "manages X, Y and Z" style clauses, the auth
    /// method from known keywords, and multi-tenancy from tenant wording.
    pub fn from_prompt(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();

        let auth_method = AUTH_KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, method)| method.to_string());

        let multi_tenant = ["multi-tenant", "multi tenant", "tenants", "organizations"]
            .iter()
            .any(|k| lower.contains(k));

        let mut entities: Vec<String> = Vec::new();
        for clause in lower.split(['.', ';', '\n']) {
            let words: Vec<&str> = clause.split_whitespace().collect();
            let Some(start) = words.iter().position(|w| ENTITY_VERBS.contains(w)) else {
                continue;
            };
            let rest = words[start + 1..].join(" ");
            for part in rest.split(',').flat_map(|p| p.split(" and ")) {
                let name = part.trim().trim_start_matches("and ").trim();
                if name.is_empty() || name.contains(' ') {
                    continue;
                }
                let mut chars = name.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => continue,
                };
                if !entities.contains(&capitalized) {
                    entities.push(capitalized);
                }
            }
        }

        Self {
            entities,
            auth_method,
            multi_tenant,
        }
    }
}

/// One above the highest `XXX-nnn` sequence among `projects`.
fn next_sequence(projects: &[Project]) -> Result<u32, ValidationError> {
    projects
        .iter()
        .filter_map(|p| p.code.rsplit_once('-'))
        .filter_map(|(_, n)| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or(ValidationError::Exhausted("project code"))
}

/// `SHO-004` for a project named "Shop..." created as the account's fourth.
fn derive_code(name: &str, sequence: u32) -> String {
    let mut prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    while prefix.len() < 3 {
        prefix.push('X');
    }
    format!("{}-{:03}", prefix, sequence)
}

impl Entity for Project {
    type New = NewProject;
    type Patch = ProjectPatch;

    const TABLE: Table = Table::Projects;

    fn id(&self) -> Uuid {
        self.id
    }

    fn scope_id(&self) -> Uuid {
        self.account_id
    }

    fn cmp_order(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    fn create(scope: Uuid, new: NewProject, siblings: &[Self]) -> Result<Self, ValidationError> {
        require_non_empty(&new.name, "project name")?;

        let code = match new.code {
            Some(code) if !code.trim().is_empty() => code.trim().to_string(),
            _ => derive_code(&new.name, next_sequence(siblings)?),
        };

        let mut entities = new.entities;
        let mut auth_method = new.auth_method;
        let mut multi_tenant = new.multi_tenant;
        if let Some(prompt) = &new.prompt {
            let derived = Requirements::from_prompt(prompt);
            if entities.is_empty() {
                entities = derived.entities;
            }
            if auth_method.is_none() {
                auth_method = derived.auth_method;
            }
            multi_tenant |= derived.multi_tenant;
        }

        let now = now();
        Ok(Self {
            id: Uuid::new_v4(),
            account_id: scope,
            name: new.name.trim().to_string(),
            code,
            backend: new.backend,
            database: new.database,
            status: ProjectStatus::Draft,
            prompt: new.prompt,
            entities,
            auth_method,
            multi_tenant,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_patch(&self, patch: &ProjectPatch, _siblings: &[Self]) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            require_non_empty(name, "project name")?;
        }
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(ValidationError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
        }
        Ok(())
    }

    fn apply_patch(&mut self, patch: &ProjectPatch) {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(backend) = &patch.backend {
            self.backend = backend.clone();
        }
        if let Some(database) = &patch.database {
            self.database = database.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(prompt) = &patch.prompt {
            self.prompt = prompt.clone();
        }
        if let Some(entities) = &patch.entities {
            self.entities = entities.clone();
        }
        if let Some(auth_method) = &patch.auth_method {
            self.auth_method = auth_method.clone();
        }
        if let Some(multi_tenant) = patch.multi_tenant {
            self.multi_tenant = multi_tenant;
        }
        self.updated_at = now();
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("{} ({})", self.name, self.code);
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Stack: {} + {}", self.backend, self.database)?;
        if let Some(auth) = &self.auth_method {
            writeln!(f, "Auth: {}", auth)?;
        }
        writeln!(f, "Multi-tenant: {}", if self.multi_tenant { "yes" } else { "no" })?;
        if !self.entities.is_empty() {
            writeln!(f, "Entities: {}", self.entities.join(", "))?;
        }
        if let Some(prompt) = &self.prompt {
            writeln!(f, "\nPrompt:\n{}", prompt)?;
        }
        Ok(())
    }
}
