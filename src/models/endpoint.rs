use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::now;
use crate::store::{Entity, Table};
use crate::validation::{require_non_empty, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!(
                "Invalid HTTP method '{}'. Valid options: GET, POST, PUT, PATCH, DELETE",
                s
            )),
        }
    }
}

/// A planned API route. `module` names the owning module; it is a lookup
/// key, not a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub project_id: Uuid,
    pub module: String,
    pub method: HttpMethod,
    pub path: String,
    pub description: String,
    pub auth_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_auth_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub module: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
}

impl NewEndpoint {
    pub fn new(module: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            method,
            path: path.into(),
            description: String::new(),
            auth_required: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,
}

fn check_path(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') && !path.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPath(path.to_string()))
    }
}

impl Entity for Endpoint {
    type New = NewEndpoint;
    type Patch = EndpointPatch;

    const TABLE: Table = Table::Endpoints;

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

    fn create(scope: Uuid, new: NewEndpoint, _siblings: &[Self]) -> Result<Self, ValidationError> {
        require_non_empty(&new.module, "module")?;
        check_path(&new.path)?;

        let now = now();
        Ok(Self {
            id: Uuid::new_v4(),
            project_id: scope,
            module: new.module.trim().to_string(),
            method: new.method,
            path: new.path,
            description: new.description,
            auth_required: new.auth_required,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_patch(&self, patch: &EndpointPatch, _siblings: &[Self]) -> Result<(), ValidationError> {
        if let Some(module) = &patch.module {
            require_non_empty(module, "module")?;
        }
        if let Some(path) = &patch.path {
            check_path(path)?;
        }
        Ok(())
    }

    fn apply_patch(&mut self, patch: &EndpointPatch) {
        if let Some(module) = &patch.module {
            self.module = module.trim().to_string();
        }
        if let Some(method) = patch.method {
            self.method = method;
        }
        if let Some(path) = &patch.path {
            self.path = path.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(auth_required) = patch.auth_required {
            self.auth_required = auth_required;
        }
        self.updated_at = now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_absolute_path() {
        let scope = Uuid::new_v4();
        let err = Endpoint::create(
            scope,
            NewEndpoint::new("Users", HttpMethod::Get, "users"),
            &[],
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidPath("users".into()));

        let endpoint = Endpoint::create(
            scope,
            NewEndpoint::new("Users", HttpMethod::Get, "/users/{id}"),
            &[],
        )
        .unwrap();
        assert!(endpoint.auth_required);
    }

    #[test]
    fn test_method_wire_format() {
        assert_eq!(serde_json::to_string(&HttpMethod::Patch).unwrap(), "\"PATCH\"");
        assert_eq!(HttpMethod::from_str("delete").unwrap(), HttpMethod::Delete);
    }
}
