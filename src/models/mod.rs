mod account;
mod endpoint;
mod module;
mod project;
mod status;
mod task;
mod waitlist;

pub use account::{Account, PlanTier, DEFAULT_FREE_MAX_PROJECTS};
pub use endpoint::{Endpoint, EndpointPatch, HttpMethod, NewEndpoint};
pub use module::{Module, ModulePatch, NewModule};
pub use project::{NewProject, Project, ProjectPatch, ProjectStatus, Requirements};
pub use status::WorkStatus;
pub use task::{next_code, next_position, NewTask, Task, TaskPatch};
pub use waitlist::{NewSignup, WaitlistSignup};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer};

/// Current time at the microsecond precision the database keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Lets a patch tell "leave unchanged" (field absent) from "clear" (`null`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
