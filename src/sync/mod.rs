//! Client-side mirrors of remote tables.
//!
//! [`SyncCache`] does the fetch, subscribe and re-fetch work for any
//! [`Entity`](crate::store::Entity). The per-table wrappers add the rules
//! that need more context than a single row:
//!
//! - [`ProjectsSync`]: account context and plan quota
//! - [`ModulesSync`]: unique names and dependency checks
//! - [`EndpointsSync`]: the referenced module must exist
//! - [`TasksSync`]: derived codes, board moves and grouping

pub mod cache;
mod endpoints;
mod modules;
mod notice;
mod projects;
mod tasks;

pub use cache::SyncCache;
pub use endpoints::EndpointsSync;
pub use modules::ModulesSync;
pub use notice::{Notice, NoticeLevel, NoticeSink};
pub use projects::ProjectsSync;
pub use tasks::{group_by_status, TasksSync};
