//! Backforge: synced projects, modules, endpoints and tasks for a backend
//! generation dashboard, plus the waitlist and the agent pipeline demo.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod server;
pub mod store;
pub mod sync;
pub mod validation;
pub mod waitlist;
