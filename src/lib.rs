//! `rollcalld` library crate.
//!
//! School attendance, points and violation tracking behind a JSON-lines
//! sidecar. The binary entrypoint lives in `main.rs`; modules are exported
//! here for integration tests.

pub mod attendance;
pub mod codes;
pub mod config;
pub mod db;
pub mod ipc;
pub mod model;
pub mod points;
pub mod reports;
pub mod scan;
pub mod store;
pub mod violations;
