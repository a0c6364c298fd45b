//! Database record structures.

pub mod projects;
pub mod users;
