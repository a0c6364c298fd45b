//! Repository implementations for database access.
//!
//! - [`Users`]: identity rows and the credit balance
//! - [`Projects`]: generation projects, implements [`Repository`]

pub mod projects;
pub mod repository;
pub mod users;

pub use projects::Projects;
pub use repository::Repository;
pub use users::Users;
