//! HTTP request handlers for all API endpoints.
//!
//! - [`projects`]: Project creation, video generation, deletion and the community feed
//! - [`users`]: The caller's balance and projects, and the publish toggle
//! - [`webhooks`]: Signed identity provider events
//!
//! Protected handlers take a [`CurrentUser`](crate::api::models::users::CurrentUser), which
//! rejects requests without a valid bearer token before the handler runs.

pub mod projects;
pub mod users;
pub mod webhooks;

use crate::{
    errors::{Error, Result},
    types::ProjectId,
};

/// Parse a project id from a path segment
pub(crate) fn parse_project_id(raw: &str) -> Result<ProjectId> {
    raw.parse().map_err(|_| Error::BadRequest {
        message: "Invalid Project ID".to_string(),
    })
}
