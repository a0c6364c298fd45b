//! API request and response data models.
//!
//! API models are distinct from database models so the wire format (camelCase, as the web
//! client expects) can evolve independently of storage.
//!
//! - [`projects`]: Project representation and generation requests/responses
//! - [`users`]: The authenticated caller and balance responses

pub mod projects;
pub mod users;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
