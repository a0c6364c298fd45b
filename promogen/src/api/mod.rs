//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Projects** (`/api/project/*`): Creating projects, generating videos, the community feed
//! - **Users** (`/api/user/*`): Balance, the caller's projects, the publish toggle
//! - **Identity webhooks** (`/api/clerk`): Signed user and payment events
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`; the document is served
//! at `/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
