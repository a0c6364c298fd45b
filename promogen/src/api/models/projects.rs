//! API request/response models for projects.

use crate::db::models::projects::ProjectDBResponse;
use crate::types::{AspectRatio, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub product_name: String,
    pub product_description: String,
    pub user_prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Requested video length in seconds
    pub target_length: i32,
    /// Source photo URLs: product, then model
    pub uploaded_images: Vec<String>,
    pub generated_image: Option<String>,
    pub generated_video: Option<String>,
    pub is_generating: bool,
    pub is_published: bool,
    /// Message of the last failed generation
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectDBResponse> for ProjectResponse {
    fn from(db: ProjectDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            product_name: db.product_name,
            product_description: db.product_description,
            user_prompt: db.user_prompt,
            aspect_ratio: db.aspect_ratio,
            target_length: db.target_length,
            uploaded_images: db.uploaded_images,
            generated_image: db.generated_image,
            generated_video: db.generated_video,
            is_generating: db.is_generating,
            is_published: db.is_published,
            error: db.error,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectResponse {
    #[schema(value_type = String, format = "uuid")]
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoRequest {
    /// Checked by the handler so a missing or malformed id is reported like any other bad request
    #[serde(default)]
    #[schema(format = "uuid")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    pub video_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
}

impl FromIterator<ProjectDBResponse> for ProjectListResponse {
    fn from_iter<I: IntoIterator<Item = ProjectDBResponse>>(iter: I) -> Self {
        Self {
            projects: iter.into_iter().map(ProjectResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SingleProjectResponse {
    pub project: ProjectResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublishResponse {
    pub published: bool,
}
