//! Database models for projects.

use crate::types::{AspectRatio, ProjectId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new project
///
/// The id is chosen by the caller so source uploads can be keyed under it before the row exists.
#[derive(Debug, Clone)]
pub struct ProjectCreateDBRequest {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub product_name: String,
    pub product_description: String,
    pub user_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub target_length: i32,
    pub uploaded_images: Vec<String>,
    pub is_generating: bool,
}

/// Database request for updating a project. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdateDBRequest {
    pub generated_image: Option<String>,
    pub generated_video: Option<String>,
    pub is_generating: Option<bool>,
    pub is_published: Option<bool>,
    /// `Some(None)` clears a previously recorded error
    pub error: Option<Option<String>>,
}

impl ProjectUpdateDBRequest {
    /// Generation finished: record the failure and release the in-flight flag
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_generating: Some(false),
            error: Some(Some(message.into())),
            ..Default::default()
        }
    }
}

/// Database response for a project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDBResponse {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub product_name: String,
    pub product_description: String,
    pub user_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub target_length: i32,
    pub uploaded_images: Vec<String>,
    pub generated_image: Option<String>,
    pub generated_video: Option<String>,
    pub is_generating: bool,
    pub is_published: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectDBResponse {
    /// Whether there is anything worth showing in the community feed
    pub fn has_asset(&self) -> bool {
        self.generated_image.is_some() || self.generated_video.is_some()
    }

    /// Apply an update in place, as the `UPDATE ... COALESCE` query does
    pub fn apply(&mut self, update: &ProjectUpdateDBRequest, now: DateTime<Utc>) {
        if let Some(image) = &update.generated_image {
            self.generated_image = Some(image.clone());
        }
        if let Some(video) = &update.generated_video {
            self.generated_video = Some(video.clone());
        }
        if let Some(generating) = update.is_generating {
            self.is_generating = generating;
        }
        if let Some(published) = update.is_published {
            self.is_published = published;
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }
        self.updated_at = now;
    }
}

/// Filter for listing projects. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub owner: Option<UserId>,
    pub published: Option<bool>,
}

impl ProjectFilter {
    pub fn owned_by(user_id: impl Into<UserId>) -> Self {
        Self {
            owner: Some(user_id.into()),
            published: None,
        }
    }

    pub fn published() -> Self {
        Self {
            owner: None,
            published: Some(true),
        }
    }

    pub fn matches(&self, project: &ProjectDBResponse) -> bool {
        self.owner.as_ref().is_none_or(|owner| *owner == project.user_id)
            && self.published.is_none_or(|published| published == project.is_published)
    }
}
