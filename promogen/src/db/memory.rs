//! In-process [`Datastore`] for local development and tests.
//!
//! Mirrors the PostgreSQL constraints that the service relies on: the non-negative balance,
//! the owner foreign key with cascading delete, and the conditional video claim. Each
//! conditional update holds the entry's shard lock for the check and the write.

use crate::{
    db::{
        errors::{DbError, Result},
        models::{
            projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectFilter, ProjectUpdateDBRequest},
            users::{UserCreateDBRequest, UserDBResponse},
        },
        store::Datastore,
    },
    types::{ProjectId, UserId},
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryDatastore {
    users: DashMap<UserId, UserDBResponse>,
    projects: DashMap<ProjectId, ProjectDBResponse>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        if request.credits < 0 {
            return Err(DbError::CheckViolation {
                constraint: Some("users_credits_check".to_string()),
                table: Some("users".to_string()),
                message: "credits must be non-negative".to_string(),
            });
        }

        let now = Utc::now();
        let user = self.users.entry(request.id.clone()).or_insert_with(|| UserDBResponse {
            id: request.id.clone(),
            email: request.email.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            credits: request.credits,
            created_at: now,
            updated_at: now,
        });
        Ok(user.value().clone())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.users.get(id).map(|user| user.value().clone()))
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        let existed = self.users.remove(id).is_some();
        if existed {
            self.projects.retain(|_, project| project.user_id != *id);
        }
        Ok(existed)
    }

    async fn debit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(None);
        };
        if user.credits < amount {
            return Ok(None);
        }
        user.credits -= amount;
        user.updated_at = Utc::now();
        Ok(Some(user.credits))
    }

    async fn credit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(None);
        };
        if user.credits + amount < 0 {
            return Err(DbError::CheckViolation {
                constraint: Some("users_credits_check".to_string()),
                table: Some("users".to_string()),
                message: "credits must be non-negative".to_string(),
            });
        }
        user.credits += amount;
        user.updated_at = Utc::now();
        Ok(Some(user.credits))
    }

    async fn create_project(&self, request: &ProjectCreateDBRequest) -> Result<ProjectDBResponse> {
        if !self.users.contains_key(&request.user_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("projects_user_id_fkey".to_string()),
                table: Some("projects".to_string()),
                message: format!("user {} does not exist", request.user_id),
            });
        }
        if self.projects.contains_key(&request.id) {
            return Err(DbError::UniqueViolation {
                constraint: Some("projects_pkey".to_string()),
                table: Some("projects".to_string()),
                message: format!("project {} already exists", request.id),
            });
        }

        let now = Utc::now();
        let project = ProjectDBResponse {
            id: request.id,
            user_id: request.user_id.clone(),
            name: request.name.clone(),
            product_name: request.product_name.clone(),
            product_description: request.product_description.clone(),
            user_prompt: request.user_prompt.clone(),
            aspect_ratio: request.aspect_ratio,
            target_length: request.target_length,
            uploaded_images: request.uploaded_images.clone(),
            generated_image: None,
            generated_video: None,
            is_generating: request.is_generating,
            is_published: false,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>> {
        Ok(self.projects.get(&id).map(|project| project.value().clone()))
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectDBResponse>> {
        let mut projects: Vec<_> = self
            .projects
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse> {
        let mut project = self.projects.get_mut(&id).ok_or(DbError::NotFound)?;
        project.apply(request, Utc::now());
        Ok(project.value().clone())
    }

    async fn claim_for_video(&self, id: ProjectId, user_id: &UserId) -> Result<Option<ProjectDBResponse>> {
        let Some(mut project) = self.projects.get_mut(&id) else {
            return Ok(None);
        };
        let claimable = project.user_id == *user_id
            && !project.is_generating
            && project.generated_video.is_none()
            && project.generated_image.is_some();
        if !claimable {
            return Ok(None);
        }

        project.is_generating = true;
        project.error = None;
        project.updated_at = Utc::now();
        Ok(Some(project.value().clone()))
    }

    async fn delete_project(&self, id: ProjectId) -> Result<bool> {
        Ok(self.projects.remove(&id).is_some())
    }
}
