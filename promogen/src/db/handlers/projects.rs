//! Database repository for projects.

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectFilter, ProjectUpdateDBRequest},
    },
    types::{AspectRatio, ProjectId, UserId, abbrev_uuid},
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub product_name: String,
    pub product_description: String,
    pub user_prompt: String,
    pub aspect_ratio: String,
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

impl TryFrom<Project> for ProjectDBResponse {
    type Error = DbError;

    fn try_from(project: Project) -> Result<Self> {
        let aspect_ratio = project
            .aspect_ratio
            .parse::<AspectRatio>()
            .map_err(|e| DbError::Other(anyhow::anyhow!("project {}: {e}", project.id)))?;

        Ok(Self {
            id: project.id,
            user_id: project.user_id,
            name: project.name,
            product_name: project.product_name,
            product_description: project.product_description,
            user_prompt: project.user_prompt,
            aspect_ratio,
            target_length: project.target_length,
            uploaded_images: project.uploaded_images,
            generated_image: project.generated_image,
            generated_video: project.generated_video,
            is_generating: project.is_generating,
            is_published: project.is_published,
            error: project.error,
            created_at: project.created_at,
            updated_at: project.updated_at,
        })
    }
}

pub struct Projects<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Projects<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Mark a project as generating a video, but only if it belongs to `user_id`, is idle,
    /// has an image and has no video yet. Returns `None` when any of that does not hold.
    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    pub async fn claim_for_video(&mut self, id: ProjectId, user_id: &UserId) -> Result<Option<ProjectDBResponse>> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects SET is_generating = TRUE, error = NULL, updated_at = NOW()
            WHERE id = $1
              AND user_id = $2
              AND NOT is_generating
              AND generated_video IS NULL
              AND generated_image IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        project.map(ProjectDBResponse::try_from).transpose()
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Projects<'c> {
    type CreateRequest = ProjectCreateDBRequest;
    type UpdateRequest = ProjectUpdateDBRequest;
    type Response = ProjectDBResponse;
    type Id = ProjectId;
    type Filter = ProjectFilter;

    #[instrument(skip(self, request), fields(project_id = %abbrev_uuid(&request.id), user_id = %request.user_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (
                id, user_id, name, product_name, product_description, user_prompt,
                aspect_ratio, target_length, uploaded_images, is_generating
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(&request.user_id)
        .bind(&request.name)
        .bind(&request.product_name)
        .bind(&request.product_description)
        .bind(&request.user_prompt)
        .bind(request.aspect_ratio.as_str())
        .bind(request.target_length)
        .bind(&request.uploaded_images)
        .bind(request.is_generating)
        .fetch_one(&mut *self.db)
        .await?;

        project.try_into()
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        project.map(ProjectDBResponse::try_from).transpose()
    }

    #[instrument(skip(self, filter), fields(owner = ?filter.owner, published = ?filter.published), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT * FROM projects
            WHERE ($1::TEXT IS NULL OR user_id = $1)
              AND ($2::BOOLEAN IS NULL OR is_published = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.owner.as_deref())
        .bind(filter.published)
        .fetch_all(&mut *self.db)
        .await?;

        projects.into_iter().map(ProjectDBResponse::try_from).collect()
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects SET
                generated_image = COALESCE($2, generated_image),
                generated_video = COALESCE($3, generated_video),
                is_generating = COALESCE($4, is_generating),
                is_published = COALESCE($5, is_published),
                error = CASE WHEN $6 THEN $7 ELSE error END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.generated_image.as_deref())
        .bind(request.generated_video.as_deref())
        .bind(request.is_generating)
        .bind(request.is_published)
        .bind(request.error.is_some())
        .bind(request.error.clone().flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        project.try_into()
    }
}
