//! Pool-level data access used by handlers and the generation pipeline.

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::{Projects, Repository, Users},
        models::{
            projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectFilter, ProjectUpdateDBRequest},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    types::{ProjectId, UserId},
};
use async_trait::async_trait;
use sqlx::PgPool;

/// Everything the service persists, independent of the backend.
///
/// Each method is a single atomic step; callers compose them into compensating sequences
/// rather than holding a transaction across external calls.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Insert a user, leaving an existing row with the same id untouched
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    async fn get_user(&self, id: &UserId) -> Result<Option<UserDBResponse>>;

    /// Delete a user and their projects. Returns whether a row existed.
    async fn delete_user(&self, id: &UserId) -> Result<bool>;

    /// Conditionally subtract credits. `None` when the user is missing or cannot cover `amount`.
    async fn debit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>>;

    /// Add credits. `None` when the user is missing.
    async fn credit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>>;

    async fn create_project(&self, request: &ProjectCreateDBRequest) -> Result<ProjectDBResponse>;

    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>>;

    /// Projects matching the filter, newest first
    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectDBResponse>>;

    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse>;

    /// Flag an owned, idle project with an image and no video as generating a video
    async fn claim_for_video(&self, id: ProjectId, user_id: &UserId) -> Result<Option<ProjectDBResponse>>;

    async fn delete_project(&self, id: ProjectId) -> Result<bool>;
}

/// PostgreSQL-backed store: acquires a connection per call and delegates to the repositories
#[derive(Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool.acquire().await.map_err(DbError::from)
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut conn = self.conn().await?;
        Users::new(&mut conn).create(request).await
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.conn().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        let mut conn = self.conn().await?;
        Users::new(&mut conn).delete(id).await
    }

    async fn debit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        Users::new(&mut conn).debit(id, amount).await
    }

    async fn credit_credits(&self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        Users::new(&mut conn).credit(id, amount).await
    }

    async fn create_project(&self, request: &ProjectCreateDBRequest) -> Result<ProjectDBResponse> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).create(request).await
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).get_by_id(id).await
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectDBResponse>> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).list(filter).await
    }

    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).update(id, request).await
    }

    async fn claim_for_video(&self, id: ProjectId, user_id: &UserId) -> Result<Option<ProjectDBResponse>> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).claim_for_video(id, user_id).await
    }

    async fn delete_project(&self, id: ProjectId) -> Result<bool> {
        let mut conn = self.conn().await?;
        Projects::new(&mut conn).delete(id).await
    }
}
