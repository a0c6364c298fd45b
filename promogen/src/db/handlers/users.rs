//! Database repository for users and their credit balance.

use crate::{
    db::{
        errors::Result,
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    types::UserId,
};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a user. An existing row with the same id is returned unchanged, so a redelivered
    /// `user.created` event does not reset the balance.
    #[instrument(skip(self, request), fields(user_id = %request.id), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let inserted = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, email, name, image, credits)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&request.id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(&request.image)
        .bind(request.credits)
        .fetch_optional(&mut *self.db)
        .await?;

        match inserted {
            Some(user) => Ok(user),
            None => Ok(sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
                .bind(&request.id)
                .fetch_one(&mut *self.db)
                .await?),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: &UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Delete a user; their projects go with them via `ON DELETE CASCADE`
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: &UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Subtract `amount` if and only if the balance covers it.
    ///
    /// Returns the new balance, or `None` when the user is missing or the balance is too low.
    /// The check and the write are one statement, so concurrent debits cannot overdraw.
    #[instrument(skip(self), err)]
    pub async fn debit(&mut self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users SET credits = credits - $2, updated_at = NOW()
            WHERE id = $1 AND credits >= $2
            RETURNING credits
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(balance)
    }

    /// Add `amount` to the balance. Returns the new balance, or `None` for an unknown user.
    #[instrument(skip(self), err)]
    pub async fn credit(&mut self, id: &UserId, amount: i64) -> Result<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users SET credits = credits + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING credits
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(balance)
    }
}
