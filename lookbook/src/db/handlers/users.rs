//! Database repository for users.

use crate::db::{
    errors::Result,
    handlers::credits::Credits,
    models::{
        credits::CreditGrantDBRequest,
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a user and grant the starting credits in one transaction
    #[instrument(skip(self, request), fields(device_id = %request.device_id), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, device_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.device_id)
        .fetch_one(&mut *tx)
        .await?;

        let user = if request.initial_credits > 0 {
            let entry = Credits::new(&mut tx)
                .grant(&CreditGrantDBRequest {
                    user_id: user.id,
                    amount: request.initial_credits,
                    description: Some("Welcome credits".to_string()),
                })
                .await?;
            UserDBResponse {
                credit_balance: entry.balance_after,
                ..user
            }
        } else {
            user
        };

        tx.commit().await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_device_id(&mut self, device_id: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                is_pro = COALESCE($2, is_pro),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.is_pro)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_create_grants_initial_credits(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo
            .create(&UserCreateDBRequest {
                device_id: "device-1".to_string(),
                initial_credits: 3,
            })
            .await
            .unwrap();
        assert_eq!(user.credit_balance, 3);

        let fetched = repo.get_by_device_id("device-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.credit_balance, 3);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_device_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let request = UserCreateDBRequest {
            device_id: "device-dup".to_string(),
            initial_credits: 0,
        };

        repo.create(&request).await.unwrap();
        let err = repo.create(&request).await.unwrap_err();
        assert!(err.is_unique_violation(Some("users_device_id_key")));
    }
}
