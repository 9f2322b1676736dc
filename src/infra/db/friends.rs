use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{FriendGraph, RepoError, UserDirectory};
use crate::domain::types::UserId;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[async_trait]
impl FriendGraph for PostgresRepositories {
    async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT CASE WHEN user1 = $1 THEN user2 ELSE user1 END AS friend
            FROM friends
            WHERE user1 = $1 OR user2 = $1
            ORDER BY friend
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }
}

#[async_trait]
impl UserDirectory for PostgresRepositories {
    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }
}
