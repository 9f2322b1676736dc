use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use crate::application::pagination::FeedWindow;
use crate::application::repos::{PostStore, RepoError};
use crate::domain::entities::Post;
use crate::domain::types::{PostId, UserId};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(Debug, FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    body: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post::new(
            PostId::from_uuid(row.id),
            UserId::from_uuid(row.author_id),
            row.body,
        )
    }
}

/// Translate the unbounded limit sentinel into SQL `LIMIT NULL`.
fn limit_param(window: &FeedWindow) -> Option<i64> {
    match window.limit.as_sentinel() {
        value if value < 0 => None,
        value => Some(value),
    }
}

fn offset_param(window: &FeedWindow) -> i64 {
    window.offset_sentinel().max(0)
}

#[async_trait]
impl PostStore for PostgresRepositories {
    async fn append(&self, post: &Post) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO posts (id, author_id, body) VALUES ($1, $2, $3)")
            .bind(post.id.as_uuid())
            .bind(post.author.as_uuid())
            .bind(&post.text)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn query_by_friends(
        &self,
        _user: UserId,
        friends: &[UserId],
        window: FeedWindow,
    ) -> Result<Vec<Post>, RepoError> {
        if friends.is_empty() {
            return Ok(Vec::new());
        }

        let authors: Vec<Uuid> = friends.iter().map(UserId::as_uuid).collect();
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, author_id, body
            FROM posts
            WHERE author_id = ANY($1)
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&authors)
        .bind(limit_param(&window))
        .bind(offset_param(&window))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Post::from).collect())
    }
}
