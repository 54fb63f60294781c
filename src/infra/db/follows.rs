use async_trait::async_trait;

use crate::application::repos::{FollowsRepo, RepoError};
use crate::domain::entities::FollowerCounts;
use crate::domain::types::UserId;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, stored_count};

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn follower_counts(&self, user: &UserId) -> Result<FollowerCounts, RepoError> {
        let (followers, following): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1) AS followers,
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following
            "#,
        )
        .bind(user.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FollowerCounts {
            follower_count: stored_count(followers, "follows.followers")?,
            following_count: stored_count(following, "follows.following")?,
        })
    }

    async fn is_following(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2
            )
            "#,
        )
        .bind(follower.as_str())
        .bind(followee.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id)
            VALUES ($1, $2)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower.as_str())
        .bind(followee.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower.as_str())
        .bind(followee.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}
