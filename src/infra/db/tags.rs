use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, TagsRepo};
use crate::domain::entities::{HashtagTrend, TagUsage};
use crate::domain::types::PostId;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, stored_count};

#[derive(sqlx::FromRow)]
struct TagUsageRow {
    name: String,
    usage_count: i64,
}

impl TryFrom<TagUsageRow> for TagUsage {
    type Error = RepoError;

    fn try_from(row: TagUsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            usage_count: stored_count(row.usage_count, "tags.usage_count")?,
            name: row.name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TrendRow {
    tag_name: String,
    post_count: i64,
}

fn into_usages(rows: Vec<TagUsageRow>) -> Result<Vec<TagUsage>, RepoError> {
    rows.into_iter().map(TagUsage::try_from).collect()
}

#[async_trait]
impl TagsRepo for PostgresRepositories {
    async fn recount_tags(&self) -> Result<Vec<TagUsage>, RepoError> {
        let rows = sqlx::query_as::<_, TagUsageRow>(
            r#"
            UPDATE tags
            SET usage_count = (
                SELECT COUNT(*) FROM post_tags pt WHERE pt.tag_name = tags.name
            )
            RETURNING name, usage_count
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_usages(rows)
    }

    async fn record_post_tags(
        &self,
        post_id: &PostId,
        names: &[String],
    ) -> Result<Vec<TagUsage>, RepoError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO tags (name)
            SELECT UNNEST($1::text[])
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(names)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let attached: Vec<String> = sqlx::query_scalar(
            r#"
            INSERT INTO post_tags (post_id, tag_name)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT (post_id, tag_name) DO NOTHING
            RETURNING tag_name
            "#,
        )
        .bind(post_id.as_str())
        .bind(names)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, TagUsageRow>(
            r#"
            UPDATE tags
            SET usage_count = usage_count + 1
            WHERE name = ANY($1)
            RETURNING name, usage_count
            "#,
        )
        .bind(&attached)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        into_usages(rows)
    }

    async fn release_post_tags(&self, post_id: &PostId) -> Result<Vec<TagUsage>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let detached: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM post_tags
            WHERE post_id = $1
            RETURNING tag_name
            "#,
        )
        .bind(post_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, TagUsageRow>(
            r#"
            UPDATE tags
            SET usage_count = GREATEST(usage_count - 1, 0)
            WHERE name = ANY($1)
            RETURNING name, usage_count
            "#,
        )
        .bind(&detached)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        into_usages(rows)
    }

    async fn trending_hashtags(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<HashtagTrend>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, TrendRow>(
            r#"
            SELECT tag_name, COUNT(DISTINCT post_id) AS post_count
            FROM post_tags
            WHERE created_at >= $1
            GROUP BY tag_name
            ORDER BY post_count DESC, tag_name ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(HashtagTrend {
                    post_count: stored_count(row.post_count, "post_tags.post_count")?,
                    tag: row.tag_name,
                })
            })
            .collect()
    }
}
