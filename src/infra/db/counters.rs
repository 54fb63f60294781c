use async_trait::async_trait;

use crate::application::repos::{CountersRepo, RepoError};
use crate::domain::types::CounterKey;

use super::PostgresRepositories;
use super::util::{bind_count, map_sqlx_error, stored_count};

#[async_trait]
impl CountersRepo for PostgresRepositories {
    async fn load_counter(&self, key: &CounterKey) -> Result<u64, RepoError> {
        let value: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT value
            FROM counters
            WHERE subject_id = $1 AND metric = $2
            "#,
        )
        .bind(key.subject.as_str())
        .bind(key.metric.key())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        value.map_or(Ok(0), |value| stored_count(value, "counters.value"))
    }

    async fn store_counters(&self, values: &[(CounterKey, u64)]) -> Result<(), RepoError> {
        if values.is_empty() {
            return Ok(());
        }

        let subjects: Vec<String> = values
            .iter()
            .map(|(key, _)| key.subject.as_str().to_string())
            .collect();
        let metrics: Vec<String> = values.iter().map(|(key, _)| key.metric.key()).collect();
        let counts: Vec<i64> = values.iter().map(|(_, value)| bind_count(*value)).collect();

        sqlx::query(
            r#"
            INSERT INTO counters (subject_id, metric, value, updated_at)
            SELECT subject_id, metric, value, now()
            FROM UNNEST($1::text[], $2::text[], $3::bigint[]) AS batch(subject_id, metric, value)
            ON CONFLICT (subject_id, metric) DO UPDATE
            SET value = GREATEST(counters.value, EXCLUDED.value),
                updated_at = now()
            "#,
        )
        .bind(subjects)
        .bind(metrics)
        .bind(counts)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
