use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db)
            if db.message().contains("violates foreign key constraint")
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Convert a stored `BIGINT` count, which the schema keeps non-negative.
pub(super) fn stored_count(value: i64, column: &'static str) -> Result<u64, RepoError> {
    u64::try_from(value).map_err(|_| RepoError::Integrity {
        message: format!("{column} holds negative value {value}"),
    })
}

pub(super) fn bind_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
