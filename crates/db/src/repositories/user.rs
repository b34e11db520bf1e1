use sqlx::Row;

use gingga_core::domain::user::{Session, Tier, User, UserId};

use super::{decode_error, decode_timestamp, encode_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let email: String = row.try_get("email").map_err(decode_error)?;
    let name: Option<String> = row.try_get("name").map_err(decode_error)?;
    let tier: String = row.try_get("tier").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(User {
        id: UserId(id),
        email,
        name,
        tier: tier.parse::<Tier>().map_err(decode_error)?,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, name, tier, created_at FROM user_account WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        if user.tier == Tier::Guest {
            return Err(RepositoryError::Decode(
                "guest callers are never persisted as accounts".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO user_account (id, email, name, tier, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 name = excluded.name,
                 tier = excluded.tier",
        )
        .bind(&user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.tier.as_str())
        .bind(encode_timestamp(&user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, expires_at FROM session WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let token_hash: String = row.try_get("token_hash").map_err(decode_error)?;
        let user_id: String = row.try_get("user_id").map_err(decode_error)?;
        let expires_at: String = row.try_get("expires_at").map_err(decode_error)?;

        Ok(Some(Session {
            token_hash,
            user_id: UserId(user_id),
            expires_at: decode_timestamp("expires_at", &expires_at)?,
        }))
    }

    async fn save_session(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO session (token_hash, user_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(token_hash) DO UPDATE SET expires_at = excluded.expires_at",
        )
        .bind(&session.token_hash)
        .bind(&session.user_id.0)
        .bind(encode_timestamp(&session.expires_at))
        .bind(encode_timestamp(&chrono::Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
