use chrono::Utc;
use sqlx::Row;

use gingga_core::domain::agent::AgentId;
use gingga_core::domain::chat::{Chat, ChatId, Visibility};
use gingga_core::domain::user::UserId;

use super::{decode_error, decode_timestamp, encode_timestamp, ChatRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatRepository {
    pool: DbPool,
}

impl SqlChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<Chat, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let user_id: Option<String> = row.try_get("user_id").map_err(decode_error)?;
    let title: String = row.try_get("title").map_err(decode_error)?;
    let visibility: String = row.try_get("visibility").map_err(decode_error)?;
    let agent_id: Option<String> = row.try_get("agent_id").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(Chat {
        id: ChatId(id),
        user_id: user_id.map(UserId),
        title,
        visibility: visibility.parse::<Visibility>().map_err(decode_error)?,
        agent_id: agent_id.map(AgentId),
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ChatRepository for SqlChatRepository {
    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, visibility, agent_id, created_at, updated_at
             FROM chat WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_chat).transpose()
    }

    async fn create_if_absent(&self, chat: Chat) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO chat (id, user_id, title, visibility, agent_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&chat.id.0)
        .bind(chat.user_id.as_ref().map(|id| id.0.as_str()))
        .bind(&chat.title)
        .bind(chat.visibility.as_str())
        .bind(chat.agent_id.as_ref().map(|id| id.0.as_str()))
        .bind(encode_timestamp(&chat.created_at))
        .bind(encode_timestamp(&chat.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rename(&self, id: &ChatId, title: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE chat SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(encode_timestamp(&Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_visibility(
        &self,
        id: &ChatId,
        visibility: Visibility,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE chat SET visibility = ?, updated_at = ? WHERE id = ?")
            .bind(visibility.as_str())
            .bind(encode_timestamp(&Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, visibility, agent_id, created_at, updated_at
             FROM chat WHERE user_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chat).collect::<Result<Vec<_>, _>>()
    }

    async fn delete(&self, id: &ChatId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM chat WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
