use sqlx::Row;

use gingga_core::domain::chat::ChatId;
use gingga_core::domain::message::{Attachment, ChatMessage, MessageId, MessagePart, Role};

use super::{decode_error, decode_timestamp, encode_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let chat_id: String = row.try_get("chat_id").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let parts_json: String = row.try_get("parts_json").map_err(decode_error)?;
    let attachments_json: String = row.try_get("attachments_json").map_err(decode_error)?;
    let model: Option<String> = row.try_get("model").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let parts = serde_json::from_str::<Vec<MessagePart>>(&parts_json)
        .map_err(|e| RepositoryError::Decode(format!("parts_json for message `{id}`: {e}")))?;
    let attachments = serde_json::from_str::<Vec<Attachment>>(&attachments_json).map_err(|e| {
        RepositoryError::Decode(format!("attachments_json for message `{id}`: {e}"))
    })?;

    Ok(ChatMessage {
        id: MessageId(id),
        chat_id: ChatId(chat_id),
        role: role.parse::<Role>().map_err(decode_error)?,
        parts,
        attachments,
        model,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, chat_id, role, parts_json, attachments_json, model, created_at
             FROM chat_message WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, chat_id, role, parts_json, attachments_json, model, created_at
             FROM chat_message WHERE chat_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&chat_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()
    }

    async fn upsert(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        let parts_json = serde_json::to_string(&message.parts).map_err(decode_error)?;
        let attachments_json = serde_json::to_string(&message.attachments).map_err(decode_error)?;

        // A message id never moves between chats; conflicting rows of another chat stay untouched.
        sqlx::query(
            "INSERT INTO chat_message (id, chat_id, role, parts_json, attachments_json, model, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 parts_json = excluded.parts_json,
                 attachments_json = excluded.attachments_json,
                 model = COALESCE(excluded.model, chat_message.model)
             WHERE chat_message.chat_id = excluded.chat_id",
        )
        .bind(&message.id.0)
        .bind(&message.chat_id.0)
        .bind(message.role.as_str())
        .bind(parts_json)
        .bind(attachments_json)
        .bind(&message.model)
        .bind(encode_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_trailing(
        &self,
        chat_id: &ChatId,
        from: &MessageId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM chat_message
             WHERE chat_id = ?
               AND created_at >= (
                   SELECT created_at FROM chat_message WHERE id = ? AND chat_id = ?
               )",
        )
        .bind(&chat_id.0)
        .bind(&from.0)
        .bind(&chat_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
