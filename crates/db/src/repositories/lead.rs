use sqlx::Row;

use gingga_core::domain::agent::AgentId;
use gingga_core::domain::chat::ChatId;
use gingga_core::domain::lead::{Lead, LeadId};

use super::{decode_error, decode_timestamp, encode_timestamp, LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<Lead, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let agent_id: String = row.try_get("agent_id").map_err(decode_error)?;
    let chat_id: Option<String> = row.try_get("chat_id").map_err(decode_error)?;
    let score: i64 = row.try_get("qualification_score").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let qualification_score = u8::try_from(score)
        .map_err(|_| RepositoryError::Decode(format!("qualification_score out of range: {score}")))?;

    Ok(Lead {
        id: LeadId(id),
        agent_id: AgentId(agent_id),
        chat_id: chat_id.map(ChatId),
        name: row.try_get("name").map_err(decode_error)?,
        email: row.try_get("email").map_err(decode_error)?,
        phone: row.try_get("phone").map_err(decode_error)?,
        company: row.try_get("company").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
        qualification_score,
        qualification_reason: row.try_get("qualification_reason").map_err(decode_error)?,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn save(&self, lead: Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lead (id, agent_id, chat_id, name, email, phone, company, notes,
                               qualification_score, qualification_reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 phone = excluded.phone,
                 company = excluded.company,
                 notes = excluded.notes,
                 qualification_score = excluded.qualification_score,
                 qualification_reason = excluded.qualification_reason",
        )
        .bind(&lead.id.0)
        .bind(&lead.agent_id.0)
        .bind(lead.chat_id.as_ref().map(|id| id.0.as_str()))
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(&lead.notes)
        .bind(i64::from(lead.qualification_score))
        .bind(&lead.qualification_reason)
        .bind(encode_timestamp(&lead.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
        limit: u32,
    ) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, chat_id, name, email, phone, company, notes,
                    qualification_score, qualification_reason, created_at
             FROM lead WHERE agent_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(&agent_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect::<Result<Vec<_>, _>>()
    }
}
