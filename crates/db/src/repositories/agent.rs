use sqlx::Row;

use gingga_core::domain::agent::{Agent, AgentId, AgentKind};
use gingga_core::domain::user::UserId;

use super::{decode_error, decode_timestamp, encode_timestamp, AgentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let instructions: String = row.try_get("instructions").map_err(decode_error)?;
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let model: Option<String> = row.try_get("model").map_err(decode_error)?;
    let webhook_url: Option<String> = row.try_get("webhook_url").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(Agent {
        id: AgentId(id),
        owner_id: UserId(owner_id),
        name,
        description,
        instructions,
        kind: kind.parse::<AgentKind>().map_err(decode_error)?,
        model,
        webhook_url,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, description, instructions, kind, model, webhook_url,
                    created_at, updated_at
             FROM agent WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent (id, owner_id, name, description, instructions, kind, model,
                                webhook_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 instructions = excluded.instructions,
                 kind = excluded.kind,
                 model = excluded.model,
                 webhook_url = excluded.webhook_url,
                 updated_at = excluded.updated_at",
        )
        .bind(&agent.id.0)
        .bind(&agent.owner_id.0)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.instructions)
        .bind(agent.kind.as_str())
        .bind(&agent.model)
        .bind(&agent.webhook_url)
        .bind(encode_timestamp(&agent.created_at))
        .bind(encode_timestamp(&agent.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, name, description, instructions, kind, model, webhook_url,
                    created_at, updated_at
             FROM agent WHERE owner_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_agent).collect::<Result<Vec<_>, _>>()
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM agent WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
