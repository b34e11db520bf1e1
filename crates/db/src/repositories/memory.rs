use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use gingga_core::domain::agent::{Agent, AgentId};
use gingga_core::domain::chat::{Chat, ChatId, Visibility};
use gingga_core::domain::lead::Lead;
use gingga_core::domain::message::{ChatMessage, MessageId};
use gingga_core::domain::user::{Session, User, UserId};

use super::{
    AgentRepository, ChatRepository, LeadRepository, MessageRepository, RepositoryError,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryChatRepository {
    chats: RwLock<HashMap<String, Chat>>,
}

#[async_trait::async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        let chats = self.chats.read().await;
        Ok(chats.get(&id.0).cloned())
    }

    async fn create_if_absent(&self, chat: Chat) -> Result<bool, RepositoryError> {
        let mut chats = self.chats.write().await;
        if chats.contains_key(&chat.id.0) {
            return Ok(false);
        }
        chats.insert(chat.id.0.clone(), chat);
        Ok(true)
    }

    async fn rename(&self, id: &ChatId, title: &str) -> Result<bool, RepositoryError> {
        let mut chats = self.chats.write().await;
        Ok(chats
            .get_mut(&id.0)
            .map(|chat| {
                chat.title = title.to_string();
                chat.updated_at = chrono::Utc::now();
            })
            .is_some())
    }

    async fn set_visibility(
        &self,
        id: &ChatId,
        visibility: Visibility,
    ) -> Result<bool, RepositoryError> {
        let mut chats = self.chats.write().await;
        Ok(chats
            .get_mut(&id.0)
            .map(|chat| {
                chat.visibility = visibility;
                chat.updated_at = chrono::Utc::now();
            })
            .is_some())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Chat>, RepositoryError> {
        let chats = self.chats.read().await;
        let mut owned = chats
            .values()
            .filter(|chat| chat.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit as usize);
        Ok(owned)
    }

    async fn delete(&self, id: &ChatId) -> Result<bool, RepositoryError> {
        let mut chats = self.chats.write().await;
        Ok(chats.remove(&id.0).is_some())
    }
}

/// Keeps messages in insertion order and counts every write, so callers can
/// assert that a code path left storage untouched.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<ChatMessage>>,
    writes: AtomicUsize,
}

impl InMemoryMessageRepository {
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|message| &message.id == id).cloned())
    }

    async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut found = messages
            .iter()
            .filter(|message| &message.chat_id == chat_id)
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn upsert(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|existing| existing.id == message.id) {
            Some(existing) if existing.chat_id == message.chat_id => {
                existing.parts = message.parts;
                existing.attachments = message.attachments;
                if message.model.is_some() {
                    existing.model = message.model;
                }
            }
            Some(_) => {}
            None => messages.push(message),
        }
        Ok(())
    }

    async fn delete_trailing(
        &self,
        chat_id: &ChatId,
        from: &MessageId,
    ) -> Result<u64, RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut messages = self.messages.write().await;
        let Some(cutoff) = messages
            .iter()
            .find(|message| &message.id == from && &message.chat_id == chat_id)
            .map(|message| message.created_at)
        else {
            return Ok(0);
        };
        let before = messages.len();
        messages.retain(|message| !(&message.chat_id == chat_id && message.created_at >= cutoff));
        Ok((before - messages.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<String, Agent>>,
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.get(&id.0).cloned())
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.0.clone(), agent);
        Ok(())
    }

    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        let mut owned = agents
            .values()
            .filter(|agent| &agent.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(owned)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let mut agents = self.agents.write().await;
        Ok(agents.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<Vec<Lead>>,
}

impl InMemoryLeadRepository {
    pub async fn all(&self) -> Vec<Lead> {
        self.leads.read().await.clone()
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn save(&self, lead: Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        leads.retain(|existing| existing.id != lead.id);
        leads.push(lead);
        Ok(())
    }

    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
        limit: u32,
    ) -> Result<Vec<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        let mut found =
            leads.iter().filter(|lead| &lead.agent_id == agent_id).cloned().collect::<Vec<_>>();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit as usize);
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token_hash).cloned())
    }

    async fn save_session(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use gingga_core::domain::chat::{Chat, ChatId};
    use gingga_core::domain::message::{ChatMessage, MessageId, MessagePart, Role};

    use crate::repositories::{
        ChatRepository, InMemoryChatRepository, InMemoryMessageRepository, MessageRepository,
    };

    fn message(id: &str, chat: &str, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId(id.to_string()),
            chat_id: ChatId(chat.to_string()),
            role: Role::User,
            parts: vec![MessagePart::text(id)],
            attachments: Vec::new(),
            model: None,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn in_memory_chat_create_is_idempotent() {
        let repo = InMemoryChatRepository::default();
        let chat = Chat::new(ChatId("c1".to_string()), None, None, "first");

        assert!(repo.create_if_absent(chat.clone()).await.expect("create"));
        assert!(!repo.create_if_absent(chat.clone()).await.expect("create again"));
        let stored = repo.find_by_id(&chat.id).await.expect("find").expect("exists");
        assert_eq!(stored.title, "first");
    }

    #[tokio::test]
    async fn in_memory_messages_mirror_sql_upsert_semantics() {
        let repo = InMemoryMessageRepository::default();
        repo.upsert(message("m1", "c1", 0)).await.expect("insert");

        let mut replaced = message("m1", "c1", 0);
        replaced.parts = vec![MessagePart::text("edited")];
        repo.upsert(replaced).await.expect("update");
        repo.upsert(message("m1", "c2", 0)).await.expect("foreign chat ignored");

        let listed = repo.list_for_chat(&ChatId("c1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].parts, vec![MessagePart::text("edited")]);
        assert!(repo.list_for_chat(&ChatId("c2".to_string())).await.expect("list").is_empty());
        assert_eq!(repo.write_count(), 3);
    }

    #[tokio::test]
    async fn in_memory_delete_trailing_keeps_earlier_messages() {
        let repo = InMemoryMessageRepository::default();
        for (offset, id) in ["m1", "m2", "m3"].iter().enumerate() {
            repo.upsert(message(id, "c1", offset as i64)).await.expect("insert");
        }

        let removed = repo
            .delete_trailing(&ChatId("c1".to_string()), &MessageId("m2".to_string()))
            .await
            .expect("delete");
        assert_eq!(removed, 2);
        let left = repo.list_for_chat(&ChatId("c1".to_string())).await.expect("list");
        assert_eq!(left.iter().map(|m| m.id.0.as_str()).collect::<Vec<_>>(), vec!["m1"]);
    }
}
