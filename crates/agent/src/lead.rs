//! `capture_lead`: stores a qualified lead for the chat's agent and notifies
//! the agent's workflow webhook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use gingga_core::domain::lead::{Lead, LeadId};
use gingga_db::repositories::LeadRepository;

use crate::tools::{Tool, ToolContext, ToolError};

pub const CAPTURE_LEAD_TOOL: &str = "capture_lead";

#[async_trait]
pub trait LeadNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), ToolError>;
}

pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Unavailable(format!("webhook client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl LeadNotifier for WebhookNotifier {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), ToolError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("webhook request: {e}")))?;
        if !response.status().is_success() {
            return Err(ToolError::Failed(format!("webhook returned {}", response.status())));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureLeadArgs {
    name: String,
    email: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(alias = "qualification_score")]
    qualification_score: u8,
    #[serde(alias = "qualification_reason", default)]
    qualification_reason: String,
}

pub struct CaptureLeadTool {
    leads: Arc<dyn LeadRepository>,
    notifier: Arc<dyn LeadNotifier>,
}

impl CaptureLeadTool {
    pub fn new(leads: Arc<dyn LeadRepository>, notifier: Arc<dyn LeadNotifier>) -> Self {
        Self { leads, notifier }
    }
}

#[async_trait]
impl Tool for CaptureLeadTool {
    fn name(&self) -> &'static str {
        CAPTURE_LEAD_TOOL
    }

    fn description(&self) -> &'static str {
        "Save a prospective customer's contact details with a qualification score from 0 to 100 \
         and a short reason for the score. Only call this once the visitor has shared a name and email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "email": { "type": "string" },
                "phone": { "type": "string" },
                "company": { "type": "string" },
                "notes": { "type": "string" },
                "qualificationScore": { "type": "integer", "minimum": 0, "maximum": 100 },
                "qualificationReason": { "type": "string" }
            },
            "required": ["name", "email", "qualificationScore", "qualificationReason"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let agent = context.agent.as_ref().ok_or_else(|| {
            ToolError::Unavailable("this chat is not bound to an agent".to_string())
        })?;
        let args: CaptureLeadArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let lead = Lead {
            id: LeadId(uuid::Uuid::new_v4().to_string()),
            agent_id: agent.id.clone(),
            chat_id: Some(context.chat_id.clone()),
            name: args.name.trim().to_string(),
            email: args.email.trim().to_ascii_lowercase(),
            phone: args.phone.filter(|p| !p.trim().is_empty()),
            company: args.company.filter(|c| !c.trim().is_empty()),
            notes: args.notes.filter(|n| !n.trim().is_empty()),
            qualification_score: args.qualification_score,
            qualification_reason: args.qualification_reason,
            created_at: Utc::now(),
        };
        lead.validate().map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        self.leads.save(lead.clone()).await.map_err(|e| ToolError::Failed(e.to_string()))?;
        tracing::info!(
            event_name = "agent.lead.captured",
            correlation_id = %context.correlation_id,
            chat_id = %context.chat_id.0,
            agent_id = %agent.id.0,
            lead_id = %lead.id.0,
            qualification_score = lead.qualification_score,
            "lead captured"
        );

        let payload = json!({
            "event": "lead.captured",
            "agentId": agent.id.0,
            "chatId": context.chat_id.0,
            "lead": lead,
        });
        let mut notified = false;
        if let Some(url) = &agent.webhook_url {
            match self.notifier.notify(url, &payload).await {
                Ok(()) => notified = true,
                Err(error) => tracing::warn!(
                    event_name = "agent.lead.webhook_failed",
                    correlation_id = %context.correlation_id,
                    lead_id = %lead.id.0,
                    error = %error,
                    "lead webhook notification failed"
                ),
            }
        }

        Ok(json!({
            "status": "captured",
            "leadId": lead.id.0,
            "qualificationScore": lead.qualification_score,
            "webhookNotified": notified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    use gingga_core::domain::agent::{Agent, AgentId, AgentKind};
    use gingga_core::domain::chat::ChatId;
    use gingga_core::domain::user::UserId;
    use gingga_db::repositories::InMemoryLeadRepository;

    use super::{CaptureLeadTool, LeadNotifier};
    use crate::tools::{Tool, ToolContext, ToolError};

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        sent: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl LeadNotifier for RecordingNotifier {
        async fn notify(&self, url: &str, payload: &Value) -> Result<(), ToolError> {
            self.sent.lock().expect("lock").push((url.to_string(), payload.clone()));
            if self.fail {
                return Err(ToolError::Failed("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn context(webhook: Option<&str>) -> ToolContext {
        ToolContext {
            chat_id: ChatId("c1".to_string()),
            agent: Some(Agent {
                id: AgentId("a1".to_string()),
                owner_id: UserId("u1".to_string()),
                name: "Sales".to_string(),
                description: String::new(),
                instructions: String::new(),
                kind: AgentKind::LeadCapture,
                model: None,
                webhook_url: webhook.map(str::to_string),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }),
            history: Vec::new(),
            correlation_id: "req-1".to_string(),
        }
    }

    fn args() -> Value {
        json!({
            "name": " Ana Ruiz ",
            "email": "Ana@Acme.com",
            "company": "Acme",
            "qualificationScore": 80,
            "qualificationReason": "budget approved for Q3"
        })
    }

    #[tokio::test]
    async fn stores_lead_and_notifies_webhook() {
        let leads = Arc::new(InMemoryLeadRepository::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let tool = CaptureLeadTool::new(leads.clone(), notifier.clone());

        let result = tool.execute(args(), &context(Some("https://hooks.example.com/x"))).await;
        let result = result.expect("tool succeeds");
        assert_eq!(result["status"], "captured");
        assert_eq!(result["webhookNotified"], true);

        let stored = leads.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Ana Ruiz");
        assert_eq!(stored[0].email, "ana@acme.com");
        assert_eq!(stored[0].chat_id, Some(ChatId("c1".to_string())));

        let sent = notifier.sent.lock().expect("lock");
        assert_eq!(sent[0].0, "https://hooks.example.com/x");
        assert_eq!(sent[0].1["lead"]["qualification_score"], 80);
    }

    #[tokio::test]
    async fn webhook_failure_is_not_fatal() {
        let leads = Arc::new(InMemoryLeadRepository::default());
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let tool = CaptureLeadTool::new(leads.clone(), notifier);

        let result = tool.execute(args(), &context(Some("https://hooks.example.com/x"))).await;
        assert_eq!(result.expect("still succeeds")["webhookNotified"], false);
        assert_eq!(leads.all().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_email_and_missing_agent() {
        let tool = CaptureLeadTool::new(
            Arc::new(InMemoryLeadRepository::default()),
            Arc::new(RecordingNotifier::default()),
        );

        let mut bad = args();
        bad["email"] = json!("not-an-email");
        assert!(matches!(
            tool.execute(bad, &context(None)).await,
            Err(ToolError::InvalidArguments(_))
        ));

        let mut unbound = context(None);
        unbound.agent = None;
        assert!(matches!(tool.execute(args(), &unbound).await, Err(ToolError::Unavailable(_))));
    }
}
