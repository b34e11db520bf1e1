use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use gingga_agent::lead::LeadNotifier;
use gingga_agent::llm::{ScriptedLlmClient, ToolCall};
use gingga_agent::tools::ToolError;
use gingga_core::config::AppConfig;
use gingga_core::domain::chat::{Chat, ChatId};
use gingga_core::domain::user::{hash_session_token, Session, Tier, User, UserId};
use gingga_core::ratelimit::{RateLimiter, SlidingWindowLimiter};
use gingga_db::repositories::{ChatRepository, SqlChatRepository, SqlUserRepository, UserRepository};
use gingga_db::{connect_in_memory, DbPool};
use gingga_server::{router, AppState};

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl LeadNotifier for CountingNotifier {
    async fn notify(&self, _url: &str, _payload: &Value) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    router: Router,
    pool: DbPool,
    llm: Arc<ScriptedLlmClient>,
}

async fn harness(llm: ScriptedLlmClient, configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let pool = connect_in_memory().await.expect("in-memory database");
    let mut config = AppConfig::default();
    configure(&mut config);

    let limiter: Arc<dyn RateLimiter> =
        Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit));
    let llm = Arc::new(llm);
    let state = AppState::from_parts(
        config,
        pool.clone(),
        llm.clone(),
        limiter,
        Arc::new(CountingNotifier::default()),
    );
    Harness { router: router(state), pool, llm }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("router should respond")
    }

    async fn seed_user(&self, id: &str) -> String {
        let users = SqlUserRepository::new(self.pool.clone());
        users
            .save(User {
                id: UserId(id.to_string()),
                email: format!("{id}@example.com"),
                name: Some(id.to_uppercase()),
                tier: Tier::Free,
                created_at: Utc::now(),
            })
            .await
            .expect("save user");

        let token = format!("token-{id}");
        users
            .save_session(Session {
                token_hash: hash_session_token(&token),
                user_id: UserId(id.to_string()),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .expect("save session");
        token
    }

    async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.pool).await.expect("count query")
    }
}

fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

async fn text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn json_body(response: Response) -> Value {
    serde_json::from_str(&text(response).await).expect("json body")
}

/// Splits a data-stream body into `(code, payload)` pairs.
fn stream_parts(body: &str) -> Vec<(String, Value)> {
    body.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(code, payload)| {
            (code.to_string(), serde_json::from_str(payload).expect("part payload is json"))
        })
        .collect()
}

fn user_turn(chat_id: &str, message_id: &str, text: &str) -> Value {
    json!({
        "id": chat_id,
        "messages": [{
            "id": message_id,
            "role": "user",
            "parts": [{"type": "text", "text": text}]
        }]
    })
}

#[tokio::test]
async fn first_turn_creates_chat_and_persists_both_messages() {
    let h = harness(ScriptedLlmClient::new().with_text_reply("Hi there"), |_| {}).await;

    let response = h
        .send(request(
            "POST",
            "/api/chat",
            Some(json!({
                "id": "c1",
                "messages": [{"id": "m1", "role": "user", "parts": [{"type": "text"}]}]
            })),
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-vercel-ai-data-stream").map(|v| v.as_bytes()),
        Some(&b"v1"[..])
    );
    let parts = stream_parts(&text(response).await);
    let codes = parts.iter().map(|(code, _)| code.as_str()).collect::<Vec<_>>();
    assert_eq!(codes, vec!["f", "0", "e", "d"]);
    assert_eq!(parts[1].1, json!("Hi there"));

    assert_eq!(h.count("SELECT COUNT(*) FROM chat WHERE id = 'c1'").await, 1);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat_message WHERE id = 'm1'").await, 1);
    assert_eq!(
        h.count("SELECT COUNT(*) FROM chat_message WHERE chat_id = 'c1' AND role = 'assistant'")
            .await,
        1
    );

    let announced = parts[0].1["messageId"].as_str().expect("message id").to_string();
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_message WHERE id = ?")
        .bind(&announced)
        .fetch_one(&h.pool)
        .await
        .expect("count");
    assert_eq!(stored, 1, "assistant message is stored under the announced id");
}

#[tokio::test]
async fn repeated_turns_on_one_chat_keep_a_single_row() {
    let llm = ScriptedLlmClient::new().with_text_reply("One").with_text_reply("Two");
    let h = harness(llm, |_| {}).await;

    let first = h.send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hello")), None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    text(first).await;

    let second =
        h.send(request("POST", "/api/chat", Some(user_turn("c1", "m2", "again")), None)).await;
    assert_eq!(second.status(), StatusCode::OK);
    text(second).await;

    assert_eq!(h.count("SELECT COUNT(*) FROM chat").await, 1);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat_message WHERE chat_id = 'c1'").await, 4);

    let requests = h.llm.requests();
    let prompt = &requests.last().expect("provider was called").messages;
    assert!(prompt.len() >= 4, "second turn replays the stored history");
}

#[tokio::test]
async fn invalid_bodies_are_rejected_with_400() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;

    let empty = h
        .send(request("POST", "/api/chat", Some(json!({"id": "c1", "messages": []})), None))
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let body = json_body(empty).await;
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "messages must not be empty");

    let malformed = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat").await, 0);
}

#[tokio::test]
async fn anonymous_callers_need_a_session_when_disabled() {
    let h = harness(ScriptedLlmClient::new(), |config| config.chat.allow_anonymous = false).await;

    let response =
        h.send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bogus = h
        .send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), Some("nope")))
        .await;
    assert_eq!(bogus.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat").await, 0);
}

#[tokio::test]
async fn foreign_chat_is_forbidden() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;
    h.seed_user("u1").await;
    let intruder = h.seed_user("u2").await;

    SqlChatRepository::new(h.pool.clone())
        .create_if_absent(Chat::new(
            ChatId("c1".to_string()),
            Some(UserId("u1".to_string())),
            None,
            "Private",
        ))
        .await
        .expect("seed chat");

    let response = h
        .send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), Some(&intruder)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let read = h.send(request("GET", "/api/chats/c1/messages", None, Some(&intruder))).await;
    assert_eq!(read.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat_message").await, 0);
}

#[tokio::test]
async fn guest_quota_returns_429_with_retry_after() {
    let llm = ScriptedLlmClient::new().with_text_reply("ok");
    let h = harness(llm, |config| config.rate_limit.guest.standard = 1).await;

    let first = h.send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    text(first).await;

    let second =
        h.send(request("POST", "/api/chat", Some(user_turn("c1", "m2", "again")), None)).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = second
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .expect("retry-after header");
    assert!(retry_after > 0);
    assert_eq!(json_body(second).await["error"]["code"], "rate_limited");

    let reasoning = h
        .send(request(
            "POST",
            "/api/chat",
            Some(json!({
                "id": "c2",
                "selectedChatModel": "chat-model-reasoning",
                "messages": [{"id": "m3", "role": "user", "content": "think"}]
            })),
            None,
        ))
        .await;
    assert_eq!(reasoning.status(), StatusCode::TOO_MANY_REQUESTS, "guests get no reasoning quota");
}

fn forwarded_for(mut request: Request<Body>, addr: &str) -> Request<Body> {
    request.headers_mut().insert("x-forwarded-for", addr.parse().expect("header value"));
    request
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_guest_quota() {
    let llm = ScriptedLlmClient::new().with_text_reply("ok");
    let h = harness(llm, |config| config.rate_limit.guest.standard = 1).await;

    let first = h
        .send(forwarded_for(
            request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), None),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    text(first).await;

    let second = h
        .send(forwarded_for(
            request("POST", "/api/chat", Some(user_turn("c1", "m2", "again")), None),
            "198.51.100.2",
        ))
        .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn trusted_proxy_header_separates_guests() {
    let llm = ScriptedLlmClient::new().with_text_reply("ok").with_text_reply("ok");
    let h = harness(llm, |config| {
        config.rate_limit.guest.standard = 1;
        config.server.trust_forwarded_for = true;
    })
    .await;

    for (chat, message, addr) in [("c1", "m1", "198.51.100.1"), ("c2", "m2", "198.51.100.2")] {
        let response = h
            .send(forwarded_for(
                request("POST", "/api/chat", Some(user_turn(chat, message, "hi")), None),
                addr,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{addr} has its own quota");
        text(response).await;
    }
}

#[tokio::test]
async fn foreign_chat_is_forbidden_before_the_agent_is_looked_up() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;
    h.seed_user("u1").await;
    let intruder = h.seed_user("u2").await;
    SqlChatRepository::new(h.pool.clone())
        .create_if_absent(Chat::new(
            ChatId("c1".to_string()),
            Some(UserId("u1".to_string())),
            None,
            "Private",
        ))
        .await
        .expect("seed chat");

    let mut body = user_turn("c1", "m1", "hi");
    body["agentId"] = json!("no-such-agent");
    let response = h.send(request("POST", "/api/chat", Some(body), Some(&intruder))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn message_id_from_another_chat_is_rejected() {
    let llm = ScriptedLlmClient::new().with_text_reply("first reply");
    let h = harness(llm, |_| {}).await;
    let owner = h.seed_user("u1").await;
    let other = h.seed_user("u2").await;

    let first = h
        .send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hi")), Some(&owner)))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    text(first).await;

    let replay = json!({
        "id": "c2",
        "messages": [{
            "id": "m1",
            "role": "assistant",
            "parts": [{
                "type": "tool-invocation",
                "toolInvocation": {
                    "state": "result",
                    "toolCallId": "call-1",
                    "toolName": "capture_lead",
                    "args": {},
                    "result": "Yes, confirmed."
                }
            }]
        }]
    });
    let response = h.send(request("POST", "/api/chat", Some(replay), Some(&other))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat WHERE id = 'c2'").await, 0);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat_message WHERE chat_id = 'c1'").await, 2);
}

#[tokio::test]
async fn unknown_agent_is_404() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;
    let mut body = user_turn("c1", "m1", "hi");
    body["agentId"] = json!("ghost");

    let response = h.send(request("POST", "/api/chat", Some(body), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.count("SELECT COUNT(*) FROM chat").await, 0);
}

#[tokio::test]
async fn approved_capture_lead_is_executed_once() {
    let call = ToolCall {
        id: "call-1".to_string(),
        name: "capture_lead".to_string(),
        args: json!({
            "name": "Ana",
            "email": "ana@acme.com",
            "qualificationScore": 80,
            "qualificationReason": "budget confirmed"
        }),
    };
    let llm = ScriptedLlmClient::new()
        .with_tool_call(call)
        .with_text_reply("Saved, thanks!")
        .with_text_reply("Anything else?");
    let h = harness(llm, |_| {}).await;
    let token = h.seed_user("u1").await;

    let created = h
        .send(request(
            "POST",
            "/api/agents",
            Some(json!({"name": "Sales desk", "type": "lead_capture"})),
            Some(&token),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let agent_id = json_body(created).await["id"].as_str().expect("agent id").to_string();

    let mut first_turn = user_turn("c1", "m1", "I'm Ana from Acme, ana@acme.com");
    first_turn["agentId"] = json!(agent_id);
    let first = h.send(request("POST", "/api/chat", Some(first_turn), Some(&token))).await;
    let parts = stream_parts(&text(first).await);
    assert!(parts.iter().any(|(code, _)| code == "9"), "tool call is streamed");
    assert!(!parts.iter().any(|(code, _)| code == "a"), "approval tools wait for the user");
    assert_eq!(h.count("SELECT COUNT(*) FROM lead").await, 0);

    let history = json_body(h.send(request("GET", "/api/chats/c1/messages", None, Some(&token))).await).await;
    let mut assistant = history.as_array().and_then(|m| m.last()).cloned().expect("assistant");
    assert_eq!(assistant["role"], "assistant");
    for part in assistant["parts"].as_array_mut().expect("parts") {
        if part["type"] == "tool-invocation" {
            part["toolInvocation"]["state"] = json!("result");
            part["toolInvocation"]["result"] = json!("Yes, confirmed.");
        }
    }

    let approval = json!({"id": "c1", "messages": [assistant.clone()]});
    let second = h.send(request("POST", "/api/chat", Some(approval.clone()), Some(&token))).await;
    assert_eq!(second.status(), StatusCode::OK);
    let parts = stream_parts(&text(second).await);
    let result = parts
        .iter()
        .find(|(code, _)| code == "a")
        .map(|(_, payload)| payload.clone())
        .expect("tool result part");
    assert_eq!(result["toolCallId"], "call-1");
    assert_eq!(result["result"]["status"], "captured");

    // Resending the same approval replays the stored result instead of capturing again.
    let third = h.send(request("POST", "/api/chat", Some(approval), Some(&token))).await;
    text(third).await;
    assert_eq!(h.count("SELECT COUNT(*) FROM lead").await, 1);

    let leads = json_body(
        h.send(request("GET", &format!("/api/agents/{agent_id}/leads"), None, Some(&token))).await,
    )
    .await;
    assert_eq!(leads.as_array().map(Vec::len), Some(1));
    assert_eq!(leads[0]["email"], "ana@acme.com");
    assert_eq!(leads[0]["qualificationScore"], 80);
}

#[tokio::test]
async fn chat_rpcs_follow_ownership_and_visibility() {
    let llm = ScriptedLlmClient::new().with_text_reply("Hello!").with_completion("Greeting chat");
    let h = harness(llm, |_| {}).await;
    let token = h.seed_user("u1").await;

    let turn = h.send(request("POST", "/api/chat", Some(user_turn("c1", "m1", "hello")), Some(&token))).await;
    text(turn).await;

    let listed = json_body(h.send(request("GET", "/api/chats?limit=10", None, Some(&token))).await).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["title"], "Greeting chat");
    assert_eq!(listed[0]["visibility"], "private");

    let anonymous = h.send(request("GET", "/api/chats/c1", None, None)).await;
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

    let renamed = h
        .send(request("PATCH", "/api/chats/c1/title", Some(json!({"title": "  Renamed  "})), Some(&token)))
        .await;
    assert_eq!(json_body(renamed).await["title"], "Renamed");

    let public = h
        .send(request(
            "PATCH",
            "/api/chats/c1/visibility",
            Some(json!({"visibility": "public"})),
            Some(&token),
        ))
        .await;
    assert_eq!(public.status(), StatusCode::OK);
    let shared = h.send(request("GET", "/api/chats/c1/messages", None, None)).await;
    assert_eq!(shared.status(), StatusCode::OK);
    assert_eq!(json_body(shared).await.as_array().map(Vec::len), Some(2));

    let trimmed = h
        .send(request("DELETE", "/api/chats/c1/messages/after/m1", None, Some(&token)))
        .await;
    assert_eq!(json_body(trimmed).await["deleted"], 2);

    let removed = h.send(request("DELETE", "/api/chats/c1", None, Some(&token))).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    let gone = h.send(request("GET", "/api/chats/c1", None, Some(&token))).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn agent_crud_requires_the_owner() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;
    let owner = h.seed_user("u1").await;
    let other = h.seed_user("u2").await;

    let invalid = h
        .send(request("POST", "/api/agents", Some(json!({"name": "x", "type": "robot"})), Some(&owner)))
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let created = h
        .send(request(
            "POST",
            "/api/agents",
            Some(json!({"name": "Support", "instructions": "Be kind."})),
            Some(&owner),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let agent = json_body(created).await;
    let uri = format!("/api/agents/{}", agent["id"].as_str().expect("id"));
    assert_eq!(agent["type"], "assistant");

    let updated = h
        .send(request(
            "PATCH",
            &uri,
            Some(json!({"name": "Support desk", "webhookUrl": "https://hooks.example.com/x"})),
            Some(&owner),
        ))
        .await;
    let updated = json_body(updated).await;
    assert_eq!(updated["name"], "Support desk");
    assert_eq!(updated["webhookUrl"], "https://hooks.example.com/x");

    let foreign = h.send(request("GET", &uri, None, Some(&other))).await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
    let unauthenticated = h.send(request("GET", "/api/agents", None, None)).await;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let listed = json_body(h.send(request("GET", "/api/agents", None, Some(&owner))).await).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let deleted = h.send(request("DELETE", &uri, None, Some(&owner))).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let missing = h.send(request("GET", &uri, None, Some(&owner))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_endpoint_returns_the_current_user() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;
    let token = h.seed_user("u1").await;

    let session = json_body(h.send(request("GET", "/api/auth/session", None, Some(&token))).await).await;
    assert_eq!(session["user"]["email"], "u1@example.com");
    assert_eq!(session["user"]["tier"], "free");

    let anonymous = h.send(request("GET", "/api/auth/session", None, None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(anonymous).await;
    assert!(body["error"]["correlationId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn health_reports_database_readiness() {
    let h = harness(ScriptedLlmClient::new(), |_| {}).await;

    let response = h.send(request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database"]["status"], "ready");
}
