//! Sliding-window message quotas per subscription tier.
//!
//! Every key (`tier:message_type:subject`) keeps the instants of its accepted
//! requests inside the current window. A request is admitted while the count
//! stays at or below the tier's limit for that message type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::domain::user::Tier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Standard,
    Reasoning,
}

impl MessageType {
    /// Reasoning models are billed separately from regular chat turns.
    pub fn for_model(model_id: &str) -> Self {
        if model_id.to_ascii_lowercase().contains("reasoning") {
            Self::Reasoning
        } else {
            Self::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Reasoning => "reasoning",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Limited { retry_after_secs } => Some(*retry_after_secs),
            Self::Allowed { .. } => None,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(
        &self,
        tier: Tier,
        message_type: MessageType,
        subject: &str,
    ) -> RateLimitDecision;
}

/// Admits everything; used when rate limiting is disabled.
#[derive(Clone, Debug, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(
        &self,
        _tier: Tier,
        _message_type: MessageType,
        _subject: &str,
    ) -> RateLimitDecision {
        RateLimitDecision::Allowed { remaining: u32::MAX }
    }
}

#[derive(Debug, Default)]
struct Window {
    requests: Vec<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.requests.retain(|&t| now.saturating_duration_since(t) < window);
    }
}

#[derive(Clone, Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    limits: HashMap<(Tier, MessageType), u32>,
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, limits: HashMap<(Tier, MessageType), u32>) -> Self {
        Self { window, limits, windows: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut limits = HashMap::new();
        for (tier, quota) in [
            (Tier::Guest, &config.guest),
            (Tier::Free, &config.free),
            (Tier::Pro, &config.pro),
            (Tier::Enterprise, &config.enterprise),
        ] {
            limits.insert((tier, MessageType::Standard), quota.standard);
            limits.insert((tier, MessageType::Reasoning), quota.reasoning);
        }
        Self::new(Duration::from_secs(config.window_secs), limits)
    }

    fn limit_for(&self, tier: Tier, message_type: MessageType) -> u32 {
        self.limits.get(&(tier, message_type)).copied().unwrap_or(0)
    }

    /// Drops windows that no longer hold any request.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows.values_mut().for_each(|window| window.prune(now, self.window));
        windows.retain(|_, window| !window.requests.is_empty());
        windows.len()
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(
        &self,
        tier: Tier,
        message_type: MessageType,
        subject: &str,
    ) -> RateLimitDecision {
        let limit = self.limit_for(tier, message_type);
        if limit == 0 {
            return RateLimitDecision::Limited { retry_after_secs: self.window.as_secs().max(1) };
        }

        let key = format!("{}:{}:{subject}", tier.as_str(), message_type.as_str());
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key).or_default();
        window.prune(now, self.window);

        if window.requests.len() as u32 >= limit {
            let oldest = window.requests.first().copied().unwrap_or(now);
            let elapsed = now.saturating_duration_since(oldest);
            let wait = self.window.saturating_sub(elapsed);
            let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            return RateLimitDecision::Limited { retry_after_secs: retry_after_secs.max(1) };
        }

        window.requests.push(now);
        RateLimitDecision::Allowed { remaining: limit - window.requests.len() as u32 }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{MessageType, NoopRateLimiter, RateLimitDecision, RateLimiter, SlidingWindowLimiter};
    use crate::config::AppConfig;
    use crate::domain::user::Tier;

    fn limiter(limit: u32) -> SlidingWindowLimiter {
        let mut limits = HashMap::new();
        limits.insert((Tier::Free, MessageType::Standard), limit);
        SlidingWindowLimiter::new(Duration::from_secs(60), limits)
    }

    #[test]
    fn reasoning_models_are_detected_by_id() {
        assert_eq!(MessageType::for_model("chat-model-reasoning"), MessageType::Reasoning);
        assert_eq!(MessageType::for_model("chat-model"), MessageType::Standard);
    }

    #[tokio::test(start_paused = true)]
    async fn limits_within_window_and_recovers_after_it_slides() {
        let limiter = limiter(2);

        assert_eq!(
            limiter.check(Tier::Free, MessageType::Standard, "u1").await,
            RateLimitDecision::Allowed { remaining: 1 }
        );
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(limiter.check(Tier::Free, MessageType::Standard, "u1").await.is_allowed());

        let limited = limiter.check(Tier::Free, MessageType::Standard, "u1").await;
        assert_eq!(limited.retry_after(), Some(40));

        tokio::time::advance(Duration::from_secs(41)).await;
        assert_eq!(
            limiter.check(Tier::Free, MessageType::Standard, "u1").await,
            RateLimitDecision::Allowed { remaining: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subjects_and_message_types_are_isolated() {
        let limiter = limiter(1);

        assert!(limiter.check(Tier::Free, MessageType::Standard, "u1").await.is_allowed());
        assert!(limiter.check(Tier::Free, MessageType::Standard, "u2").await.is_allowed());
        assert!(!limiter.check(Tier::Free, MessageType::Standard, "u1").await.is_allowed());

        // No quota configured for reasoning on the free tier.
        assert!(!limiter.check(Tier::Free, MessageType::Reasoning, "u1").await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_expired_windows() {
        let limiter = limiter(5);
        limiter.check(Tier::Free, MessageType::Standard, "u1").await;
        assert_eq!(limiter.sweep().await, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.sweep().await, 0);
    }

    #[tokio::test]
    async fn default_config_gives_paid_tiers_more_room() {
        let config = AppConfig::default();
        let limiter = SlidingWindowLimiter::from_config(&config.rate_limit);

        assert!(limiter.limit_for(Tier::Pro, MessageType::Standard)
            > limiter.limit_for(Tier::Guest, MessageType::Standard));
        assert!(NoopRateLimiter.check(Tier::Guest, MessageType::Reasoning, "x").await.is_allowed());
    }
}
