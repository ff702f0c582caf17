// src/firewall/layers/rate_limit.rs
use axum::http::StatusCode;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict, VerdictData};
use crate::storage::RateCounter;

const LAYER: LayerId = LayerId::RateLimiter;

pub struct RateLimiter {
    config: Arc<FirewallConfig>,
    counter: Arc<dyn RateCounter>,
}

impl RateLimiter {
    pub fn new(config: Arc<FirewallConfig>, counter: Arc<dyn RateCounter>) -> Self {
        Self { config, counter }
    }

    /// `rate_limit:{ip}:{route}:{user}`, with `guest` for anonymous requests.
    pub fn key_for(ctx: &RequestContext) -> String {
        let user = ctx.user.as_ref().map(|u| u.id.as_str()).unwrap_or("guest");
        format!("rate_limit:{}:{}:{}", ctx.ip, ctx.route, user)
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        let policy = self.config.rate_limit_for(&ctx.route);
        let key = Self::key_for(ctx);
        let (fail, timeout) = (self.config.rate_fail_policy, self.config.collaborator_timeout);

        let allowed = match guarded(
            LAYER,
            fail,
            timeout,
            self.counter.check_and_increment(&key, policy.max_attempts, policy.decay),
        )
        .await
        {
            Ok(allowed) => allowed,
            Err(verdict) => return verdict,
        };

        if allowed {
            return Verdict::allow(LAYER);
        }

        // Retry-After is best effort; a failing lookup still denies.
        let retry_after = guarded(LAYER, fail, timeout, self.counter.available_in(&key))
            .await
            .unwrap_or(policy.decay.as_secs());

        tracing::warn!(ip = %ctx.ip, path = %ctx.route, retry_after, "Rate limit exceeded");
        Verdict::deny(
            LAYER,
            Reason::RateLimitExceeded,
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
        .with_data(VerdictData::RetryAfter(retry_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::config::RateLimitPolicy;
    use crate::firewall::testing::{RequestBuilder, Stalled};
    use crate::storage::MemoryRateCounter;
    use std::time::Duration;

    fn limiter(max: u32) -> (RateLimiter, Arc<MemoryRateCounter>) {
        let config = FirewallConfig {
            rate_limits: vec![("login".into(), RateLimitPolicy { max_attempts: max, decay: Duration::from_secs(60) })],
            ..FirewallConfig::default()
        };
        let counter = Arc::new(MemoryRateCounter::new());
        (RateLimiter::new(Arc::new(config), counter.clone()), counter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_attempt_is_throttled_until_window_resets() {
        let (limiter, _) = limiter(5);
        let ctx = RequestBuilder::post("/login").build();

        for _ in 0..5 {
            assert!(limiter.evaluate(&ctx).await.is_allowed());
        }
        let verdict = limiter.evaluate(&ctx).await;
        assert_eq!(verdict.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(verdict.data, Some(VerdictData::RetryAfter(60)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.evaluate(&ctx).await.is_allowed());
    }

    #[tokio::test]
    async fn test_clear_resets_counter() {
        let (limiter, counter) = limiter(1);
        let ctx = RequestBuilder::post("/login").build();

        assert!(limiter.evaluate(&ctx).await.is_allowed());
        assert!(!limiter.evaluate(&ctx).await.is_allowed());

        counter.clear(&RateLimiter::key_for(&ctx)).await.unwrap();
        assert!(limiter.evaluate(&ctx).await.is_allowed());
    }

    #[tokio::test]
    async fn test_users_have_separate_buckets() {
        let (limiter, _) = limiter(1);
        let guest = RequestBuilder::post("/login").build();
        let member = RequestBuilder::post("/login")
            .user(AuthenticatedUser { id: "9".into(), two_factor_secret: None })
            .build();

        assert_eq!(RateLimiter::key_for(&member), "rate_limit:203.0.113.10:login:9");
        assert!(limiter.evaluate(&guest).await.is_allowed());
        assert!(limiter.evaluate(&member).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_counter_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FirewallConfig::default()), Arc::new(Stalled));
        let verdict = limiter.evaluate(&RequestBuilder::get("/").build()).await;
        assert!(verdict.is_allowed());
        assert_eq!(verdict.reason, Some(Reason::LayerError));
    }
}
