// src/firewall/layers/bot_detection.rs
use axum::http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict, VerdictData};
use crate::middleware::cache::CacheStore;

const LAYER: LayerId = LayerId::BotDetection;

lazy_static! {
    static ref BOT_SIGNATURE: Regex =
        Regex::new(r"(?i)bot|crawler|spider|scraper|curl|wget|python|java").expect("valid bot regex");
    static ref SCRAPER_PATH: Regex = Regex::new(r"(?i)\.php$|admin|wp-|\.env").expect("valid path regex");
}

// Signals are summed in tenths so threshold comparisons stay exact.
const FREQUENCY_POINTS: u32 = 3;
const NO_LANGUAGE_POINTS: u32 = 2;
const NO_ENCODING_POINTS: u32 = 2;
const SCRAPER_PATH_POINTS: u32 = 3;
const MAX_POINTS: u32 = 10;

pub struct BotDetector {
    config: Arc<FirewallConfig>,
    cache: Arc<dyn CacheStore>,
}

impl BotDetector {
    pub fn new(config: Arc<FirewallConfig>, cache: Arc<dyn CacheStore>) -> Self {
        Self { config, cache }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        let user_agent = ctx.user_agent();
        let lowered = user_agent.to_lowercase();

        if self.config.allowed_bots.iter().any(|bot| lowered.contains(&bot.to_lowercase())) {
            return Verdict::allow_because(LAYER, Reason::AllowedBot);
        }

        if user_agent.is_empty() || BOT_SIGNATURE.is_match(user_agent) {
            self.record_blocked(ctx).await;
            return Verdict::deny(LAYER, Reason::SuspiciousBot, StatusCode::FORBIDDEN, "Bot activity detected");
        }

        let score = match self.behaviour_score(ctx).await {
            Ok(score) => score,
            Err(verdict) => return verdict,
        };

        if score > self.config.bot_threshold {
            tracing::warn!(ip = %ctx.ip, path = %ctx.route, score, "Automated behaviour detected");
            return Verdict::deny(LAYER, Reason::BotBehavior, StatusCode::FORBIDDEN, "Automated behavior detected")
                .with_data(VerdictData::RiskScore(score));
        }

        Verdict::allow(LAYER).with_data(VerdictData::RiskScore(score))
    }

    /// Risk in `[0, 1]` from request rate, missing browser headers and probe-like paths.
    pub async fn behaviour_score(&self, ctx: &RequestContext) -> Result<f64, Verdict> {
        let key = format!("bot_detect:requests:{}", ctx.ip);
        let seen = guarded(
            LAYER,
            self.config.bot_fail_policy,
            self.config.collaborator_timeout,
            self.cache.increment(&key, self.config.bot_window),
        )
        .await?;

        let mut points = 0;
        // `seen` includes this request; the threshold applies to earlier ones.
        if seen.saturating_sub(1) > self.config.bot_request_limit {
            points += FREQUENCY_POINTS;
        }
        if ctx.header("accept-language").map_or(true, str::is_empty) {
            points += NO_LANGUAGE_POINTS;
        }
        if ctx.header("accept-encoding").map_or(true, str::is_empty) {
            points += NO_ENCODING_POINTS;
        }
        if SCRAPER_PATH.is_match(&ctx.route) {
            points += SCRAPER_PATH_POINTS;
        }

        Ok(f64::from(points.min(MAX_POINTS)) / 10.0)
    }

    async fn record_blocked(&self, ctx: &RequestContext) {
        let key = format!("bot_detect:blocked:{}", ctx.ip);
        let count = guarded(
            LAYER,
            self.config.bot_fail_policy,
            self.config.collaborator_timeout,
            self.cache.increment(&key, self.config.bot_window),
        )
        .await
        .unwrap_or(1);
        tracing::info!(ip = %ctx.ip, user_agent = ctx.user_agent(), count, "Bot activity detected");
    }
}
