// src/services/audit.rs - append-only firewall event log
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::firewall::{LayerId, Reason};
use crate::utils::patterns::{truncate, LOG_SAMPLE_LEN};

const TOP_BLOCKED_IPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Blocked,
    SuspiciousQuery,
    SlowQuery,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub layer: LayerId,
    pub ip: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub action: AuditAction,
    pub reason: Option<Reason>,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "ttl_seconds", serialize_with = "serialize_ttl")]
    pub ttl: Option<Duration>,
}

fn serialize_ttl<S: serde::Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match ttl {
        Some(d) => s.serialize_some(&d.as_secs()),
        None => s.serialize_none(),
    }
}

impl AuditEntry {
    pub fn new(layer: LayerId, action: AuditAction) -> Self {
        Self {
            layer,
            ip: None,
            method: None,
            path: None,
            action,
            reason: None,
            payload: None,
            created_at: Utc::now(),
            ttl: None,
        }
    }

    pub fn ip(mut self, ip: impl ToString) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn request(mut self, method: impl ToString, path: impl ToString) -> Self {
        self.method = Some(method.to_string());
        self.path = Some(path.to_string());
        self
    }

    pub fn reason(mut self, reason: Option<Reason>) -> Self {
        self.reason = reason;
        self
    }

    /// Stores at most the first 100 characters.
    pub fn payload(mut self, payload: &str) -> Self {
        self.payload = Some(truncate(payload, LOG_SAMPLE_LEN));
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountBy<K> {
    pub key: K,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallStatistics {
    pub lifetime_requests: u64,
    pub lifetime_blocked: u64,
    pub blocked_requests: u64,
    pub by_layer: Vec<CountBy<LayerId>>,
    pub top_blocked_ips: Vec<CountBy<String>>,
}

pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    retention: Duration,
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
}

impl AuditLog {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention,
            total_requests: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
        }
    }

    pub fn count_request(&self, blocked: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if blocked {
            self.blocked_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        self.lock().push_back(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Removes entries older than their own TTL, or the log retention when they have none.
    pub fn prune(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| {
            let keep_for = entry.ttl.unwrap_or(self.retention);
            match chrono::Duration::from_std(keep_for) {
                Ok(keep_for) => entry.created_at + keep_for > now,
                Err(_) => true,
            }
        });
        before - entries.len()
    }

    pub fn statistics(&self, window: chrono::Duration) -> FirewallStatistics {
        let since = Utc::now() - window;
        let entries = self.lock();

        let mut by_layer: HashMap<LayerId, u64> = HashMap::new();
        let mut by_ip: HashMap<String, u64> = HashMap::new();
        let mut blocked = 0;

        for entry in entries
            .iter()
            .filter(|e| e.action == AuditAction::Blocked && e.created_at >= since)
        {
            blocked += 1;
            *by_layer.entry(entry.layer).or_default() += 1;
            if let Some(ip) = &entry.ip {
                *by_ip.entry(ip.clone()).or_default() += 1;
            }
        }

        FirewallStatistics {
            lifetime_requests: self.total_requests.load(Ordering::Relaxed),
            lifetime_blocked: self.blocked_requests.load(Ordering::Relaxed),
            blocked_requests: blocked,
            by_layer: sorted_counts(by_layer, usize::MAX),
            top_blocked_ips: sorted_counts(by_ip, TOP_BLOCKED_IPS),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sorted_counts<K: Ord + Clone>(counts: HashMap<K, u64>, limit: usize) -> Vec<CountBy<K>> {
    let mut counts: Vec<CountBy<K>> = counts.into_iter().map(|(key, count)| CountBy { key, count }).collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    counts.truncate(limit);
    counts
}
