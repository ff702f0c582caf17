// src/firewall/db_monitor.rs - passive observer over executed SQL
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::verdict::LayerId;
use crate::config::FirewallConfig;
use crate::services::audit::{AuditAction, AuditEntry, AuditLog};

const LAYER: LayerId = LayerId::DbInjectionMonitor;
const TRACE_FRAMES: usize = 5;

lazy_static! {
    static ref SUSPICIOUS_SQL: Vec<(&'static str, Regex)> = [
        ("union_select", r"UNION.*SELECT"),
        ("drop_table", r"DROP.*TABLE"),
        ("truncate", r"TRUNCATE"),
        ("tautological_delete", r"DELETE.*FROM.*WHERE.*1.*=.*1"),
        ("exec", r"EXEC\s*\("),
        ("execute", r"EXECUTE\s*\("),
    ]
    .iter()
    .map(|(name, p)| (*name, Regex::new(&format!("(?is){}", p)).expect("valid monitor pattern")))
    .collect();
}

#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub sql: String,
    pub bindings: Vec<String>,
    pub elapsed: Duration,
}

pub trait QueryObserver: Send + Sync {
    fn on_query(&self, event: &QueryEvent);
}

/// Where the database layer announces executed queries. Observers are registered explicitly.
#[derive(Default)]
pub struct QueryObserverRegistry {
    observers: RwLock<Vec<Arc<dyn QueryObserver>>>,
}

impl QueryObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn QueryObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observer);
    }

    pub fn dispatch(&self, event: &QueryEvent) {
        let observers = self.observers.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        for observer in observers.iter() {
            observer.on_query(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    Suspicious { pattern: &'static str },
    Slow { elapsed: Duration },
}

/// Flags suspicious and slow queries. Detection only; nothing is blocked here.
pub struct DbInjectionMonitor {
    slow_threshold: Duration,
    audit: Arc<AuditLog>,
    installed: AtomicBool,
}

impl DbInjectionMonitor {
    pub fn new(config: &FirewallConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            slow_threshold: config.slow_query_threshold,
            audit,
            installed: AtomicBool::new(false),
        }
    }

    /// Registers the monitor once; later calls are no-ops and return false.
    pub fn install(self: &Arc<Self>, registry: &QueryObserverRegistry) -> bool {
        if self.installed.swap(true, Ordering::SeqCst) {
            return false;
        }
        registry.register(self.clone());
        tracing::info!("Database injection monitor installed");
        true
    }

    pub fn inspect(&self, event: &QueryEvent) -> Vec<Finding> {
        let mut findings: Vec<Finding> = SUSPICIOUS_SQL
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&event.sql))
            .map(|(name, _)| Finding::Suspicious { pattern: name })
            .collect();
        if event.elapsed > self.slow_threshold {
            findings.push(Finding::Slow { elapsed: event.elapsed });
        }
        findings
    }
}

impl QueryObserver for DbInjectionMonitor {
    fn on_query(&self, event: &QueryEvent) {
        for finding in self.inspect(event) {
            match finding {
                Finding::Suspicious { pattern } => {
                    tracing::error!(
                        severity = "critical",
                        pattern,
                        sql = %event.sql,
                        bindings = ?event.bindings,
                        elapsed_ms = event.elapsed.as_millis() as u64,
                        trace = %short_backtrace(TRACE_FRAMES),
                        "Suspicious database query detected"
                    );
                    self.audit
                        .record(AuditEntry::new(LAYER, AuditAction::SuspiciousQuery).payload(&event.sql));
                }
                Finding::Slow { elapsed } => {
                    tracing::warn!(sql = %event.sql, elapsed_ms = elapsed.as_millis() as u64, "Slow query detected");
                    self.audit.record(AuditEntry::new(LAYER, AuditAction::SlowQuery).payload(&event.sql));
                }
            }
        }
    }
}

/// The first `frames` frames of the current call stack, one per line.
fn short_backtrace(frames: usize) -> String {
    let trace = std::backtrace::Backtrace::force_capture().to_string();
    let mut out = Vec::new();
    let mut seen = 0;
    for line in trace.lines() {
        let starts_frame = line
            .trim_start()
            .split_once(':')
            .map_or(false, |(index, _)| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()));
        if starts_frame {
            seen += 1;
            if seen > frames {
                break;
            }
        }
        if seen > 0 {
            out.push(line.trim());
        }
    }
    out.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(sql: &str, elapsed_ms: u64) -> QueryEvent {
        QueryEvent {
            sql: sql.to_string(),
            bindings: Vec::new(),
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    fn monitor() -> (Arc<DbInjectionMonitor>, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new(Duration::from_secs(3600)));
        let monitor = Arc::new(DbInjectionMonitor::new(&FirewallConfig::default(), audit.clone()));
        (monitor, audit)
    }

    #[test]
    fn test_suspicious_patterns() {
        let (monitor, _) = monitor();
        assert_eq!(
            monitor.inspect(&event("SELECT name FROM users WHERE id = 1 UNION SELECT password FROM admins", 3)),
            vec![Finding::Suspicious { pattern: "union_select" }]
        );
        assert!(!monitor.inspect(&event("drop table users", 1)).is_empty());
        assert!(!monitor.inspect(&event("DELETE FROM logs WHERE 1 = 1", 1)).is_empty());
        assert!(!monitor.inspect(&event("EXEC('xp_cmdshell')", 1)).is_empty());
        assert!(monitor.inspect(&event("SELECT id, body FROM notes WHERE body LIKE ?", 2)).is_empty());
    }

    #[test]
    fn test_slow_query_threshold() {
        let (monitor, _) = monitor();
        assert!(monitor.inspect(&event("SELECT 1", 1000)).is_empty());
        assert_eq!(
            monitor.inspect(&event("SELECT 1", 1500)),
            vec![Finding::Slow { elapsed: Duration::from_millis(1500) }]
        );
    }

    #[test]
    fn test_install_once_and_record_findings() {
        let (monitor, audit) = monitor();
        let registry = QueryObserverRegistry::new();

        assert!(monitor.install(&registry));
        assert!(!monitor.install(&registry));
        assert_eq!(registry.len(), 1);

        registry.dispatch(&event("TRUNCATE sessions", 1));
        registry.dispatch(&event("SELECT 1", 5));
        let recent = audit.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, AuditAction::SuspiciousQuery);
        assert_eq!(recent[0].layer, LayerId::DbInjectionMonitor);
    }

    struct Counter(AtomicUsize);

    impl QueryObserver for Counter {
        fn on_query(&self, _: &QueryEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_registry_fans_out() {
        let registry = QueryObserverRegistry::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        registry.register(a.clone());
        registry.register(b.clone());

        registry.dispatch(&event("SELECT 1", 1));
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }
}
