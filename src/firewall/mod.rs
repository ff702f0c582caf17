// src/firewall/mod.rs - the layered request firewall
pub mod context;
pub mod db_monitor;
pub mod encoding;
pub mod guard;
pub mod layers;
pub mod pipeline;
pub mod response;
pub mod verdict;

#[cfg(test)]
pub mod testing;

pub use context::{RequestContext, UploadedFile};
pub use db_monitor::{DbInjectionMonitor, QueryEvent, QueryObserver, QueryObserverRegistry};
pub use pipeline::{Collaborators, Decision, Firewall};
pub use response::CspNonce;
pub use verdict::{LayerId, Outcome, Reason, Verdict, VerdictData};
