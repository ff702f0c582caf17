// src/auth/mod.rs
pub mod session;

pub use session::{AuthenticatedUser, MemorySessionStore, PendingSession, SessionHandle, SessionStore};
