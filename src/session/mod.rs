//! Session state: the append-only chunk log, its producer, and its lifecycle.

pub mod manager;
pub mod producer;
pub mod publisher;
pub mod store;

pub use manager::SessionManager;
pub use store::{Chunk, Session, SessionId, SessionStore, StoreError, Terminal};
