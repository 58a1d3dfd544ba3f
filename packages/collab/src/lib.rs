//! # RouteVN Collaboration Session
//!
//! Client half of project collaboration: buffers local edits as commands,
//! flushes them to the sync server, and keeps a projection of the project
//! built only from server-committed events.
//!
//! ## Write Path
//!
//! ```text
//! LegacyEvent ─► CommandBuilder ─► drafts ─► flush_drafts ─► Transport ─► server
//!                                                                          │
//! state() ◄── projection ◄── committed / sync_response ◄───────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Single writer**: the projection is private to this crate; callers
//!    change project state only by submitting commands
//! 2. **Explicit durability**: a draft is durable once `flush_drafts`
//!    returns; what happens to the rest on `stop` is the `DraftPolicy`
//! 3. **Fail closed**: a session that could not authenticate is `Stopped`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use routevn_collab::{CollabSession, SessionConfig, WebSocketTransport};
//! use routevn_protocol::{Actor, LegacyEvent};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), routevn_collab::CollabError> {
//! let config = SessionConfig::new("p1", "user:u1:client:c1", Actor::new("u1", "c1"));
//! let transport = Arc::new(WebSocketTransport::new(config.label.clone(), config.url.clone()));
//! let session = CollabSession::new(config, transport);
//!
//! session.start().await?;
//! session.submit_legacy_event(LegacyEvent::set("story.title", json!("Demo")))?;
//! session.flush_drafts().await?;
//! session.sync_now(None).await?;
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cursor_store;
pub mod errors;
mod projection;
pub mod session;
pub mod transport;

pub use config::{DraftPolicy, ReconnectPolicy, SessionConfig, DEFAULT_TRANSPORT_LABEL};
pub use cursor_store::{cursor_key, CursorStore, FileCursorStore, MemoryCursorStore};
pub use errors::{CollabError, ConfigError, StoreError};
pub use session::{CollabSession, CommandRejection, LastError, SessionIdentity, SessionStatus};
pub use transport::WebSocketTransport;
