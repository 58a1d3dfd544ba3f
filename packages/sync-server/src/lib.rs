//! # RouteVN Sync Server
//!
//! Reference implementation of the server side of the collaboration
//! protocol: token auth, partition authorization, validation of legacy
//! event envelopes, and an idempotent commit log with per-partition
//! materialization cursors.
//!
//! ## Surfaces
//!
//! - `SyncServer`: transport-agnostic core, driven with `ClientMessage`s
//! - `LoopbackTransport`: in-process client `Transport` for tests and
//!   embedding, with fault injection
//! - `serve`: WebSocket listener used by the `routevn-sync-server` binary

pub mod auth;
pub mod authorization;
pub mod errors;
pub mod log;
pub mod loopback;
pub mod server;
pub mod validation;
pub mod ws;

pub use auth::{AuthError, ConventionTokenVerifier, Identity, TokenVerifier};
pub use authorization::{AllowAll, PartitionAuthorizer, ProjectGrants};
pub use errors::ServerError;
pub use log::{CommitLog, Outcome};
pub use loopback::LoopbackTransport;
pub use server::{ConnectionId, SyncServer};
pub use validation::{validate, EventPayloadValidator, LegacyPayloadValidator, ValidationError};
pub use ws::serve;
