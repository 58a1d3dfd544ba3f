//! # RouteVN Collaboration Protocol
//!
//! Bridges the path-addressed legacy edit vocabulary onto partitioned,
//! idempotent commands and defines what travels between a client session
//! and the sync server.
//!
//! ## Pipeline
//!
//! ```text
//! LegacyEvent ──► TargetPath::parse ──► resolve_partitions ──► Command ──► SubmitItem
//!  (set, node*)     (tagged matcher)     [coarse, fine?]       (id, actor)   (wire envelope)
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure resolution**: identical `(project_id, event)` always yields
//!    identical partitions
//! 2. **Reproducible ids**: a command id is derived from its content plus a
//!    submission nonce, so a retry carries the same id
//! 3. **Wire compatibility**: field names match the legacy JSON exactly

pub mod command;
pub mod legacy;
pub mod partition;
pub mod path;
pub mod transport;
pub mod wire;

pub use command::{
    build_command, Actor, Command, CommandBuilder, CommandError, CommandNonce, CommandPayload,
    COMMAND_VERSION, LEGACY_EVENT_SCHEMA,
};
pub use legacy::{LegacyEvent, LegacyEventKind, LegacyOptions, LegacyPayload};
pub use partition::{partition_for, resolve_partitions, unique_partitions, Domain};
pub use path::{CharacterPath, LayoutPath, ScenePath, TargetPath};
pub use transport::{
    ConnectionState, HandlerRegistry, MessageHandler, MessageSubscription, Transport,
    TransportError,
};
pub use wire::{
    ClientMessage, CommittedEvent, ServerMessage, SubmitItem, SubmitStatus, SyncEvent,
    SyncEventPayload, SYNC_EVENT_TYPE,
};
