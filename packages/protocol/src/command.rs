//! # Command Builder
//!
//! Wraps a legacy edit, its partitions and the acting identity into an
//! idempotent command.
//!
//! ## Identity
//!
//! A command id is a UUIDv5 over the canonical JSON of
//! `(projectId, actor, event, nonce)`. The nonce is a `(seed, counter)` pair
//! owned by the builder: rebuilding with the same nonce reproduces the id, so
//! a retried submission is recognized by the server as the same operation,
//! while two identical edits made one after the other still get distinct ids.

use crate::legacy::LegacyEvent;
use crate::partition::resolve_partitions;
use crate::wire::{SubmitItem, SyncEvent, SyncEventPayload, SYNC_EVENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Schema tag of bridged legacy commands
pub const LEGACY_EVENT_SCHEMA: &str = "legacy.event.apply";

pub const COMMAND_VERSION: u32 = 1;

/// Namespace for command ids
const COMMAND_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_4b7d_5e90_a3c1_82d4_f0b6_7e15);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("project id must not be empty")]
    MissingProjectId,

    #[error("actor must carry a user id and a client id")]
    IncompleteActor,

    #[error("failed to encode command content: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub client_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            client_id: client_id.into(),
        }
    }
}

/// Submission nonce mixed into the command id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNonce {
    pub seed: Uuid,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub event: LegacyEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub project_id: String,
    /// Always `partitions[0]`
    pub partition: String,
    pub partitions: Vec<String>,
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: CommandPayload,
    pub actor: Actor,
    /// Epoch milliseconds
    pub client_ts: i64,
    pub command_version: u32,
}

impl Command {
    pub fn event(&self) -> &LegacyEvent {
        &self.payload.event
    }

    /// The envelope that travels to the sync server
    pub fn to_wire(&self) -> SubmitItem {
        SubmitItem {
            event: SyncEvent {
                kind: SYNC_EVENT_TYPE.to_string(),
                payload: SyncEventPayload {
                    schema: LEGACY_EVENT_SCHEMA.to_string(),
                    command_id: self.id.clone(),
                    data: json!({ "event": self.payload.event }),
                },
            },
            partitions: self.partitions.clone(),
        }
    }
}

/// Build a command for `event` with an explicit submission nonce.
pub fn build_command(
    project_id: &str,
    actor: &Actor,
    event: LegacyEvent,
    nonce: CommandNonce,
) -> Result<Command, CommandError> {
    if project_id.is_empty() {
        return Err(CommandError::MissingProjectId);
    }
    if actor.user_id.is_empty() || actor.client_id.is_empty() {
        return Err(CommandError::IncompleteActor);
    }

    let partitions = resolve_partitions(project_id, &event);
    let id = command_id(project_id, actor, &event, &nonce)?;

    Ok(Command {
        id,
        project_id: project_id.to_string(),
        partition: partitions[0].clone(),
        partitions,
        command_type: LEGACY_EVENT_SCHEMA.to_string(),
        payload: CommandPayload { event },
        actor: actor.clone(),
        client_ts: chrono::Utc::now().timestamp_millis(),
        command_version: COMMAND_VERSION,
    })
}

fn command_id(
    project_id: &str,
    actor: &Actor,
    event: &LegacyEvent,
    nonce: &CommandNonce,
) -> Result<String, CommandError> {
    // serde_json maps are key-sorted, which makes this canonical
    let content = serde_json::to_vec(&json!({
        "projectId": project_id,
        "actor": actor,
        "event": event,
        "nonce": nonce,
    }))?;

    Ok(Uuid::new_v5(&COMMAND_NAMESPACE, &content).to_string())
}

/// Issues commands for one project and actor with a fresh nonce each time
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    project_id: String,
    actor: Actor,
    seed: Uuid,
    counter: u64,
}

impl CommandBuilder {
    pub fn new(project_id: impl Into<String>, actor: Actor) -> Self {
        Self::with_seed(project_id, actor, Uuid::new_v4())
    }

    /// Deterministic builder, mostly for tests and replay
    pub fn with_seed(project_id: impl Into<String>, actor: Actor, seed: Uuid) -> Self {
        Self {
            project_id: project_id.into(),
            actor,
            seed,
            counter: 0,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Nonce the next `build` will use
    pub fn next_nonce(&self) -> CommandNonce {
        CommandNonce {
            seed: self.seed,
            counter: self.counter,
        }
    }

    pub fn build(&mut self, event: LegacyEvent) -> Result<Command, CommandError> {
        let command = build_command(&self.project_id, &self.actor, event, self.next_nonce())?;
        self.counter += 1;
        Ok(command)
    }
}
