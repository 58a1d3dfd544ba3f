//! Idempotent commit log.
//!
//! Every command id gets exactly one outcome. The first submission of an id
//! is validated and either committed or rejected; later submissions of the
//! same id replay that outcome without being looked at again.

use routevn_protocol::{Actor, CommittedEvent, SubmitItem};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed { cursor: u64 },
    Rejected { reason: String, message: String },
}

#[derive(Debug, Default)]
pub struct CommitLog {
    events: Vec<CommittedEvent>,
    outcomes: HashMap<String, Outcome>,
    submissions: HashMap<String, usize>,
    observations: HashMap<String, usize>,
    partition_cursors: HashMap<String, u64>,
    head: u64,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self, command_id: &str) -> Option<&Outcome> {
        self.outcomes.get(command_id)
    }

    /// Count a submission, duplicate or not
    pub fn note_submission(&mut self, command_id: &str) {
        *self.submissions.entry(command_id.to_string()).or_default() += 1;
    }

    /// Count a submission that is about to be validated
    pub fn note_observation(&mut self, command_id: &str) {
        *self.observations.entry(command_id.to_string()).or_default() += 1;
    }

    pub fn reject(&mut self, command_id: &str, reason: impl Into<String>, message: impl Into<String>) {
        self.outcomes.insert(
            command_id.to_string(),
            Outcome::Rejected {
                reason: reason.into(),
                message: message.into(),
            },
        );
    }

    /// Append `item` at the next cursor and advance the materialization
    /// cursor of each of its partitions
    pub fn commit(&mut self, item: SubmitItem, actor: Actor) -> CommittedEvent {
        self.head += 1;
        let cursor = self.head;

        for partition in &item.partitions {
            self.partition_cursors.insert(partition.clone(), cursor);
        }

        let event = CommittedEvent {
            cursor,
            command_id: item.command_id().to_string(),
            partitions: item.partitions,
            event: item.event,
            actor,
            committed_at: chrono::Utc::now().timestamp_millis(),
        };

        self.outcomes
            .insert(event.command_id.clone(), Outcome::Committed { cursor });
        self.events.push(event.clone());
        event
    }

    /// Newest cursor committed on any of `partitions`, 0 if none
    pub fn cursor_for(&self, partitions: &[String]) -> u64 {
        partitions
            .iter()
            .filter_map(|partition| self.partition_cursors.get(partition))
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Committed events after `since` touching any of `partitions`, in
    /// cursor order
    pub fn events_since(&self, since: u64, partitions: &[String]) -> Vec<CommittedEvent> {
        self.events
            .iter()
            .filter(|event| event.cursor > since && event.touches(partitions))
            .cloned()
            .collect()
    }

    pub fn events(&self) -> &[CommittedEvent] {
        &self.events
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn submission_count(&self, command_id: &str) -> usize {
        self.submissions.get(command_id).copied().unwrap_or(0)
    }

    pub fn observation_count(&self, command_id: &str) -> usize {
        self.observations.get(command_id).copied().unwrap_or(0)
    }
}
