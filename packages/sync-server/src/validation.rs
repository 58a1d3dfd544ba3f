//! Submission validation.
//!
//! The envelope is checked here; the legacy payload itself is checked by an
//! `EventPayloadValidator`, so projects with a richer domain model can plug
//! their own rules in.

use routevn_protocol::{
    LegacyEventKind, LegacyPayload, SubmitItem, LEGACY_EVENT_SCHEMA, SYNC_EVENT_TYPE,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub const CODE: &'static str = "validation_failed";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        Self::CODE
    }
}

pub trait EventPayloadValidator: Send + Sync {
    fn validate_event_payload(
        &self,
        kind: LegacyEventKind,
        payload: &LegacyPayload,
    ) -> Result<(), ValidationError>;
}

/// Structural rules every legacy event must satisfy
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyPayloadValidator;

impl EventPayloadValidator for LegacyPayloadValidator {
    fn validate_event_payload(
        &self,
        kind: LegacyEventKind,
        payload: &LegacyPayload,
    ) -> Result<(), ValidationError> {
        if kind == LegacyEventKind::Init {
            return match &payload.value {
                Some(value) if value.is_object() => Ok(()),
                _ => Err(ValidationError::new("init requires an object value")),
            };
        }

        if payload.target.is_empty() {
            return Err(ValidationError::new(format!("{} requires a target", kind.as_str())));
        }

        let option_id = payload
            .options
            .as_ref()
            .and_then(|options| options.id.as_deref())
            .filter(|id| !id.is_empty());

        match kind {
            LegacyEventKind::NodeInsert => {
                let value_id = payload
                    .value
                    .as_ref()
                    .and_then(|value| value.get("id"))
                    .and_then(|id| id.as_str())
                    .filter(|id| !id.is_empty());
                if value_id.is_none() {
                    return Err(ValidationError::new("nodeInsert requires value.id"));
                }
            }
            LegacyEventKind::NodeUpdate | LegacyEventKind::NodeMove | LegacyEventKind::NodeDelete => {
                if option_id.is_none() {
                    return Err(ValidationError::new(format!("{} requires options.id", kind.as_str())));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Check the envelope of `item`, then its legacy payload
pub fn validate(item: &SubmitItem, validator: &dyn EventPayloadValidator) -> Result<(), ValidationError> {
    if item.event.kind != SYNC_EVENT_TYPE {
        return Err(ValidationError::new(format!(
            "unsupported event type `{}`",
            item.event.kind
        )));
    }
    if item.event.payload.schema != LEGACY_EVENT_SCHEMA {
        return Err(ValidationError::new(format!(
            "unsupported schema `{}`",
            item.event.payload.schema
        )));
    }
    if item.command_id().is_empty() {
        return Err(ValidationError::new("missing commandId"));
    }

    if item.partitions.is_empty() {
        return Err(ValidationError::new("partitions must not be empty"));
    }
    if let Some(partition) = item.partitions.iter().find(|p| !p.starts_with("project:")) {
        return Err(ValidationError::new(format!("invalid partition `{partition}`")));
    }

    let event = item
        .event
        .legacy_event()
        .map_err(|e| ValidationError::new(format!("invalid legacy event: {e}")))?;

    validator.validate_event_payload(event.kind, &event.payload)
}
