use crate::errors::ConfigError;
use rand::Rng;
use routevn_protocol::{partition_for, Actor, Domain};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TRANSPORT_LABEL: &str = "routevn.collab.ws";

/// What happens to unflushed drafts when the session stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftPolicy {
    /// Drop them; only an explicit flush is durable
    #[default]
    Discard,
    /// Try one flush before disconnecting
    FlushOnStop,
}

/// How an active session recovers a dropped connection.
///
/// Attempt `n` (1-based) waits `initial_delay_ms * factor^(n-1)`, capped at
/// `max_delay_ms`, then scaled by a random factor in `1 ± jitter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// Fraction of the delay, `0.0..=1.0`
    pub jitter: f64,
    /// `None` retries until `stop`
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            factor: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether attempt `attempt` (1-based) may still run
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base = (self.initial_delay_ms as f64 * self.factor.max(1.0).powi(exponent))
            .min(self.max_delay_ms as f64);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let scaled = if jitter > 0.0 {
            base * (1.0 + rand::thread_rng().gen_range(-jitter..=jitter))
        } else {
            base
        };
        Duration::from_millis(scaled.max(0.0).round() as u64)
    }
}

/// Collaboration session configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub project_id: String,

    /// Opaque credential, verified by the server
    pub token: String,

    /// Identity stamped on every command built by the session
    pub actor: Actor,

    /// Domains (`story`) or full partitions (`project:p1:story`) to subscribe to
    #[serde(default = "default_partitions")]
    pub partitions: Vec<String>,

    /// WebSocket endpoint of the sync server
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub sync_timeout_ms: u64,

    #[serde(default)]
    pub draft_policy: DraftPolicy,

    /// Log label of the transport
    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_partitions() -> Vec<String> {
    Domain::all().iter().map(|d| d.to_string()).collect()
}

fn default_url() -> String {
    "ws://127.0.0.1:9001".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_label() -> String {
    DEFAULT_TRANSPORT_LABEL.to_string()
}

impl SessionConfig {
    pub fn new(project_id: impl Into<String>, token: impl Into<String>, actor: Actor) -> Self {
        Self {
            project_id: project_id.into(),
            token: token.into(),
            actor,
            partitions: default_partitions(),
            url: default_url(),
            handshake_timeout_ms: default_timeout_ms(),
            sync_timeout_ms: default_timeout_ms(),
            draft_policy: DraftPolicy::default(),
            label: default_label(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Load config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SessionConfig = serde_json::from_str(&content)?;

        if config.project_id.is_empty() {
            return Err(ConfigError::Missing("projectId"));
        }
        Ok(config)
    }

    /// Subscription partitions, with bare domains expanded to
    /// `project:<projectId>:<domain>`
    pub fn resolved_partitions(&self) -> Vec<String> {
        self.partitions
            .iter()
            .map(|p| {
                if p.starts_with("project:") {
                    p.clone()
                } else {
                    partition_for(&self.project_id, &Domain::Other(p.clone()))
                }
            })
            .collect()
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "projectId": "p1",
            "token": "user:u1:client:c1",
            "actor": { "userId": "u1", "clientId": "c1" },
            "partitions": ["story", "project:p1:layouts"],
            "syncTimeoutMs": 250,
            "draftPolicy": "flushOnStop"
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.actor, Actor::new("u1", "c1"));
        assert_eq!(config.sync_timeout(), Duration::from_millis(250));
        assert_eq!(config.handshake_timeout_ms, 5000);
        assert_eq!(config.draft_policy, DraftPolicy::FlushOnStop);
        assert_eq!(config.label, "routevn.collab.ws");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(
            config.resolved_partitions(),
            vec!["project:p1:story", "project:p1:layouts"]
        );
    }

    #[test]
    fn test_default_partitions_cover_every_domain() {
        let config = SessionConfig::new("p1", "t", Actor::new("u", "c"));
        assert_eq!(
            config.resolved_partitions(),
            vec![
                "project:p1:story",
                "project:p1:resources",
                "project:p1:layouts",
                "project:p1:settings"
            ]
        );
        assert_eq!(config.draft_policy, DraftPolicy::Discard);
    }

    #[test]
    fn test_reconnect_delays_grow_to_the_cap() {
        let policy = ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        };
        let delays: Vec<u64> = (1..=7)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_reconnect_jitter_stays_in_band() {
        let policy = ReconnectPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(2).as_millis();
            assert!((320..=480).contains(&delay), "{delay}");
        }
    }

    #[test]
    fn test_reconnect_attempt_limits() {
        let json = r#"{ "maxAttempts": 2, "initialDelayMs": 10 }"#;
        let policy: ReconnectPolicy = serde_json::from_str(json).unwrap();
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert_eq!(policy.max_delay_ms, 5000);

        assert!(ReconnectPolicy::default().allows(u32::MAX));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(matches!(
            SessionConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
