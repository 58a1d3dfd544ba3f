//! Partition authorization. A command is approved only if every one of its
//! partitions is.

use crate::auth::Identity;
use std::collections::{HashMap, HashSet};

pub trait PartitionAuthorizer: Send + Sync {
    fn authorize_partitions(&self, identity: &Identity, partitions: &[String]) -> bool;
}

/// Approves any non-empty partition list
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PartitionAuthorizer for AllowAll {
    fn authorize_partitions(&self, _identity: &Identity, partitions: &[String]) -> bool {
        !partitions.is_empty()
    }
}

/// Per-user project grants; `project:<id>:...` partitions are approved for
/// users granted `<id>`
#[derive(Debug, Clone, Default)]
pub struct ProjectGrants {
    grants: HashMap<String, HashSet<String>>,
}

impl ProjectGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.insert(user_id, project_id);
        self
    }

    pub fn insert(&mut self, user_id: impl Into<String>, project_id: impl Into<String>) {
        self.grants
            .entry(user_id.into())
            .or_default()
            .insert(project_id.into());
    }

    /// Parse a `user:project` grant
    pub fn parse_grant(grant: &str) -> Option<(String, String)> {
        match grant.split_once(':') {
            Some((user, project)) if !user.is_empty() && !project.is_empty() => {
                Some((user.to_string(), project.to_string()))
            }
            _ => None,
        }
    }

    fn allows(&self, user_id: &str, partition: &str) -> bool {
        let Some(rest) = partition.strip_prefix("project:") else {
            return false;
        };
        let project_id = rest.split(':').next().unwrap_or("");

        self.grants
            .get(user_id)
            .is_some_and(|projects| projects.contains(project_id))
    }
}

impl PartitionAuthorizer for ProjectGrants {
    fn authorize_partitions(&self, identity: &Identity, partitions: &[String]) -> bool {
        !partitions.is_empty()
            && partitions
                .iter()
                .all(|partition| self.allows(&identity.user_id, partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn identity(user_id: &str) -> Identity {
        Identity {
            user_id: user_id.into(),
            client_id: "c".into(),
            claims: Value::Null,
        }
    }

    fn partitions(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_grants_require_every_partition() {
        let grants = ProjectGrants::new().grant("u1", "p1");

        assert!(grants.authorize_partitions(
            &identity("u1"),
            &partitions(&["project:p1:story", "project:p1:story:scene:s1"])
        ));
        assert!(!grants.authorize_partitions(
            &identity("u1"),
            &partitions(&["project:p1:story", "project:p2:story"])
        ));
        assert!(!grants.authorize_partitions(&identity("u2"), &partitions(&["project:p1:story"])));
        assert!(!grants.authorize_partitions(&identity("u1"), &[]));
    }

    #[test]
    fn test_project_prefix_is_exact() {
        let grants = ProjectGrants::new().grant("u1", "p1");
        assert!(!grants.authorize_partitions(&identity("u1"), &partitions(&["project:p10:story"])));
        assert!(!grants.authorize_partitions(&identity("u1"), &partitions(&["p1:story"])));
    }

    #[test]
    fn test_parse_grant() {
        assert_eq!(ProjectGrants::parse_grant("u1:p1"), Some(("u1".into(), "p1".into())));
        assert_eq!(ProjectGrants::parse_grant("u1"), None);
        assert_eq!(ProjectGrants::parse_grant(":p1"), None);
    }
}
