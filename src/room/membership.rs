use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::Member;

/// Grants and revokes the platform group tag that mirrors room membership
///
/// The tag id of a room is its room id. Revoking a tag the member does not
/// hold succeeds, so compensation and disband can be retried safely.
#[async_trait]
pub trait MembershipService: Send + Sync {
    async fn grant(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError>;

    async fn revoke(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MembershipError {
    #[error("Tag {tag_id} change for {member} rejected: {reason}")]
    Rejected {
        member: String,
        tag_id: String,
        reason: String,
    },

    #[error("Membership service unavailable: {0}")]
    Unavailable(String),
}

/// In-memory implementation of MembershipService
/// Tracks which member ids hold which tags
pub struct InMemoryMembershipService {
    holders: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryMembershipService {
    pub fn new() -> Self {
        Self {
            holders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Checks whether a member id currently holds a tag
    pub async fn has_tag(&self, member_id: &str, tag_id: &str) -> bool {
        self.holders
            .read()
            .await
            .get(tag_id)
            .is_some_and(|members| members.contains(member_id))
    }

    /// Member ids holding a tag, sorted
    pub async fn holders_of(&self, tag_id: &str) -> Vec<String> {
        let holders = self.holders.read().await;
        let mut members: Vec<String> = holders
            .get(tag_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}

impl Default for InMemoryMembershipService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipService for InMemoryMembershipService {
    async fn grant(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError> {
        let mut holders = self.holders.write().await;
        let newly_granted = holders
            .entry(tag_id.to_string())
            .or_default()
            .insert(member.id.clone());

        if newly_granted {
            info!(member = %member.name, member_id = %member.id, tag_id = %tag_id, "Granted tag");
        } else {
            debug!(member_id = %member.id, tag_id = %tag_id, "Member already holds tag");
        }
        Ok(())
    }

    async fn revoke(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError> {
        let mut holders = self.holders.write().await;

        let removed = match holders.get_mut(tag_id) {
            Some(members) => {
                let removed = members.remove(&member.id);
                if members.is_empty() {
                    holders.remove(tag_id);
                }
                removed
            }
            None => false,
        };

        if removed {
            info!(member = %member.name, member_id = %member.id, tag_id = %tag_id, "Revoked tag");
        } else {
            debug!(member_id = %member.id, tag_id = %tag_id, "Member did not hold tag");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_and_revoke() {
        let service = InMemoryMembershipService::new();
        let bob = Member::new("u-1", "bob");

        service.grant(&bob, "tag-1").await.unwrap();
        assert!(service.has_tag("u-1", "tag-1").await);
        assert!(!service.has_tag("u-1", "tag-2").await);

        service.revoke(&bob, "tag-1").await.unwrap();
        assert!(!service.has_tag("u-1", "tag-1").await);
        assert!(service.holders_of("tag-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let service = InMemoryMembershipService::new();
        let bob = Member::new("u-1", "bob");

        service.grant(&bob, "tag-1").await.unwrap();
        service.grant(&bob, "tag-1").await.unwrap();

        assert_eq!(service.holders_of("tag-1").await, vec!["u-1".to_string()]);
    }

    #[tokio::test]
    async fn test_revoke_unheld_tag_succeeds() {
        let service = InMemoryMembershipService::new();

        let result = service.revoke(&Member::new("u-9", "ghost"), "tag-1").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_holders_are_per_tag() {
        let service = InMemoryMembershipService::new();

        service.grant(&Member::new("u-2", "carol"), "tag-1").await.unwrap();
        service.grant(&Member::new("u-1", "bob"), "tag-1").await.unwrap();
        service.grant(&Member::new("u-3", "dave"), "tag-2").await.unwrap();

        assert_eq!(
            service.holders_of("tag-1").await,
            vec!["u-1".to_string(), "u-2".to_string()]
        );
        assert_eq!(service.holders_of("tag-2").await, vec!["u-3".to_string()]);
    }
}
