//! Actor directory
//!
//! Role lookup for users who are not the caller, e.g. the target of an
//! assignment.

use std::sync::Arc;

use dashmap::DashMap;

use carewallet_types::{Actor, Role, UserId};

/// Looks up the role a user holds
#[async_trait::async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn role_of(&self, user_id: &UserId) -> Option<Role>;
}

/// In-memory directory
#[derive(Clone, Default)]
pub struct InMemoryActorDirectory {
    roles: Arc<DashMap<UserId, Role>>,
}

impl InMemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the actor's current role, replacing any earlier one
    pub fn register(&self, actor: &Actor) {
        self.roles.insert(actor.id.clone(), actor.role);
    }
}

#[async_trait::async_trait]
impl ActorDirectory for InMemoryActorDirectory {
    async fn role_of(&self, user_id: &UserId) -> Option<Role> {
        self.roles.get(user_id).map(|entry| *entry.value())
    }
}
