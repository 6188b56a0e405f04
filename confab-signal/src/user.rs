//! Opaque identity store backing the login cookie

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserId;

/// An authenticated browser session. Process-lifetime; never destroyed.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
}

impl User {
    fn new() -> Self {
        Self {
            id: UserId::from(Uuid::new_v4().to_string()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    #[must_use]
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id.clone(),
        }
    }
}

/// Wire-facing view of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
}

pub struct UserRegistry {
    users: DashMap<UserId, User>,
}

impl UserRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    pub fn create_user(&self) -> User {
        let user = User::new();
        self.users.insert(user.id.clone(), user.clone());
        user
    }

    #[must_use]
    pub fn get_user(&self, id: &UserId) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = UserRegistry::new();
        let user = registry.create_user();

        let found = registry.get_user(user.id()).expect("user exists");
        assert_eq!(found.id(), user.id());
        assert!(registry.get_user(&UserId::from("missing")).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = UserRegistry::new();
        let a = registry.create_user();
        let b = registry.create_user();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.user_count(), 2);
    }
}
