use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Activity, EntityId};

/// A visitor session and the activities recorded in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: String,
    /// Owning user, once the session has been identified
    pub user_id: Option<EntityId>,
    /// In the order the service recorded them
    pub activities: Vec<Activity>,
}

/// What is needed to open a new session
#[derive(Debug, Clone)]
pub struct SessionDefinition {
    pub ip_address: String,
    pub user_id: Option<EntityId>,
}

impl SessionDefinition {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_id: None,
        }
    }

    /// Open the session on behalf of a known user
    pub fn for_user(mut self, user_id: impl Into<EntityId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
