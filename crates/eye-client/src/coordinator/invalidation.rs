//! Invalidation protocol
//!
//! Each successful mutation maps to a fixed [`InvalidationPlan`]; the
//! coordinator applies plans without knowing which mutation produced them.

use crate::keys::CacheKey;
use crate::model::EntityId;

/// A successful mutating call
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateSession,
    CreateUser,
    CreateActivity { session: EntityId },
    UpdateUser { user: EntityId },
    IdentifySession { session: EntityId, user: EntityId },
}

/// Keys to drop, then edges to record, in that order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationPlan {
    pub drop: Vec<CacheKey>,
    /// `(dependent, target)` pairs
    pub link: Vec<(CacheKey, CacheKey)>,
}

impl InvalidationPlan {
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty() && self.link.is_empty()
    }
}

impl Mutation {
    pub fn plan(&self) -> InvalidationPlan {
        match self {
            Mutation::CreateSession | Mutation::CreateUser => InvalidationPlan::default(),
            // Activity listings are left to expire
            Mutation::CreateActivity { session } => InvalidationPlan {
                drop: vec![CacheKey::session(session)],
                link: Vec::new(),
            },
            Mutation::UpdateUser { user } => InvalidationPlan {
                drop: vec![CacheKey::user(user)],
                link: Vec::new(),
            },
            Mutation::IdentifySession { session, user } => InvalidationPlan {
                drop: vec![
                    CacheKey::session(session),
                    CacheKey::user(user),
                    CacheKey::user_by_session(session),
                ],
                link: vec![(CacheKey::session(session), CacheKey::user(user))],
            },
        }
    }

    /// Label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateSession => "create_session",
            Mutation::CreateUser => "create_user",
            Mutation::CreateActivity { .. } => "create_activity",
            Mutation::UpdateUser { .. } => "update_user",
            Mutation::IdentifySession { .. } => "identify_session",
        }
    }
}
