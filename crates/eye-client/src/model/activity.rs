use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityId, Tag};

/// Kind of activity, as configured on the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityType {
    pub id: EntityId,
    pub name: String,
}

/// One key/value pair attached to an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub value: Value,
}

impl Metadata {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single recorded visitor action.
///
/// Activities are only ever cached as part of a [`Session`](super::Session)
/// or an [`ActivityList`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub session_id: EntityId,
    pub activity_type: ActivityType,
    pub ip_address: String,
    pub country_code: Option<String>,
    /// Distinct by id, in the order the service listed them
    pub tags: Vec<Tag>,
    pub metadata: Vec<Metadata>,
}

/// What is needed to record a new activity
#[derive(Debug, Clone)]
pub struct ActivityDefinition {
    pub session_id: EntityId,
    pub ip_address: String,
    pub activity_type_id: EntityId,
    pub metadata: Vec<Metadata>,
}

impl ActivityDefinition {
    pub fn new(
        session_id: impl Into<EntityId>,
        ip_address: impl Into<String>,
        activity_type_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            ip_address: ip_address.into(),
            activity_type_id: activity_type_id.into(),
            metadata: Vec::new(),
        }
    }

    /// Attach a metadata pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push(Metadata::new(key, value));
        self
    }
}

/// Ordered result of an activity query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityList {
    activities: Vec<Activity>,
}

impl ActivityList {
    pub fn new(activities: Vec<Activity>) -> Self {
        Self { activities }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Activity> {
        self.activities.iter()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn as_slice(&self) -> &[Activity] {
        &self.activities
    }
}

impl IntoIterator for ActivityList {
    type Item = Activity;
    type IntoIter = std::vec::IntoIter<Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.activities.into_iter()
    }
}

impl<'a> IntoIterator for &'a ActivityList {
    type Item = &'a Activity;
    type IntoIter = std::slice::Iter<'a, Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.activities.iter()
    }
}
