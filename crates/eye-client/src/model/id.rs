//! Identifiers and timestamp decoding shared by every entity

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a remote entity.
///
/// The service sends some identifiers as JSON numbers and others as strings.
/// Both forms are kept as received, so request bodies echo the original JSON
/// type, while equality, hashing and cache keys go through the textual form:
/// `EntityId::from(42)` equals `EntityId::from("42")`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
}

impl EntityId {
    /// Textual form of the identifier
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            EntityId::Number(n) => Cow::Owned(n.to_string()),
            EntityId::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// `true` for the placeholder values the service uses for "no entity"
    pub fn is_empty(&self) -> bool {
        match self {
            EntityId::Number(n) => *n == 0,
            EntityId::Text(s) => s.trim().is_empty(),
        }
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId::Number(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

impl From<&EntityId> for EntityId {
    fn from(value: &EntityId) -> Self {
        value.clone()
    }
}

/// Drops placeholder ids (`""`, `0`) the service sends instead of `null`
pub(crate) fn non_empty(id: Option<EntityId>) -> Option<EntityId> {
    id.filter(|id| !id.is_empty())
}

/// Decode `null` or a missing field into the type's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp decoding for service responses.
///
/// Accepts RFC 3339 as well as the zone-less `YYYY-MM-DD HH:MM:SS` form,
/// which is taken as UTC.
pub(crate) mod timestamp {
    use super::*;

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("unrecognised timestamp: {}", raw))
        })
    }
}
