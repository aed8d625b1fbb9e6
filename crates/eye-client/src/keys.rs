//! Cache key model
//!
//! Keys are derived from the parameters that identify an entity and nothing
//! else, so the same request always lands on the same key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::model::{normalize_email, ActivityFilter, EntityId, UserLookup};

/// What a key identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Session,
    User,
    /// Alias: user by email
    UserEmail,
    /// Alias: user by keycloak id
    UserKeycloak,
    /// Alias: user by one of their sessions
    UserSession,
    /// Activity query result
    Activities,
    /// The tag catalog
    Tags,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Session => "session",
            KeyKind::User => "user",
            KeyKind::UserEmail => "user-email",
            KeyKind::UserKeycloak => "user-keycloak",
            KeyKind::UserSession => "user-session",
            KeyKind::Activities => "activities",
            KeyKind::Tags => "tags",
        }
    }

    /// Alias kinds store a primary key instead of an entity
    pub fn is_alias(&self) -> bool {
        matches!(
            self,
            KeyKind::UserEmail | KeyKind::UserKeycloak | KeyKind::UserSession
        )
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "session" => KeyKind::Session,
            "user" => KeyKind::User,
            "user-email" => KeyKind::UserEmail,
            "user-keycloak" => KeyKind::UserKeycloak,
            "user-session" => KeyKind::UserSession,
            "activities" => KeyKind::Activities,
            "tags" => KeyKind::Tags,
            _ => return None,
        })
    }
}

/// Typed cache key: kind plus derived identifier.
///
/// Renders as `kind:id` (`tags` for the singleton catalog key). Serialized
/// in the same textual form, which is how alias entries store their target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey {
    kind: KeyKind,
    id: String,
}

impl CacheKey {
    pub fn session(id: &EntityId) -> Self {
        Self::new(KeyKind::Session, id.to_string())
    }

    pub fn user(id: &EntityId) -> Self {
        Self::new(KeyKind::User, id.to_string())
    }

    /// Email aliases ignore case and surrounding whitespace
    pub fn user_by_email(email: &str) -> Self {
        Self::new(KeyKind::UserEmail, normalize_email(email))
    }

    pub fn user_by_keycloak(keycloak_id: &str) -> Self {
        Self::new(KeyKind::UserKeycloak, keycloak_id.trim().to_string())
    }

    pub fn user_by_session(session_id: &EntityId) -> Self {
        Self::new(KeyKind::UserSession, session_id.to_string())
    }

    /// Key of an activity query: SHA-256 of the canonical filter
    pub fn activities(filter: &ActivityFilter) -> Self {
        let digest = Sha256::digest(canonical_filter(filter).as_bytes());
        Self::new(KeyKind::Activities, hex::encode(digest))
    }

    pub fn tags() -> Self {
        Self::new(KeyKind::Tags, String::new())
    }

    /// The key a user lookup is cached under: the primary key for an id,
    /// an alias key for everything else
    pub fn for_user_lookup(lookup: &UserLookup) -> Self {
        match lookup {
            UserLookup::Id(id) => Self::user(id),
            UserLookup::Session(session) => Self::user_by_session(session),
            UserLookup::Keycloak(keycloak) => Self::user_by_keycloak(keycloak),
            UserLookup::Email(email) => Self::user_by_email(email),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_alias(&self) -> bool {
        self.kind.is_alias()
    }

    fn new(kind: KeyKind, id: String) -> Self {
        Self { kind, id }
    }
}

/// Every discriminating filter field, in a fixed order
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalFilter {
    from: String,
    to: String,
    types: Vec<String>,
    ip: Option<String>,
    email: Option<String>,
    continents: Vec<String>,
    term: Option<String>,
    term_key: Option<String>,
}

/// Stable textual form of a filter: equal filters always produce the same
/// text.
fn canonical_filter(filter: &ActivityFilter) -> String {
    let (term, term_key) = match filter.search_terms() {
        Some((term, key)) => (Some(term), key),
        None => (None, None),
    };

    let canonical = CanonicalFilter {
        from: filter.from.format("%Y-%m-%d").to_string(),
        to: filter.to.format("%Y-%m-%d").to_string(),
        types: filter.type_id_set(),
        ip: filter.ip_address_value(),
        email: filter.email_value(),
        continents: filter.continent_set(),
        term,
        term_key,
    };
    // A struct of strings always serializes
    serde_json::to_string(&canonical).unwrap_or_default()
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KeyKind::Tags => f.write_str(self.kind.as_str()),
            kind => write!(f, "{}:{}", kind.as_str(), self.id),
        }
    }
}

impl FromStr for CacheKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == KeyKind::Tags.as_str() {
            return Ok(Self::tags());
        }
        let (prefix, id) = raw
            .split_once(':')
            .ok_or_else(|| format!("not a cache key: {}", raw))?;
        let kind = KeyKind::from_prefix(prefix)
            .filter(|kind| *kind != KeyKind::Tags)
            .ok_or_else(|| format!("unknown key kind: {}", prefix))?;
        Ok(Self::new(kind, id.to_string()))
    }
}

impl TryFrom<String> for CacheKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}
