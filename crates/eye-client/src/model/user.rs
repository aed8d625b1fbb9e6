use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EntityId;

/// A tracked user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    /// Identifier in the external identity provider
    pub keycloak_id: Option<String>,
    /// Sessions linked to this user
    pub sessions: Vec<EntityId>,
    /// Further profile attributes returned by the service, sent back verbatim
    /// on update
    #[serde(default)]
    pub profile: Map<String, Value>,
}

/// Profile fields for creating a user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDefinition {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub keycloak_id: Option<String>,
    pub profile: Map<String, Value>,
}

impl UserDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn surname(mut self, surname: impl Into<String>) -> Self {
        self.surname = Some(surname.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn keycloak_id(mut self, keycloak_id: impl Into<String>) -> Self {
        self.keycloak_id = Some(keycloak_id.into());
        self
    }

    /// Set an additional profile attribute
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.profile.insert(key.into(), value.into());
        self
    }
}
