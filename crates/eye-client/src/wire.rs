//! Request and response schemas of the Eye HTTP API
//!
//! Each endpoint gets an explicit schema; responses are decoded here and
//! converted into the domain entities in [`crate::model`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{EyeError, Result};
use crate::model::{
    non_empty, null_as_default, timestamp, Activity, ActivityDefinition, ActivityFilter,
    ActivityList, ActivityType, EntityId, Metadata, Session, SessionDefinition, Tag, TagList,
    User, UserDefinition,
};

/// Decode a success body into a response schema
pub(crate) fn decode<T: DeserializeOwned>(operation: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| EyeError::Decode {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}

fn decode_error(operation: &str, reason: impl Into<String>) -> EyeError {
    EyeError::Decode {
        operation: operation.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionResponse {
    id: EntityId,
    #[serde(deserialize_with = "timestamp::deserialize")]
    dt_created: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    dt_expired: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    ip_address: String,
    #[serde(default)]
    user_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    activities: Vec<ActivityResponse>,
}

impl SessionResponse {
    pub fn into_session(self, operation: &str) -> Result<Session> {
        let id = self.id;
        let activities = self
            .activities
            .into_iter()
            .map(|activity| activity.into_activity(Some(&id), operation))
            .collect::<Result<Vec<_>>>()?;

        Ok(Session {
            id,
            created_at: self.dt_created,
            expires_at: self.dt_expired,
            ip_address: self.ip_address,
            user_id: non_empty(self.user_id),
            activities,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ActivityTypeResponse {
    id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CountryResponse {
    #[serde(default)]
    iso2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagResponse {
    id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

impl From<TagResponse> for Tag {
    fn from(tag: TagResponse) -> Self {
        Tag {
            id: tag.id,
            name: tag.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActivityResponse {
    id: EntityId,
    #[serde(deserialize_with = "timestamp::deserialize")]
    dt_created: DateTime<Utc>,
    #[serde(default)]
    session_id: Option<EntityId>,
    #[serde(rename = "type")]
    activity_type: ActivityTypeResponse,
    #[serde(default, deserialize_with = "null_as_default")]
    ip_address: String,
    #[serde(default)]
    country: Option<CountryResponse>,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<TagResponse>,
    #[serde(default, deserialize_with = "null_as_default")]
    metadata: Vec<MetadataResponse>,
}

impl ActivityResponse {
    /// Activities nested in a session may omit their session id; `owner`
    /// fills it in
    pub fn into_activity(self, owner: Option<&EntityId>, operation: &str) -> Result<Activity> {
        let session_id = non_empty(self.session_id)
            .or_else(|| owner.cloned())
            .ok_or_else(|| decode_error(operation, "activity without sessionId"))?;

        let mut seen = HashSet::new();
        let tags = self
            .tags
            .into_iter()
            .map(Tag::from)
            .filter(|tag| seen.insert(tag.id.clone()))
            .collect();

        Ok(Activity {
            id: self.id,
            created_at: self.dt_created,
            session_id,
            activity_type: ActivityType {
                id: self.activity_type.id,
                name: self.activity_type.name,
            },
            ip_address: self.ip_address,
            country_code: self
                .country
                .and_then(|country| country.iso2)
                .filter(|code| !code.trim().is_empty()),
            tags,
            metadata: self
                .metadata
                .into_iter()
                .map(|m| Metadata {
                    key: m.key,
                    value: m.value,
                })
                .collect(),
        })
    }
}

pub(crate) fn into_activity_list(
    activities: Vec<ActivityResponse>,
    operation: &str,
) -> Result<ActivityList> {
    activities
        .into_iter()
        .map(|activity| activity.into_activity(None, operation))
        .collect::<Result<Vec<_>>>()
        .map(ActivityList::new)
}

pub(crate) fn into_tag_list(tags: Vec<TagResponse>) -> TagList {
    TagList::new(tags.into_iter().map(Tag::from).collect())
}

/// A session reference inside a user: a bare id or an object with an id
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionRef {
    Id(EntityId),
    Object { id: EntityId },
}

impl SessionRef {
    fn into_id(self) -> EntityId {
        match self {
            SessionRef::Id(id) | SessionRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserResponse {
    id: EntityId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    surname: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    keycloak_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    sessions: Vec<SessionRef>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<UserResponse> for User {
    fn from(user: UserResponse) -> Self {
        User {
            id: user.id,
            name: user.name,
            surname: user.surname,
            email: user.email,
            keycloak_id: user.keycloak_id,
            sessions: user
                .sessions
                .into_iter()
                .map(SessionRef::into_id)
                .filter(|id| !id.is_empty())
                .collect(),
            profile: user.extra,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserIdResponse {
    pub id: EntityId,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionBody<'a> {
    ip_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a EntityId>,
}

impl<'a> From<&'a SessionDefinition> for CreateSessionBody<'a> {
    fn from(definition: &'a SessionDefinition) -> Self {
        Self {
            ip_address: &definition.ip_address,
            user_id: definition.user_id.as_ref().filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateActivityBody<'a> {
    session_id: &'a EntityId,
    ip_address: &'a str,
    activity_type_id: &'a EntityId,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl<'a> From<&'a ActivityDefinition> for CreateActivityBody<'a> {
    fn from(definition: &'a ActivityDefinition) -> Self {
        Self {
            session_id: &definition.session_id,
            ip_address: &definition.ip_address,
            activity_type_id: &definition.activity_type_id,
            metadata: definition
                .metadata
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        }
    }
}

/// Profile payload for create and update user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surname: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keycloak_id: Option<&'a str>,
    #[serde(flatten)]
    profile: &'a Map<String, Value>,
}

impl<'a> From<&'a UserDefinition> for UserBody<'a> {
    fn from(definition: &'a UserDefinition) -> Self {
        Self {
            id: None,
            name: definition.name.as_deref(),
            surname: definition.surname.as_deref(),
            email: definition.email.as_deref(),
            keycloak_id: definition.keycloak_id.as_deref(),
            profile: &definition.profile,
        }
    }
}

impl<'a> From<&'a User> for UserBody<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: Some(&user.id),
            name: user.name.as_deref(),
            surname: user.surname.as_deref(),
            email: user.email.as_deref(),
            keycloak_id: user.keycloak_id.as_deref(),
            profile: &user.profile,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentifyBody<'a> {
    pub session_id: &'a EntityId,
    pub user_id: &'a EntityId,
}

/// Serialize a request body
pub(crate) fn encode<T: Serialize>(operation: &str, body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| EyeError::InvalidRequest(format!("{}: {}", operation, e)))
}

/// Query string of an activity listing.
///
/// Arrays use the indexed form `name[0]=a&name[1]=b`.
pub(crate) fn activity_query(filter: &ActivityFilter) -> Vec<(String, String)> {
    let mut query = vec![
        ("dtFrom".to_string(), filter.from.format("%Y-%m-%d").to_string()),
        ("dtTo".to_string(), filter.to.format("%Y-%m-%d").to_string()),
    ];
    push_indexed(&mut query, "activityTypeIds", filter.type_id_set());
    if let Some(ip) = filter.ip_address_value() {
        query.push(("ipAddress".to_string(), ip));
    }
    if let Some(email) = filter.email_value() {
        query.push(("email".to_string(), email));
    }
    push_indexed(&mut query, "continentIso2s", filter.continent_set());
    if let Some((term, key)) = filter.search_terms() {
        query.push(("metadataSearchTerm".to_string(), term));
        if let Some(key) = key {
            query.push(("metadataKey".to_string(), key));
        }
    }
    query
}

fn push_indexed(query: &mut Vec<(String, String)>, name: &str, values: Vec<String>) {
    for (i, value) in values.into_iter().enumerate() {
        query.push((format!("{}[{}]", name, i), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use serde_json::json;

    #[test]
    fn test_session_response() {
        let body = json!({
            "id": "s1",
            "dtCreated": "2024-01-01 10:00:00",
            "dtExpired": "2024-01-02T10:00:00+00:00",
            "ipAddress": "1.2.3.4",
            "userId": 7,
            "activities": [{
                "id": 1,
                "dtCreated": "2024-01-01 10:05:00",
                "type": {"id": 2, "name": "visit"},
                "ipAddress": "1.2.3.4",
                "country": {"iso2": "CZ"},
                "tags": [{"id": 1, "name": "a"}, {"id": "1", "name": "a"}],
                "metadata": [{"key": "page", "value": "/home"}],
                "somethingNew": true
            }]
        });

        let session = decode::<SessionResponse>("Get session", body)
            .unwrap()
            .into_session("Get session")
            .unwrap();

        assert_eq!(session.id, EntityId::from("s1"));
        assert_eq!(session.user_id, Some(EntityId::from("7")));
        assert_eq!(session.created_at.hour(), 10);
        assert_eq!(session.activities.len(), 1);

        let activity = &session.activities[0];
        assert_eq!(activity.session_id, EntityId::from("s1"));
        assert_eq!(activity.activity_type.name, "visit");
        assert_eq!(activity.country_code.as_deref(), Some("CZ"));
        assert_eq!(activity.tags.len(), 1);
        assert_eq!(activity.metadata[0].value, json!("/home"));
    }

    #[test]
    fn test_session_without_optional_fields() {
        let body = json!({
            "id": 5,
            "dtCreated": "2024-01-01 10:00:00",
            "dtExpired": "2024-01-01 11:00:00",
            "userId": null,
            "activities": null
        });
        let session = decode::<SessionResponse>("Get session", body)
            .unwrap()
            .into_session("Get session")
            .unwrap();

        assert!(session.user_id.is_none());
        assert!(session.activities.is_empty());
        assert_eq!(session.ip_address, "");
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let body = json!({"id": 1, "dtCreated": "soon", "dtExpired": "later"});
        let err = decode::<SessionResponse>("Get session", body).unwrap_err();
        assert!(matches!(err, EyeError::Decode { .. }));
    }

    #[test]
    fn test_listed_activity_needs_session() {
        let body = json!([{
            "id": 1,
            "dtCreated": "2024-01-01 10:05:00",
            "type": {"id": 2, "name": "visit"}
        }]);
        let activities: Vec<ActivityResponse> = decode("Get activities", body).unwrap();
        assert!(into_activity_list(activities, "Get activities").is_err());
    }

    #[test]
    fn test_user_response_sessions_and_extras() {
        let body = json!({
            "id": 3,
            "email": "a@b.com",
            "keycloakId": "kc-1",
            "sessions": ["s1", {"id": "s2"}, 9],
            "phone": "+420"
        });
        let user: User = decode::<UserResponse>("Get user", body).unwrap().into();

        assert_eq!(
            user.sessions,
            vec![EntityId::from("s1"), EntityId::from("s2"), EntityId::from(9)]
        );
        assert_eq!(user.keycloak_id.as_deref(), Some("kc-1"));
        assert_eq!(user.profile.get("phone"), Some(&json!("+420")));
        assert!(!user.profile.contains_key("email"));
    }

    #[test]
    fn test_create_activity_body() {
        let definition = ActivityDefinition::new("s1", "1.2.3.4", 5u64)
            .with_metadata("page", "/home");
        let body = encode("Create activity", &CreateActivityBody::from(&definition)).unwrap();

        assert_eq!(
            body,
            json!({
                "sessionId": "s1",
                "ipAddress": "1.2.3.4",
                "activityTypeId": 5,
                "metadata": {"page": "/home"}
            })
        );
    }

    #[test]
    fn test_activity_metadata_keeps_caller_order() {
        let definition = ActivityDefinition::new("s1", "1.2.3.4", 5u64)
            .with_metadata("zone", "eu")
            .with_metadata("page", "/home")
            .with_metadata("agent", "bot");
        let body = encode("Create activity", &CreateActivityBody::from(&definition)).unwrap();

        assert!(body.to_string().ends_with(
            r#""metadata":{"zone":"eu","page":"/home","agent":"bot"}}"#
        ));
    }

    #[test]
    fn test_create_session_body_skips_missing_user() {
        let definition = SessionDefinition::new("1.2.3.4");
        let body = encode("Create session", &CreateSessionBody::from(&definition)).unwrap();
        assert_eq!(body, json!({"ipAddress": "1.2.3.4"}));
    }

    #[test]
    fn test_user_body_flattens_profile() {
        let definition = UserDefinition::new()
            .email("a@b.com")
            .keycloak_id("kc")
            .attribute("phone", "+420");
        let body = encode("Create user", &UserBody::from(&definition)).unwrap();
        assert_eq!(
            body,
            json!({"email": "a@b.com", "keycloakId": "kc", "phone": "+420"})
        );
    }

    #[test]
    fn test_activity_query() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let filter = ActivityFilter::new(day(1), day(9))
            .type_ids([2u64, 1])
            .continents(["eu"])
            .metadata_search("home", Some("page".into()));

        let query = activity_query(&filter);
        let expected: Vec<(String, String)> = [
            ("dtFrom", "2024-03-01"),
            ("dtTo", "2024-03-09"),
            ("activityTypeIds[0]", "1"),
            ("activityTypeIds[1]", "2"),
            ("continentIso2s[0]", "EU"),
            ("metadataSearchTerm", "home"),
            ("metadataKey", "page"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(query, expected);
    }
}
