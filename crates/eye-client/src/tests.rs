//! Integration tests for EyeClient over a scripted gateway

#[cfg(test)]
mod tests {
    use crate::gateway::{ApiRequest, Endpoint, RawResponse};
    use crate::prelude::*;
    use crate::{CacheBackend, CacheKey, CacheStats, DependencyBackend, Gateway, User};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use eye_cache_core::{CacheError, CacheOptions, StoredEntry};
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers from a per-endpoint script and records every request.
    ///
    /// The last scripted response of an endpoint repeats.
    #[derive(Clone, Default)]
    struct ScriptedGateway {
        script: Arc<Mutex<HashMap<Endpoint, VecDeque<RawResponse>>>>,
        requests: Arc<Mutex<Vec<ApiRequest>>>,
        delay: Option<Duration>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self::default()
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn respond(self, endpoint: Endpoint, status: u16, body: Value) -> Self {
            let body = if body.is_null() {
                String::new()
            } else {
                body.to_string()
            };
            self.script
                .lock()
                .unwrap()
                .entry(endpoint)
                .or_default()
                .push_back(RawResponse::new(status, body));
            self
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn calls_to(&self, endpoint: Endpoint) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.endpoint == endpoint)
                .count()
        }

        fn last(&self, endpoint: Endpoint) -> ApiRequest {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|r| r.endpoint == endpoint)
                .cloned()
                .expect("no request to endpoint")
        }
    }

    #[async_trait]
    impl Gateway for ScriptedGateway {
        async fn send(&self, request: &ApiRequest) -> crate::Result<RawResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let mut script = self.script.lock().unwrap();
            let queue = script.entry(request.endpoint).or_default();
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            Ok(response.unwrap_or_else(|| RawResponse::new(500, r#"{"error":"unscripted"}"#)))
        }
    }

    /// A store that fails every operation
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> std::result::Result<Option<StoredEntry<Vec<u8>>>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _options: &CacheOptions) -> std::result::Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn delete(&self, _key: &str) -> std::result::Result<bool, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn exists(&self, _key: &str) -> std::result::Result<bool, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn clear(&self) -> std::result::Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn stats(&self) -> std::result::Result<CacheStats, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn len(&self) -> std::result::Result<usize, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    #[async_trait]
    impl DependencyBackend for BrokenBackend {
        async fn add_dependency(
            &self,
            _dependent: &str,
            _target: &str,
            _ttl: Option<Duration>,
        ) -> std::result::Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn get_dependents(&self, _target: &str) -> std::result::Result<Vec<String>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn remove_dependents(&self, _target: &str) -> std::result::Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    fn session_json(id: &str, user: Option<u64>) -> Value {
        json!({
            "id": id,
            "dtCreated": "2024-05-01 10:00:00",
            "dtExpired": "2024-05-01 10:30:00",
            "ipAddress": "203.0.113.7",
            "userId": user,
            "activities": []
        })
    }

    fn user_json(id: u64, email: &str, sessions: &[&str]) -> Value {
        json!({
            "id": id,
            "name": "Ada",
            "email": email,
            "keycloakId": format!("kc-{}", id),
            "sessions": sessions.iter().map(|s| json!({"id": s})).collect::<Vec<_>>()
        })
    }

    fn activity_json(id: u64, session: &str) -> Value {
        json!({
            "id": id,
            "dtCreated": "2024-05-01 10:05:00",
            "sessionId": session,
            "type": {"id": 1, "name": "page_view"},
            "ipAddress": "203.0.113.7",
            "tags": [],
            "metadata": []
        })
    }

    fn cached(gateway: ScriptedGateway) -> EyeClient<ScriptedGateway> {
        EyeClient::with_gateway(gateway).with_cache(MemoryBackend::new(MemoryConfig::default()))
    }

    fn cached_with(gateway: ScriptedGateway, config: CoordinatorConfig) -> EyeClient<ScriptedGateway> {
        EyeClient::with_gateway(gateway).with_coordinator(CacheCoordinator::with_config(
            MemoryBackend::new(MemoryConfig::default()),
            config,
        ))
    }

    async fn store_len(client: &EyeClient<ScriptedGateway>) -> usize {
        client.cache().unwrap().backend().len().await.unwrap()
    }

    #[tokio::test]
    async fn test_get_user_by_email_cold_cache() {
        let gateway = ScriptedGateway::new().respond(
            Endpoint::GetUser,
            200,
            user_json(1, "a@b.com", &["s1"]),
        );
        let client = cached(gateway);

        let user = client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        assert_eq!(user.id, EntityId::from(1));

        let request = client.gateway().last(Endpoint::GetUser);
        assert_eq!(request.query, vec![("email".to_string(), "a@b.com".to_string())]);

        let cache = client.cache().unwrap();
        assert!(cache.contains(&CacheKey::user(&EntityId::from(1))).await);
        assert!(cache.contains(&CacheKey::user_by_email("a@b.com")).await);
        assert!(cache.contains(&CacheKey::user_by_keycloak("kc-1")).await);
        assert!(cache.contains(&CacheKey::user_by_session(&EntityId::from("s1"))).await);

        let again = client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        assert_eq!(again, user);
        assert_eq!(client.gateway().calls(), 1);
    }

    #[tokio::test]
    async fn test_user_aliases_serve_other_lookups() {
        let gateway = ScriptedGateway::new().respond(
            Endpoint::GetUser,
            200,
            user_json(1, "a@b.com", &["s1"]),
        );
        let client = cached(gateway);

        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        client.get_user(&UserFilter::by_id(1u64)).await.unwrap();
        client.get_user(&UserFilter::by_id("1")).await.unwrap();
        client.get_user(&UserFilter::by_keycloak_id("kc-1")).await.unwrap();
        client.get_user(&UserFilter::by_session("s1")).await.unwrap();
        client.get_user(&UserFilter::by_email("A@B.COM")).await.unwrap();

        assert_eq!(client.gateway().calls(), 1);
    }

    #[tokio::test]
    async fn test_create_session_does_not_populate() {
        let gateway = ScriptedGateway::new().respond(
            Endpoint::CreateSession,
            200,
            session_json("s1", None),
        );
        let client = cached(gateway);

        let session = client
            .create_session(&SessionDefinition::new("203.0.113.7"))
            .await
            .unwrap();

        assert_eq!(session.id, EntityId::from("s1"));
        assert_eq!(
            client.gateway().last(Endpoint::CreateSession).body,
            Some(json!({"ipAddress": "203.0.113.7"}))
        );
        assert_eq!(store_len(&client).await, 0);
    }

    #[tokio::test]
    async fn test_update_user_cascades_to_sessions() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetUser, 200, user_json(1, "a@b.com", &["s1"]))
            .respond(Endpoint::GetSession, 200, session_json("s1", Some(1)))
            .respond(Endpoint::UpdateUser, 200, user_json(1, "new@b.com", &["s1"]));
        let client = cached(gateway);

        let user = client.get_user(&UserFilter::by_id(1u64)).await.unwrap();
        client.get_session("s1").await.unwrap();
        client.get_session("s1").await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetSession), 1);

        let updated = client.update_user(&user).await.unwrap();
        assert_eq!(updated.email.as_deref(), Some("new@b.com"));

        let cache = client.cache().unwrap();
        assert!(!cache.contains(&CacheKey::user(&EntityId::from(1))).await);
        assert!(!cache.contains(&CacheKey::session(&EntityId::from("s1"))).await);

        assert_eq!(cache.stats().await.unwrap().dependency_edges, 0);

        client.get_session("s1").await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetSession), 2);
        assert_eq!(cache.stats().await.unwrap().dependency_edges, 1);
    }

    #[tokio::test]
    async fn test_alias_to_user_who_changed_email_refetches() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetUser, 200, user_json(1, "old@b.com", &[]))
            .respond(Endpoint::GetUser, 200, user_json(1, "new@b.com", &[]))
            .respond(Endpoint::GetUser, 200, user_json(2, "old@b.com", &[]))
            .respond(Endpoint::UpdateUser, 200, user_json(1, "new@b.com", &[]));
        let client = cached(gateway);

        let mut user = client.get_user(&UserFilter::by_email("old@b.com")).await.unwrap();
        user.email = Some("new@b.com".into());
        client.update_user(&user).await.unwrap();
        client.get_user(&UserFilter::by_id(1u64)).await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetUser), 2);

        // The old alias still points at user 1, who no longer has that email
        let holder = client.get_user(&UserFilter::by_email("old@b.com")).await.unwrap();
        assert_eq!(holder.id, EntityId::from(2));
        assert_eq!(client.gateway().calls_to(Endpoint::GetUser), 3);

        let again = client.get_user(&UserFilter::by_email("old@b.com")).await.unwrap();
        assert_eq!(again.id, EntityId::from(2));
        let id = client
            .get_user_id(&UserFilter::by_email("new@b.com"))
            .await
            .unwrap();
        assert_eq!(id, EntityId::from(1));
        assert_eq!(client.gateway().calls_to(Endpoint::GetUser), 3);
        assert_eq!(client.gateway().calls_to(Endpoint::GetUserId), 0);
    }

    #[tokio::test]
    async fn test_email_lookup_sends_normalised_email() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetUser, 200, user_json(1, "a@b.com", &[]))
            .respond(Endpoint::GetUserId, 200, json!({"id": 1}));
        let client = EyeClient::with_gateway(gateway);

        client.get_user(&UserFilter::by_email(" A@B.com")).await.unwrap();
        assert_eq!(
            client.gateway().last(Endpoint::GetUser).query,
            vec![("email".to_string(), "a@b.com".to_string())]
        );

        client.get_user_id(&UserFilter::by_email("A@b.COM")).await.unwrap();
        assert_eq!(
            client.gateway().last(Endpoint::GetUserId).query,
            vec![("email".to_string(), "a@b.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_writes_never_populate() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::UpdateUser, 200, user_json(1, "a@b.com", &[]))
            .respond(Endpoint::GetUser, 200, user_json(1, "a@b.com", &[]));
        let client = cached(gateway);

        let user = User {
            id: EntityId::from(1),
            name: Some("Ada".into()),
            surname: None,
            email: Some("a@b.com".into()),
            keycloak_id: None,
            sessions: Vec::new(),
            profile: Default::default(),
        };
        client.update_user(&user).await.unwrap();
        assert_eq!(store_len(&client).await, 0);

        client.get_user(&UserFilter::by_id(1u64)).await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetUser), 1);
    }

    #[tokio::test]
    async fn test_update_user_sends_profile_with_id() {
        let gateway = ScriptedGateway::new().respond(Endpoint::UpdateUser, 204, Value::Null);
        let client = EyeClient::with_gateway(gateway);

        let mut profile = serde_json::Map::new();
        profile.insert("phone".into(), json!("+420"));
        let user = User {
            id: EntityId::from(5),
            name: None,
            surname: Some("Lovelace".into()),
            email: None,
            keycloak_id: None,
            sessions: vec![EntityId::from("s1")],
            profile,
        };

        // 204 is not a success status for updates
        let err = client.update_user(&user).await.unwrap_err();
        assert!(matches!(err, EyeError::Unknown { .. }));

        assert_eq!(
            client.gateway().last(Endpoint::UpdateUser).body,
            Some(json!({"id": 5, "surname": "Lovelace", "phone": "+420"}))
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let gateway = ScriptedGateway::new().respond(
            Endpoint::ListTags,
            200,
            json!([{"id": 1, "name": "vip"}]),
        );
        let client = cached_with(
            gateway,
            CoordinatorConfig::with_ttl(Duration::from_millis(30)),
        );

        client.list_tags().await.unwrap();
        client.list_tags().await.unwrap();
        assert_eq!(client.gateway().calls(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!client.cache().unwrap().contains(&CacheKey::tags()).await);

        let tags = client.list_tags().await.unwrap();
        assert_eq!(tags.find("vip").map(|t| t.id.clone()), Some(EntityId::from(1)));
        assert_eq!(client.gateway().calls(), 2);
    }

    #[tokio::test]
    async fn test_error_classification() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetSession, 403, json!({"error": "forbidden"}))
            .respond(Endpoint::GetSession, 500, json!({"error": "boom"}))
            .respond(Endpoint::GetSession, 500, json!({"status": "down"}));
        let client = cached(gateway);

        assert_eq!(
            client.get_session("s1").await.unwrap_err(),
            EyeError::Unauthorized("forbidden".into())
        );
        assert_eq!(
            client.get_session("s1").await.unwrap_err(),
            EyeError::Api("boom".into())
        );
        assert_eq!(
            client.get_session("s1").await.unwrap_err(),
            EyeError::Unknown {
                operation: "Get session".into(),
                body: r#"{"status":"down"}"#.into(),
            }
        );
        assert_eq!(store_len(&client).await, 0);
    }

    #[tokio::test]
    async fn test_pass_through_mode() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::ListTags, 200, json!([]))
            .respond(Endpoint::GetUser, 200, user_json(1, "a@b.com", &[]))
            .respond(Endpoint::GetUserId, 200, json!({"id": 1}));
        let client = EyeClient::with_gateway(gateway);
        assert!(client.cache().is_none());

        client.list_tags().await.unwrap();
        client.list_tags().await.unwrap();
        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        let id = client
            .get_user_id(&UserFilter::by_email("a@b.com"))
            .await
            .unwrap();

        assert_eq!(id, EntityId::from(1));
        assert_eq!(client.gateway().calls(), 5);
    }

    #[tokio::test]
    async fn test_alias_with_missing_target_refetches() {
        let gateway = ScriptedGateway::new().respond(
            Endpoint::GetUser,
            200,
            user_json(1, "a@b.com", &[]),
        );
        let client = cached(gateway);

        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        client.cache().unwrap().backend().delete("user:1").await.unwrap();

        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        assert_eq!(client.gateway().calls(), 2);
    }

    #[tokio::test]
    async fn test_identify_session_links_session_to_user() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetSession, 200, session_json("s1", None))
            .respond(Endpoint::IdentifySession, 204, Value::Null)
            .respond(Endpoint::UpdateUser, 200, user_json(7, "a@b.com", &["s1"]));
        let client = cached(gateway);

        client.get_session("s1").await.unwrap();
        client.identify_session("s1", 7u64).await.unwrap();
        assert_eq!(
            client.gateway().last(Endpoint::IdentifySession).body,
            Some(json!({"sessionId": "s1", "userId": 7}))
        );

        // identify dropped the session
        client.get_session("s1").await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetSession), 2);

        // and the new edge drops it again when the user changes
        let user = User {
            id: EntityId::from(7),
            name: None,
            surname: None,
            email: None,
            keycloak_id: None,
            sessions: Vec::new(),
            profile: Default::default(),
        };
        client.update_user(&user).await.unwrap();
        client.get_session("s1").await.unwrap();
        assert_eq!(client.gateway().calls_to(Endpoint::GetSession), 3);
    }

    #[tokio::test]
    async fn test_create_activity_drops_session_only() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetSession, 200, session_json("s1", None))
            .respond(Endpoint::ListActivities, 200, json!([activity_json(1, "s1")]))
            .respond(Endpoint::CreateActivity, 200, activity_json(2, "s1"));
        let client = cached(gateway);
        let filter = ActivityFilter::new(day, day).type_ids([1u64]);

        client.get_session("s1").await.unwrap();
        client.list_activities(&filter).await.unwrap();

        let activity = client
            .create_activity(&ActivityDefinition::new("s1", "203.0.113.7", 1u64).with_metadata("page", "/"))
            .await
            .unwrap();
        assert_eq!(activity.id, EntityId::from(2));

        let cache = client.cache().unwrap();
        assert!(!cache.contains(&CacheKey::session(&EntityId::from("s1"))).await);
        assert!(cache.contains(&CacheKey::activities(&filter)).await);
    }

    #[tokio::test]
    async fn test_list_activities_key_ignores_set_order() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let gateway = ScriptedGateway::new().respond(
            Endpoint::ListActivities,
            200,
            json!([activity_json(1, "s1"), activity_json(2, "s1")]),
        );
        let client = cached(gateway);

        let first = client
            .list_activities(&ActivityFilter::new(day, day).type_ids([1u64, 2]).continents(["EU", "NA"]))
            .await
            .unwrap();
        let second = client
            .list_activities(&ActivityFilter::new(day, day).type_ids([2u64, 1]).continents(["NA", "EU"]))
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(client.gateway().calls(), 1);

        let query = client.gateway().last(Endpoint::ListActivities).query;
        assert!(query.contains(&("activityTypeIds[0]".to_string(), "1".to_string())));
        assert!(query.contains(&("continentIso2s[1]".to_string(), "NA".to_string())));
    }

    #[tokio::test]
    async fn test_get_user_id_answers_from_cache() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetUser, 200, user_json(3, "a@b.com", &["s1"]))
            .respond(Endpoint::GetUserId, 200, json!({"id": 9}));
        let client = cached(gateway);

        let id = client
            .get_user_id(&UserFilter::by_email("c@d.com"))
            .await
            .unwrap();
        assert_eq!(id, EntityId::from(9));
        assert_eq!(
            client.gateway().last(Endpoint::GetUserId).query,
            vec![("email".to_string(), "c@d.com".to_string())]
        );

        client.get_user(&UserFilter::by_email("a@b.com")).await.unwrap();
        let id = client
            .get_user_id(&UserFilter::by_session("s1"))
            .await
            .unwrap();
        assert_eq!(id, EntityId::from(3));
        assert_eq!(client.gateway().calls_to(Endpoint::GetUserId), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_service() {
        let client = cached(ScriptedGateway::new());
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert!(matches!(
            client.get_user(&UserFilter::default()).await,
            Err(EyeError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.get_user_id(&UserFilter::by_id(1u64)).await,
            Err(EyeError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.get_session("").await,
            Err(EyeError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.list_activities(&ActivityFilter::new(day, earlier)).await,
            Err(EyeError::InvalidRequest(_))
        ));
        assert_eq!(client.gateway().calls(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_after_write_still_invalidates() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::GetSession, 200, session_json("s1", None))
            .respond(Endpoint::CreateActivity, 200, json!({"unexpected": true}));
        let client = cached(gateway);

        client.get_session("s1").await.unwrap();
        let err = client
            .create_activity(&ActivityDefinition::new("s1", "203.0.113.7", 1u64))
            .await
            .unwrap_err();

        assert!(matches!(err, EyeError::Decode { .. }));
        assert!(!client
            .cache()
            .unwrap()
            .contains(&CacheKey::session(&EntityId::from("s1")))
            .await);
    }

    #[tokio::test]
    async fn test_single_flight_shares_one_call() {
        let gateway = ScriptedGateway::new()
            .with_delay(Duration::from_millis(50))
            .respond(Endpoint::ListTags, 200, json!([{"id": 1, "name": "vip"}]));
        let client = cached_with(gateway, CoordinatorConfig::default().single_flight());

        let (a, b, c, d) = tokio::join!(
            client.list_tags(),
            client.list_tags(),
            client.list_tags(),
            client.list_tags()
        );

        for tags in [a, b, c, d] {
            assert_eq!(tags.unwrap().len(), 1);
        }
        assert_eq!(client.gateway().calls(), 1);
    }

    #[tokio::test]
    async fn test_without_single_flight_misses_all_call() {
        let gateway = ScriptedGateway::new()
            .with_delay(Duration::from_millis(20))
            .respond(Endpoint::ListTags, 200, json!([]));
        let client = cached(gateway);

        let (a, b) = tokio::join!(client.list_tags(), client.list_tags());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(client.gateway().calls(), 2);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_pass_through() {
        let gateway = ScriptedGateway::new()
            .respond(Endpoint::ListTags, 200, json!([]))
            .respond(Endpoint::CreateActivity, 200, activity_json(1, "s1"));
        let client = EyeClient::with_gateway(gateway).with_cache(BrokenBackend);

        client.list_tags().await.unwrap();
        client.list_tags().await.unwrap();
        client
            .create_activity(&ActivityDefinition::new("s1", "203.0.113.7", 1u64))
            .await
            .unwrap();

        assert_eq!(client.gateway().calls(), 3);
    }
}
