//! Client facade: one method per remote operation

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use eye_cache_core::{CacheMetrics, CacheStore, JsonSerializer, NoopMetrics, Serializer};
use eye_cache_storage::MemoryBackend;

use crate::config::ClientConfig;
use crate::coordinator::{CacheCoordinator, CoordinatorConfig, Mutation, Placement};
use crate::error::{EyeError, Result};
use crate::gateway::{self, ApiRequest, Endpoint, Gateway, HttpGateway};
use crate::keys::CacheKey;
use crate::model::{
    Activity, ActivityDefinition, ActivityFilter, ActivityList, EntityId, Session,
    SessionDefinition, TagList, User, UserDefinition, UserFilter,
};
use crate::wire::{self, ActivityResponse, SessionResponse, TagResponse, UserIdResponse, UserResponse};

/// Client for the Eye tracking service
///
/// Generic over:
/// - `G`: The transport (HTTP by default, scripted in tests)
/// - `B`, `S`, `M`: store, serializer and metrics of the optional cache
///
/// Without a cache every read goes to the service.
pub struct EyeClient<G = HttpGateway, B = MemoryBackend, S = JsonSerializer, M = NoopMetrics>
where
    G: Gateway,
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    gateway: Arc<G>,
    cache: Option<CacheCoordinator<B, S, M>>,
}

impl EyeClient {
    /// HTTP client without a cache
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::with_gateway(HttpGateway::new(&config)?))
    }

    /// HTTP client with an in-memory cache using default settings
    pub fn with_memory_cache(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        Ok(client.with_cache(MemoryBackend::default()))
    }
}

impl<G: Gateway> EyeClient<G> {
    /// Client over a custom transport, without a cache
    pub fn with_gateway(gateway: G) -> Self {
        Self {
            gateway: Arc::new(gateway),
            cache: None,
        }
    }
}

impl<G, B, S, M> EyeClient<G, B, S, M>
where
    G: Gateway,
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Attach a cache on `backend` with default coordinator settings
    pub fn with_cache<B2: CacheStore>(self, backend: B2) -> EyeClient<G, B2> {
        self.with_coordinator(CacheCoordinator::with_config(
            backend,
            CoordinatorConfig::default(),
        ))
    }

    /// Attach a fully configured cache coordinator
    pub fn with_coordinator<B2, S2, M2>(
        self,
        coordinator: CacheCoordinator<B2, S2, M2>,
    ) -> EyeClient<G, B2, S2, M2>
    where
        B2: CacheStore,
        S2: Serializer,
        M2: CacheMetrics,
    {
        EyeClient {
            gateway: self.gateway,
            cache: Some(coordinator),
        }
    }

    /// The cache coordinator, if one is attached
    pub fn cache(&self) -> Option<&CacheCoordinator<B, S, M>> {
        self.cache.as_ref()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    async fn call(&self, request: ApiRequest) -> Result<Value> {
        gateway::call(self.gateway.as_ref(), &request).await
    }

    /// Read through the cache when there is one
    async fn read<T, F, Fut, P>(&self, key: &CacheKey, fetch: F, place: P) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> Placement,
    {
        self.read_matching(key, |_| true, fetch, place).await
    }

    /// Read through the cache, refetching cached values `accept` rejects
    async fn read_matching<T, A, F, Fut, P>(
        &self,
        key: &CacheKey,
        accept: A,
        fetch: F,
        place: P,
    ) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
        A: FnOnce(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> Placement,
    {
        match &self.cache {
            Some(cache) => cache.read_through_matching(key, accept, fetch, place).await,
            None => fetch().await,
        }
    }

    async fn invalidate(&self, mutation: Mutation) {
        if let Some(cache) = &self.cache {
            cache.apply(&mutation).await;
        }
    }

    /// Open a new session
    pub async fn create_session(&self, definition: &SessionDefinition) -> Result<Session> {
        let endpoint = Endpoint::CreateSession;
        let body = wire::encode(
            endpoint.description(),
            &wire::CreateSessionBody::from(definition),
        )?;

        let value = self.call(ApiRequest::new(endpoint).body(body)).await?;
        self.invalidate(Mutation::CreateSession).await;

        wire::decode::<SessionResponse>(endpoint.description(), value)?
            .into_session(endpoint.description())
    }

    /// Fetch a session with its activities
    pub async fn get_session(&self, id: impl Into<EntityId>) -> Result<Session> {
        let id = id.into();
        if id.is_empty() {
            return Err(EyeError::InvalidRequest("session id is empty".to_string()));
        }
        let endpoint = Endpoint::GetSession;
        let key = CacheKey::session(&id);

        self.read(
            &key,
            || async {
                let request = ApiRequest::new(endpoint).query("id", id.to_string());
                let value = self.call(request).await?;
                wire::decode::<SessionResponse>(endpoint.description(), value)?
                    .into_session(endpoint.description())
            },
            |session| {
                let placement = Placement::new(key.clone());
                match &session.user_id {
                    Some(user) => placement.link(key.clone(), CacheKey::user(user)),
                    None => placement,
                }
            },
        )
        .await
    }

    /// Record an activity in a session
    pub async fn create_activity(&self, definition: &ActivityDefinition) -> Result<Activity> {
        if definition.session_id.is_empty() {
            return Err(EyeError::InvalidRequest("session id is empty".to_string()));
        }
        let endpoint = Endpoint::CreateActivity;
        let body = wire::encode(
            endpoint.description(),
            &wire::CreateActivityBody::from(definition),
        )?;

        let value = self.call(ApiRequest::new(endpoint).body(body)).await?;
        self.invalidate(Mutation::CreateActivity {
            session: definition.session_id.clone(),
        })
        .await;

        wire::decode::<ActivityResponse>(endpoint.description(), value)?
            .into_activity(Some(&definition.session_id), endpoint.description())
    }

    /// Query activities
    pub async fn list_activities(&self, filter: &ActivityFilter) -> Result<ActivityList> {
        if filter.from > filter.to {
            return Err(EyeError::InvalidRequest(format!(
                "date range ends before it starts: {} > {}",
                filter.from, filter.to
            )));
        }
        let endpoint = Endpoint::ListActivities;
        let key = CacheKey::activities(filter);

        self.read(
            &key,
            || async {
                let request = ApiRequest::new(endpoint).query_pairs(wire::activity_query(filter));
                let value = self.call(request).await?;
                let activities: Vec<ActivityResponse> =
                    wire::decode(endpoint.description(), value)?;
                wire::into_activity_list(activities, endpoint.description())
            },
            |_| Placement::new(key.clone()),
        )
        .await
    }

    /// Create a user profile
    pub async fn create_user(&self, definition: &UserDefinition) -> Result<User> {
        let endpoint = Endpoint::CreateUser;
        let body = wire::encode(endpoint.description(), &wire::UserBody::from(definition))?;

        let value = self.call(ApiRequest::new(endpoint).body(body)).await?;
        self.invalidate(Mutation::CreateUser).await;

        Ok(wire::decode::<UserResponse>(endpoint.description(), value)?.into())
    }

    /// Fetch a user by id, session, keycloak id or email, in that priority.
    ///
    /// A fetched user is cached under its id, with aliases for its email,
    /// keycloak id and sessions, so later lookups by any of those are hits.
    /// A user reached through an alias who no longer carries the aliased
    /// email, keycloak id or session is fetched again.
    pub async fn get_user(&self, filter: &UserFilter) -> Result<User> {
        let lookup = filter.lookup().ok_or_else(|| {
            EyeError::InvalidRequest("user filter has no criterion".to_string())
        })?;
        let endpoint = Endpoint::GetUser;
        let key = CacheKey::for_user_lookup(&lookup);

        self.read_matching(
            &key,
            |user| lookup.matches(user),
            || async {
                let request = ApiRequest::new(endpoint).query(lookup.param(), lookup.value());
                let value = self.call(request).await?;
                Ok(wire::decode::<UserResponse>(endpoint.description(), value)?.into())
            },
            |user| user_placement(user, &key),
        )
        .await
    }

    /// Resolve a user id by session, keycloak id or email.
    ///
    /// Answered from the cache when the lookup alias resolves to a cached
    /// user; otherwise always remote and never cached.
    pub async fn get_user_id(&self, filter: &UserFilter) -> Result<EntityId> {
        let lookup = filter.secondary_lookup().ok_or_else(|| {
            EyeError::InvalidRequest(
                "user id lookup needs a session, keycloak id or email".to_string(),
            )
        })?;

        if let Some(cache) = &self.cache {
            let key = CacheKey::for_user_lookup(&lookup);
            if let Some(user) = cache
                .lookup_matching::<User, _>(&key, |user| lookup.matches(user))
                .await
            {
                return Ok(user.id);
            }
        }

        let endpoint = Endpoint::GetUserId;
        let request = ApiRequest::new(endpoint).query(lookup.param(), lookup.value());
        let value = self.call(request).await?;
        Ok(wire::decode::<UserIdResponse>(endpoint.description(), value)?.id)
    }

    /// Update a user profile.
    ///
    /// The cached user is dropped, along with every session linked to it.
    pub async fn update_user(&self, user: &User) -> Result<User> {
        if user.id.is_empty() {
            return Err(EyeError::InvalidRequest("user id is empty".to_string()));
        }
        let endpoint = Endpoint::UpdateUser;
        let body = wire::encode(endpoint.description(), &wire::UserBody::from(user))?;

        let value = self.call(ApiRequest::new(endpoint).body(body)).await?;
        self.invalidate(Mutation::UpdateUser {
            user: user.id.clone(),
        })
        .await;

        if value.is_null() {
            return Ok(user.clone());
        }
        Ok(wire::decode::<UserResponse>(endpoint.description(), value)?.into())
    }

    /// Link a session to a user
    pub async fn identify_session(
        &self,
        session_id: impl Into<EntityId>,
        user_id: impl Into<EntityId>,
    ) -> Result<()> {
        let session = session_id.into();
        let user = user_id.into();
        if session.is_empty() || user.is_empty() {
            return Err(EyeError::InvalidRequest(
                "identify needs both a session id and a user id".to_string(),
            ));
        }
        let endpoint = Endpoint::IdentifySession;
        let body = wire::encode(
            endpoint.description(),
            &wire::IdentifyBody {
                session_id: &session,
                user_id: &user,
            },
        )?;

        self.call(ApiRequest::new(endpoint).body(body)).await?;
        self.invalidate(Mutation::IdentifySession { session, user })
            .await;
        Ok(())
    }

    /// Fetch the tag catalog
    pub async fn list_tags(&self) -> Result<TagList> {
        let endpoint = Endpoint::ListTags;
        let key = CacheKey::tags();

        self.read(
            &key,
            || async {
                let value = self.call(ApiRequest::new(endpoint)).await?;
                let tags: Vec<TagResponse> = wire::decode(endpoint.description(), value)?;
                Ok(wire::into_tag_list(tags))
            },
            |_| Placement::new(key.clone()),
        )
        .await
    }
}

/// Primary key, aliases and session edges of a fetched user
fn user_placement(user: &User, requested: &CacheKey) -> Placement {
    let primary = CacheKey::user(&user.id);
    let mut placement = Placement::new(primary.clone());

    if requested.is_alias() {
        placement = placement.alias(requested.clone());
    }
    if let Some(email) = user.email.as_deref().filter(|e| !e.trim().is_empty()) {
        placement = placement.alias(CacheKey::user_by_email(email));
    }
    if let Some(keycloak) = user.keycloak_id.as_deref().filter(|k| !k.trim().is_empty()) {
        placement = placement.alias(CacheKey::user_by_keycloak(keycloak));
    }
    for session in &user.sessions {
        placement = placement
            .alias(CacheKey::user_by_session(session))
            .link(CacheKey::session(session), primary.clone());
    }
    placement
}

impl<G, B, S, M> Clone for EyeClient<G, B, S, M>
where
    G: Gateway,
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserLookup;

    #[test]
    fn test_user_placement() {
        let user = User {
            id: EntityId::from(1),
            name: None,
            surname: None,
            email: Some("A@b.com".to_string()),
            keycloak_id: Some("kc".to_string()),
            sessions: vec![EntityId::from("s1"), EntityId::from("s2")],
            profile: Default::default(),
        };
        let placement = user_placement(&user, &CacheKey::user_by_email("a@b.com"));

        assert_eq!(placement.primary, CacheKey::user(&EntityId::from(1)));
        assert_eq!(
            placement.aliases,
            vec![
                CacheKey::user_by_email("a@b.com"),
                CacheKey::user_by_keycloak("kc"),
                CacheKey::user_by_session(&EntityId::from("s1")),
                CacheKey::user_by_session(&EntityId::from("s2")),
            ]
        );
        assert_eq!(
            placement.links,
            vec![
                (
                    CacheKey::session(&EntityId::from("s1")),
                    CacheKey::user(&EntityId::from(1))
                ),
                (
                    CacheKey::session(&EntityId::from("s2")),
                    CacheKey::user(&EntityId::from(1))
                ),
            ]
        );
    }

    #[test]
    fn test_user_placement_by_id_has_no_extra_alias() {
        let user = User {
            id: EntityId::from(1),
            name: None,
            surname: None,
            email: None,
            keycloak_id: None,
            sessions: Vec::new(),
            profile: Default::default(),
        };
        let placement = user_placement(&user, &CacheKey::user(&EntityId::from(1)));
        assert!(placement.aliases.is_empty());
        assert!(placement.links.is_empty());
    }

    #[test]
    fn test_lookup_param_matches_endpoint_query() {
        let lookup = UserLookup::Keycloak("kc".into());
        assert_eq!(lookup.param(), "keycloakId");
    }
}
