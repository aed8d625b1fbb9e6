use chrono::NaiveDate;

use super::{EntityId, User};

/// Full-text search over activity metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSearch {
    pub term: String,
    /// Restrict the search to one metadata key
    pub key: Option<String>,
}

/// Activity query.
///
/// `type_ids` and `continents` are sets: their order never changes the
/// result, and never changes the cache key either.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityFilter {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub type_ids: Vec<EntityId>,
    pub ip_address: Option<String>,
    pub email: Option<String>,
    /// ISO 3166 two-letter continent codes
    pub continents: Vec<String>,
    pub metadata_search: Option<MetadataSearch>,
}

impl ActivityFilter {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            type_ids: Vec::new(),
            ip_address: None,
            email: None,
            continents: Vec::new(),
            metadata_search: None,
        }
    }

    pub fn type_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        self.type_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn continents<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.continents.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn metadata_search(mut self, term: impl Into<String>, key: Option<String>) -> Self {
        self.metadata_search = Some(MetadataSearch {
            term: term.into(),
            key,
        });
        self
    }

    /// Type ids as a sorted set of their textual form
    pub(crate) fn type_id_set(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .type_ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Continent codes as a sorted set, upper-cased
    pub(crate) fn continent_set(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .continents
            .iter()
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    pub(crate) fn ip_address_value(&self) -> Option<String> {
        non_blank(&self.ip_address)
    }

    pub(crate) fn email_value(&self) -> Option<String> {
        non_blank(&self.email)
    }

    /// Search term and key; the key only counts together with a term
    pub(crate) fn search_terms(&self) -> Option<(String, Option<String>)> {
        let search = self.metadata_search.as_ref()?;
        let term = search.term.trim();
        if term.is_empty() {
            return None;
        }
        Some((term.to_string(), non_blank(&search.key)))
    }
}

/// Ways of locating a single user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub id: Option<EntityId>,
    pub session_id: Option<EntityId>,
    pub keycloak_id: Option<String>,
    pub email: Option<String>,
}

/// The one criterion a user query is sent with
#[derive(Debug, Clone, PartialEq)]
pub enum UserLookup {
    Id(EntityId),
    Session(EntityId),
    Keycloak(String),
    Email(String),
}

impl UserLookup {
    /// Query parameter name on the service
    pub fn param(&self) -> &'static str {
        match self {
            UserLookup::Id(_) => "id",
            UserLookup::Session(_) => "sessionId",
            UserLookup::Keycloak(_) => "keycloakId",
            UserLookup::Email(_) => "email",
        }
    }

    pub fn value(&self) -> String {
        match self {
            UserLookup::Id(id) | UserLookup::Session(id) => id.to_string(),
            UserLookup::Keycloak(v) | UserLookup::Email(v) => v.clone(),
        }
    }

    /// Whether `user` is still the one this lookup finds
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserLookup::Id(id) => user.id == *id,
            UserLookup::Session(session) => user.sessions.contains(session),
            UserLookup::Keycloak(keycloak) => user
                .keycloak_id
                .as_deref()
                .is_some_and(|k| k.trim() == keycloak.trim()),
            UserLookup::Email(email) => user
                .email
                .as_deref()
                .is_some_and(|e| normalize_email(e) == normalize_email(email)),
        }
    }
}

/// Emails are matched ignoring case and surrounding whitespace
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl UserFilter {
    pub fn by_id(id: impl Into<EntityId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_session(session_id: impl Into<EntityId>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn by_keycloak_id(keycloak_id: impl Into<String>) -> Self {
        Self {
            keycloak_id: Some(keycloak_id.into()),
            ..Default::default()
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// The criterion used for a user query: id, then session, then keycloak
    /// id, then email. Blank values are skipped.
    pub fn lookup(&self) -> Option<UserLookup> {
        self.id
            .clone()
            .filter(|id| !id.is_empty())
            .map(UserLookup::Id)
            .or_else(|| self.secondary_lookup())
    }

    /// Same priority as [`lookup`](Self::lookup) without the id, which is
    /// what a user-id query can be sent with
    pub fn secondary_lookup(&self) -> Option<UserLookup> {
        if let Some(session) = self.session_id.clone().filter(|id| !id.is_empty()) {
            return Some(UserLookup::Session(session));
        }
        if let Some(keycloak) = non_blank(&self.keycloak_id) {
            return Some(UserLookup::Keycloak(keycloak));
        }
        non_blank(&self.email).map(|email| UserLookup::Email(normalize_email(&email)))
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_priority() {
        let filter = UserFilter {
            id: Some(EntityId::from(1)),
            session_id: Some(EntityId::from("s1")),
            keycloak_id: Some("kc".into()),
            email: Some("a@b.com".into()),
        };
        assert_eq!(filter.lookup(), Some(UserLookup::Id(EntityId::from(1))));

        let filter = UserFilter {
            id: None,
            ..filter
        };
        assert_eq!(
            filter.lookup(),
            Some(UserLookup::Session(EntityId::from("s1")))
        );

        let filter = UserFilter {
            session_id: None,
            ..filter
        };
        assert_eq!(filter.lookup(), Some(UserLookup::Keycloak("kc".into())));

        let filter = UserFilter {
            keycloak_id: Some("  ".into()),
            ..filter
        };
        assert_eq!(filter.lookup(), Some(UserLookup::Email("a@b.com".into())));
    }

    #[test]
    fn test_empty_filter_has_no_lookup() {
        assert!(UserFilter::default().lookup().is_none());
        assert!(UserFilter::by_id("").lookup().is_none());
    }

    #[test]
    fn test_activity_filter_sets() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let filter = ActivityFilter::new(day, day)
            .type_ids([EntityId::from(3), EntityId::from("1"), EntityId::from("3")])
            .continents(["eu", "AS", " EU "]);

        assert_eq!(filter.type_id_set(), vec!["1", "3"]);
        assert_eq!(filter.continent_set(), vec!["AS", "EU"]);
    }

    #[test]
    fn test_search_key_needs_term() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let filter = ActivityFilter::new(day, day).metadata_search(" ", Some("page".into()));
        assert!(filter.search_terms().is_none());

        let filter = filter.metadata_search("home", Some("page".into()));
        assert_eq!(
            filter.search_terms(),
            Some(("home".to_string(), Some("page".to_string())))
        );
    }

    #[test]
    fn test_secondary_lookup_ignores_id() {
        assert!(UserFilter::by_id(5).secondary_lookup().is_none());
        assert_eq!(
            UserFilter::by_email("x@y.z").secondary_lookup().map(|l| l.param()),
            Some("email")
        );
    }

    #[test]
    fn test_email_lookup_is_normalised() {
        assert_eq!(
            UserFilter::by_email(" Ada@Example.COM ").lookup(),
            Some(UserLookup::Email("ada@example.com".into()))
        );
    }

    #[test]
    fn test_lookup_matches_user() {
        let user = User {
            id: EntityId::from(7),
            name: None,
            surname: None,
            email: Some("Ada@Example.com".into()),
            keycloak_id: Some("kc-7".into()),
            sessions: vec![EntityId::from("s1")],
            profile: Default::default(),
        };

        assert!(UserLookup::Id(EntityId::from("7")).matches(&user));
        assert!(UserLookup::Session(EntityId::from("s1")).matches(&user));
        assert!(UserLookup::Keycloak(" kc-7".into()).matches(&user));
        assert!(UserLookup::Email("ada@example.com".into()).matches(&user));

        assert!(!UserLookup::Session(EntityId::from("s2")).matches(&user));
        assert!(!UserLookup::Keycloak("kc-8".into()).matches(&user));
        assert!(!UserLookup::Email("old@example.com".into()).matches(&user));
        assert!(!UserLookup::Email("ada@example.com".into()).matches(&User {
            email: None,
            ..user
        }));
    }
}
