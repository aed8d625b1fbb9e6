//! Remote resource gateway
//!
//! A [`Gateway`] performs the raw HTTP exchange; [`classify`] turns the raw
//! response into an [`Outcome`]. Classification is shared by every transport,
//! so tests can swap in a scripted gateway without touching it.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Instant;

use crate::error::{EyeError, Result};

mod http;
pub use http::HttpGateway;

/// Every remote operation the client performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CreateSession,
    GetSession,
    CreateActivity,
    ListActivities,
    CreateUser,
    GetUser,
    GetUserId,
    UpdateUser,
    IdentifySession,
    ListTags,
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::CreateSession
            | Endpoint::CreateActivity
            | Endpoint::CreateUser
            | Endpoint::IdentifySession => Method::POST,
            Endpoint::UpdateUser => Method::PATCH,
            Endpoint::GetSession
            | Endpoint::ListActivities
            | Endpoint::GetUser
            | Endpoint::GetUserId
            | Endpoint::ListTags => Method::GET,
        }
    }

    /// Path below the versioned base URI
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::CreateSession => "/sessions",
            Endpoint::GetSession => "/session",
            Endpoint::CreateActivity | Endpoint::ListActivities => "/activities",
            Endpoint::CreateUser => "/users",
            Endpoint::GetUser | Endpoint::UpdateUser => "/user",
            Endpoint::GetUserId => "/user/id",
            Endpoint::IdentifySession => "/session/identify",
            Endpoint::ListTags => "/tags",
        }
    }

    /// Statuses that count as success
    pub fn success_statuses(&self) -> &'static [u16] {
        match self {
            Endpoint::IdentifySession => &[200, 204],
            _ => &[200],
        }
    }

    /// Body field carrying the error message on failure
    pub fn message_field(&self) -> &'static str {
        match self {
            Endpoint::UpdateUser => "message",
            _ => "error",
        }
    }

    /// Human-readable operation name, used in error messages
    pub fn description(&self) -> &'static str {
        match self {
            Endpoint::CreateSession => "Create session",
            Endpoint::GetSession => "Get session",
            Endpoint::CreateActivity => "Create activity",
            Endpoint::ListActivities => "Get activities",
            Endpoint::CreateUser => "Create user",
            Endpoint::GetUser => "Get user",
            Endpoint::GetUserId => "Get user id",
            Endpoint::UpdateUser => "Update user",
            Endpoint::IdentifySession => "Identify session",
            Endpoint::ListTags => "Get tags",
        }
    }
}

/// One call to the service
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn query_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and body text as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Transport for service calls.
///
/// Implementations deliver the request and hand back whatever came back;
/// they never interpret the status.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse>;
}

/// Classified service response
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Decoded body; `Null` for an empty body
    Success(Value),
    Unauthorized(String),
    ApiError(String),
    /// Failure without a message, or a body that is not JSON
    UnknownError(String),
}

impl Outcome {
    pub fn into_result(self, endpoint: Endpoint) -> Result<Value> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Unauthorized(message) => Err(EyeError::Unauthorized(message)),
            Outcome::ApiError(message) => Err(EyeError::Api(message)),
            Outcome::UnknownError(body) => Err(EyeError::Unknown {
                operation: endpoint.description().to_string(),
                body,
            }),
        }
    }
}

/// Classify a raw response for `endpoint`
pub fn classify(endpoint: Endpoint, response: &RawResponse) -> Outcome {
    let parsed = if response.body.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str::<Value>(&response.body).ok()
    };

    if endpoint.success_statuses().contains(&response.status) {
        return match parsed {
            Some(value) => Outcome::Success(value),
            None => Outcome::UnknownError(response.body.clone()),
        };
    }

    let message = parsed
        .as_ref()
        .and_then(|body| body.get(endpoint.message_field()))
        .filter(|message| !message.is_null())
        .map(|message| match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });

    match message {
        Some(message) if response.status == 403 => Outcome::Unauthorized(message),
        Some(message) => Outcome::ApiError(message),
        None => Outcome::UnknownError(response.body.clone()),
    }
}

/// Send `request` and classify the response
pub async fn call<G>(gateway: &G, request: &ApiRequest) -> Result<Value>
where
    G: Gateway + ?Sized,
{
    let start = Instant::now();
    let response = gateway.send(request).await?;
    tracing::debug!(
        endpoint = request.endpoint.description(),
        status = response.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "eye request"
    );
    classify(request.endpoint, &response).into_result(request.endpoint)
}
