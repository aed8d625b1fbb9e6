use async_trait::async_trait;
use eye_client::gateway::{ApiRequest, Endpoint, Gateway, RawResponse};
use eye_client::prelude::*;
use eye_client::{JsonSerializer, TracingMetrics};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Canned answers so the example runs without a service
struct OfflineGateway;

#[async_trait]
impl Gateway for OfflineGateway {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        let body = match request.endpoint {
            Endpoint::GetSession => serde_json::json!({
                "id": "s-1",
                "dtCreated": "2024-05-01 10:00:00",
                "dtExpired": "2024-05-01 10:30:00",
                "ipAddress": "203.0.113.7",
                "userId": 1
            }),
            Endpoint::UpdateUser => serde_json::json!({"id": 1, "email": "ada@example.com"}),
            _ => serde_json::json!({"error": "not available offline"}),
        };
        let status = if body.get("error").is_some() { 404 } else { 200 };
        Ok(RawResponse::new(status, body.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let coordinator = CacheCoordinator::with_serializer_and_metrics(
        MemoryBackend::new(MemoryConfig::default()),
        JsonSerializer,
        TracingMetrics::new().with_service_name("tracking-example"),
        CoordinatorConfig::default(),
    );
    let client = EyeClient::with_gateway(OfflineGateway).with_coordinator(coordinator);

    println!("\nFetching session (miss)...");
    client.get_session("s-1").await?;

    println!("\nFetching session again (hit)...");
    client.get_session("s-1").await?;

    println!("\nUpdating its user (drops the session)...");
    let user = User {
        id: EntityId::from(1),
        name: None,
        surname: None,
        email: Some("ada@example.com".to_string()),
        keycloak_id: None,
        sessions: Vec::new(),
        profile: Default::default(),
    };
    client.update_user(&user).await?;

    println!("\nFetching session (miss)...");
    client.get_session("s-1").await?;

    Ok(())
}
