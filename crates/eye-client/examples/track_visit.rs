//! Record a visit against a live Eye service.
//!
//! Needs `EYE_HOST` and `EYE_TOKEN` in the environment.

use eye_client::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    println!("Talking to {}", config.base_uri());

    let client = EyeClient::with_memory_cache(config)?;

    let session = client
        .create_session(&SessionDefinition::new("203.0.113.7"))
        .await?;
    println!("Opened session {} (expires {})", session.id, session.expires_at);

    let activity = client
        .create_activity(
            &ActivityDefinition::new(session.id.clone(), "203.0.113.7", 1u64)
                .with_metadata("page", "/pricing"),
        )
        .await?;
    println!("Recorded {} ({})", activity.id, activity.activity_type.name);

    let user = client
        .create_user(&UserDefinition::new().name("Ada").email("ada@example.com"))
        .await?;
    client.identify_session(session.id.clone(), user.id.clone()).await?;

    // First call goes to the service, the second one is served from the cache
    for _ in 0..2 {
        let user = client.get_user(&UserFilter::by_email("ada@example.com")).await?;
        println!("User {} has {} session(s)", user.id, user.sessions.len());
    }

    if let Some(cache) = client.cache() {
        println!("Cache stats: {:?}", cache.stats().await?);
    }

    Ok(())
}
