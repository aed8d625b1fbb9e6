//! How invalidation walks dependency edges, without a remote service

use eye_client::coordinator::{CacheCoordinator, Mutation, Placement};
use eye_client::{CacheKey, EntityId, MemoryBackend, MemoryConfig};

#[tokio::main]
async fn main() {
    let cache = CacheCoordinator::new(MemoryBackend::new(MemoryConfig::default()));

    let user = EntityId::from(1);
    let sessions = [EntityId::from("s-1"), EntityId::from("s-2")];

    // A user with two sessions, each cached on its own
    let mut placement = Placement::new(CacheKey::user(&user)).alias(CacheKey::user_by_email("ada@example.com"));
    for session in &sessions {
        placement = placement.link(CacheKey::session(session), CacheKey::user(&user));
        cache
            .store(&Placement::new(CacheKey::session(session)), &format!("session {}", session))
            .await;
    }
    cache.store(&placement, &"Ada").await;

    for session in &sessions {
        println!(
            "{} cached: {}",
            CacheKey::session(session),
            cache.contains(&CacheKey::session(session)).await
        );
    }

    // Updating the user drops it and both sessions
    let removed = cache.apply(&Mutation::UpdateUser { user: user.clone() }).await;
    println!("update_user removed {} entries", removed);

    // The email alias survives but no longer resolves
    let by_email: Option<String> = cache.lookup(&CacheKey::user_by_email("ada@example.com")).await;
    println!("user by email after update: {:?}", by_email);
}
