use eye_client::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    println!("Connecting to Redis at {}", redis_url);

    let backend = match RedisBackend::new(RedisConfig::new(redis_url).pool_size(5).prefix("eye")).await {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Failed to connect to Redis: {}", e);
            println!("Make sure Redis is running at 127.0.0.1:6379 or set REDIS_URL");
            return Ok(());
        }
    };

    // Several processes can share one Redis store; the namespace keeps
    // this application's keys apart
    let coordinator = CacheCoordinator::with_config(
        backend,
        CoordinatorConfig::with_namespace("tracking").single_flight(),
    );
    let client = EyeClient::new(ClientConfig::from_env()?)?.with_coordinator(coordinator);

    let tags = client.list_tags().await?;
    println!("{} tags", tags.len());

    // Served from Redis
    let tags = client.list_tags().await?;
    for tag in tags.iter() {
        println!("  {} {}", tag.id, tag.name);
    }

    Ok(())
}
