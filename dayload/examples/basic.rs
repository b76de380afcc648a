//! Basic loader example
//!
//! Fires several overlapping requests for the same queries and shows how many
//! actually reached the query service.
//!
//! Usage:
//!   cargo run --example basic -- http://localhost:8080

use dayload::{DataLoader, LoaderConfig};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let loader = DataLoader::new(LoaderConfig::new(base_url).with_max_concurrency(4)).await?;

    println!("refresh hour: {:02}:00", loader.refresh_hour());

    // 1. Ten callers, two distinct queries
    let params = json!({"region": "north"});
    let calls = (0..10).map(|i| {
        let loader = loader.clone();
        let params = params.clone();
        async move {
            let query = if i % 2 == 0 { "salesByRegion" } else { "inventory" };
            loader.fetch_response(query, Some(params)).await
        }
    });
    for response in futures::future::join_all(calls).await {
        match response.data {
            Some(data) => println!("  {:?}: {}", response.status, data),
            None => println!("  {:?}: {}", response.status, response.message.unwrap_or_default()),
        }
    }

    // 2. Same query again, answered from cache
    let _ = loader.fetch("salesByRegion", Some(params)).await;

    let stats = loader.stats();
    println!("network calls: {}", stats.network_calls);
    println!("dedup joins:   {}", stats.dedup_joins);
    println!("hit rate:      {:.2}%", stats.hit_rate());

    loader.shutdown();
    Ok(())
}
