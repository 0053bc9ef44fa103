//! Serves a fixed page through both cache header layers.
//!
//! ```text
//! cargo run --example serve -- headers.json
//! curl -i http://127.0.0.1:8080/
//! ```
//!
//! Without an argument the demo uses a built-in configuration.

use cache_headers::context::Context;
use cache_headers::{HeaderConfig, Response, Server, StatusCode};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = r#"{
    "cache_control": { "max_age": 20, "s_maxage": 40, "stale_while_revalidate": 120 },
    "cache_channels": { "varnish": true, "cloudflare": true,
                        "channels": ["Cat(øøøøø)_Articles//", "Cat_Pictures"] }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => HeaderConfig::load(path)?,
        None => HeaderConfig::from_json(DEFAULT_CONFIG)?,
    };

    let handler = config.pipeline()?.endpoint(|ctx: Context| async move {
        Response::new(StatusCode::Ok).body(format!("cached page for {}\n", ctx.request().path()))
    });

    Server::bind("127.0.0.1:8080").await?.serve(handler).await?;
    Ok(())
}
