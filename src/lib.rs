//! # cache-headers
//!
//! Response-header middleware for sites sitting behind cache proxies:
//!
//! - [`cache::CacheControl`] renders a `Cache-Control` directive string from a
//!   small fixed policy (`no-store`, `private`, `max-age`, `s-maxage`,
//!   `stale-while-revalidate`).
//! - [`cache::CacheChannels`] tags responses with invalidation channels for
//!   Varnish (`X-Cache-Channel`) and Cloudflare (`Cache-Tag`).
//!
//! Both plug into the async HTTP/1.1 stack in [`server`] and [`middleware`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cache_headers::cache::{CacheChannels, CacheControl};
//! use cache_headers::context::Context;
//! use cache_headers::middleware::Pipeline;
//! use cache_headers::server::Server;
//! use cache_headers::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut control = CacheControl::new();
//!     control.set_max_age(20);
//!     control.set_s_maxage(40);
//!
//!     let mut channels = CacheChannels::new()?.varnish(true);
//!     channels.add(["Cat_Articles"]);
//!
//!     let handler = Pipeline::new()
//!         .layer(Arc::new(control))
//!         .layer(Arc::new(channels))
//!         .endpoint(|_ctx: Context| async { Response::new(StatusCode::Ok).body("ok!") });
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(handler).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

pub use cache::{CacheChannels, CacheControl, CachePolicy};
pub use config::HeaderConfig;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
