//! Response headers for upstream cache proxies.
//!
//! Two independent layers:
//!
//! - [`CacheControl`] — renders a `Cache-Control` directive string from a
//!   fixed policy.
//! - [`CacheChannels`] — stamps invalidation tags on responses so that
//!   Varnish (`X-Cache-Channel`) or Cloudflare (`Cache-Tag`) can purge every
//!   response sharing a tag at once.
//!
//! Both implement [`Middleware`](crate::middleware::Middleware) and are
//! usually stacked in one [`Pipeline`](crate::middleware::Pipeline).
//!
//! A layer computes its header value before forwarding the request, and
//! writes it onto the response only when the downstream handler did not set
//! a header of the same name. The handler's value replaces the layer's; it is
//! never appended next to it, so a response carries at most one
//! `Cache-Control`, `X-Cache-Channel`, or `Cache-Tag` value from this path.

mod channels;
mod control;

pub use channels::{
    CACHE_CHANNEL_HEADER, CACHE_TAG_HEADER, CacheChannels, ChannelError, ChannelSet, Sanitizer,
};
pub use control::{CACHE_CONTROL_HEADER, CachePolicy, CacheControl, Directive};

use crate::Response;

// A header the downstream handler already set takes precedence, as if the
// layer had written it before the handler ran.
fn apply_header(response: &mut Response, name: &'static str, value: &str) {
    if response.headers().contains(name) {
        tracing::trace!(header = name, "keeping header set by downstream handler");
        return;
    }
    response.set_header(name, value);
}
