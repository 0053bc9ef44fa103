//! Cache invalidation channels (Varnish) and cache tags (Cloudflare).
//!
//! Tags go through two separate stages:
//!
//! 1. **sanitize and store** — [`CacheChannels::add`] strips every character
//!    outside `[A-Za-z0-9_-]` and appends the result to a [`ChannelSet`];
//! 2. **render** — [`ChannelSet::render`] turns the stored tags into header
//!    pairs for whichever proxies are enabled at request time.

use std::borrow::Cow;
use std::sync::Arc;

use regex_lite::Regex;
use thiserror::Error;
use tracing::debug;

use super::apply_header;
use crate::context::Context;
use crate::middleware::{Handler, IntoHandler, Middleware, Next, Pipeline, ResponseFuture};

/// Header read by Varnish; tags are separated by `", "`.
pub const CACHE_CHANNEL_HEADER: &str = "X-Cache-Channel";

/// Header read by Cloudflare (Enterprise); tags are separated by `","`.
pub const CACHE_TAG_HEADER: &str = "Cache-Tag";

// Anything that is not an ASCII word character or a hyphen.
const DISALLOWED: &str = r"[^\w-]+";

/// Errors raised while setting up a [`CacheChannels`] layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel sanitizer pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
}

/// Strips characters that are not safe in a channel name.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    disallowed: Regex,
}

impl Sanitizer {
    /// Compiles the sanitizer pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Pattern`] if the sanitizer pattern fails to compile.
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self {
            disallowed: Regex::new(DISALLOWED)?,
        })
    }

    /// Removes every character outside `[A-Za-z0-9_-]`. Borrows `name` when
    /// nothing had to be removed.
    ///
    /// ```
    /// use cache_headers::cache::Sanitizer;
    ///
    /// let sanitizer = Sanitizer::new().unwrap();
    /// assert_eq!(sanitizer.sanitize("Cat(øøøøø)_Articles//"), "Cat_Articles");
    /// ```
    pub fn sanitize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        self.disallowed.replace_all(name, "")
    }
}

/// Ordered, already-sanitized cache tags.
///
/// Duplicates and empty tags are kept as they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    tags: Vec<String>,
}

impl ChannelSet {
    /// Returns the stored tags in insertion order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the number of stored tags, duplicates included.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if no tag has been added.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// `X-Cache-Channel` value: tags joined by `", "`.
    pub fn varnish_value(&self) -> String {
        self.tags.join(", ")
    }

    /// `Cache-Tag` value: tags joined by `","`.
    pub fn cloudflare_value(&self) -> String {
        self.tags.join(",")
    }

    /// Header pairs for the enabled proxies, Varnish first.
    pub fn render(&self, varnish: bool, cloudflare: bool) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(2);
        if varnish {
            headers.push((CACHE_CHANNEL_HEADER, self.varnish_value()));
        }
        if cloudflare {
            headers.push((CACHE_TAG_HEADER, self.cloudflare_value()));
        }
        headers
    }

    fn push(&mut self, tag: String) {
        self.tags.push(tag);
    }

    fn clear(&mut self) {
        self.tags.clear();
    }
}

/// Middleware that writes cache channel / cache tag headers.
///
/// Proxies use these headers to ban or purge large groups of cached responses
/// in one go.
///
/// # Examples
///
/// ```
/// use cache_headers::cache::CacheChannels;
///
/// let mut channels = CacheChannels::new()?.varnish(true).cloudflare(true);
/// channels.set(["Cat_Articles"]);
/// channels.add(["Cat_Pictures", "Dog_Pictures"]);
///
/// assert_eq!(
///     channels.headers(),
///     vec![
///         ("X-Cache-Channel", "Cat_Articles, Cat_Pictures, Dog_Pictures".to_owned()),
///         ("Cache-Tag", "Cat_Articles,Cat_Pictures,Dog_Pictures".to_owned()),
///     ]
/// );
/// # Ok::<(), cache_headers::cache::ChannelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CacheChannels {
    sanitizer: Sanitizer,
    channels: ChannelSet,
    varnish: bool,
    cloudflare: bool,
}

impl CacheChannels {
    /// Creates an empty registry with both proxies disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the channel-name sanitizer cannot be built.
    /// Callers decide whether that aborts startup.
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self {
            sanitizer: Sanitizer::new()?,
            channels: ChannelSet::default(),
            varnish: false,
            cloudflare: false,
        })
    }

    /// Emit `X-Cache-Channel` for Varnish.
    #[must_use]
    pub fn varnish(mut self, enabled: bool) -> Self {
        self.varnish = enabled;
        self
    }

    /// Emit `Cache-Tag` for Cloudflare.
    #[must_use]
    pub fn cloudflare(mut self, enabled: bool) -> Self {
        self.cloudflare = enabled;
        self
    }

    /// In-place form of [`varnish`](Self::varnish).
    pub fn set_varnish(&mut self, enabled: bool) {
        self.varnish = enabled;
    }

    /// In-place form of [`cloudflare`](Self::cloudflare).
    pub fn set_cloudflare(&mut self, enabled: bool) {
        self.cloudflare = enabled;
    }

    /// Sanitizes each name and appends it. A name that sanitizes to `""` is
    /// still appended.
    pub fn add<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            let tag = self.sanitizer.sanitize(name);
            if let Cow::Owned(ref stripped) = tag {
                debug!(channel = name, sanitized = %stripped, "stripped disallowed characters from cache channel");
            }
            self.channels.push(tag.into_owned());
        }
    }

    /// Replaces every stored tag with `names`.
    pub fn set<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.channels.clear();
        self.add(names);
    }

    /// Returns the sanitized tags.
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// The headers a response receives with the current toggles.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        self.channels.render(self.varnish, self.cloudflare)
    }

    /// Wraps `handler` so every response carries the enabled channel headers.
    pub fn wrap(self, handler: impl IntoHandler) -> Handler {
        Pipeline::new().layer(Arc::new(self)).endpoint(handler)
    }
}

impl Middleware for CacheChannels {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let headers = self.headers();

        Box::pin(async move {
            let mut response = next.run(ctx).await;
            for (name, value) in &headers {
                apply_header(&mut response, *name, value);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request, Response, StatusCode};

    fn registry() -> CacheChannels {
        CacheChannels::new().unwrap()
    }

    fn ok(_ctx: Context) -> std::future::Ready<Response> {
        std::future::ready(Response::new(StatusCode::Ok).body("ok!"))
    }

    #[test]
    fn strips_disallowed_characters() {
        let mut channels = registry();
        channels.set(["Cat(øøøøø)_Articles//"]);
        assert_eq!(channels.channels().tags(), ["Cat_Articles"]);
    }

    #[test]
    fn keeps_hyphens_digits_and_underscores() {
        let sanitizer = Sanitizer::new().unwrap();
        assert_eq!(sanitizer.sanitize("user-42_feed"), "user-42_feed");
        assert!(matches!(sanitizer.sanitize("user-42_feed"), Cow::Borrowed(_)));
        assert_eq!(sanitizer.sanitize("a b,c;d"), "abcd");
        assert_eq!(sanitizer.sanitize("Ünïcödé"), "ncd");
    }

    #[test]
    fn empty_results_and_duplicates_are_kept() {
        let mut channels = registry();
        channels.add(["((()))", "News", "News"]);
        assert_eq!(channels.channels().tags(), ["", "News", "News"]);
    }

    #[test]
    fn set_replaces_previous_tags() {
        let mut channels = registry();
        channels.add(["Old", "Older"]);
        channels.set(["New"]);
        assert_eq!(channels.channels().tags(), ["New"]);
    }

    #[test]
    fn separators_differ_per_proxy() {
        let mut channels = registry();
        channels.add(["Cat_Articles", "Cat_Pictures", "Dog_Pictures"]);
        let set = channels.channels();
        assert_eq!(set.varnish_value(), "Cat_Articles, Cat_Pictures, Dog_Pictures");
        assert_eq!(set.cloudflare_value(), "Cat_Articles,Cat_Pictures,Dog_Pictures");
    }

    #[test]
    fn render_follows_toggles() {
        let mut channels = registry();
        channels.add(["A", "B"]);
        assert!(channels.headers().is_empty());

        channels.set_cloudflare(true);
        assert_eq!(channels.headers(), vec![(CACHE_TAG_HEADER, "A,B".to_owned())]);

        channels.set_varnish(true);
        assert_eq!(
            channels.headers(),
            vec![
                (CACHE_CHANNEL_HEADER, "A, B".to_owned()),
                (CACHE_TAG_HEADER, "A,B".to_owned()),
            ]
        );
    }

    #[test]
    fn enabled_proxy_with_no_tags_renders_empty_value() {
        let set = ChannelSet::default();
        assert_eq!(set.render(true, false), vec![(CACHE_CHANNEL_HEADER, String::new())]);
    }

    #[tokio::test]
    async fn wrap_writes_varnish_header() {
        let mut channels = registry().varnish(true);
        channels.set(["Cat(øøøøø)_Articles//"]);

        let handler = channels.wrap(ok);
        let response = handler(Context::new(Request::new(Method::Get, "/"))).await;
        assert_eq!(response.headers().get(CACHE_CHANNEL_HEADER), Some("Cat_Articles"));
        assert!(!response.headers().contains(CACHE_TAG_HEADER));
    }

    #[tokio::test]
    async fn toggles_set_after_population_still_emit_tags() {
        let mut channels = registry().varnish(true);
        channels.set(["Cat(øøøøø)_Articles//"]);
        channels.add(["Cat_Pictures", "Dog_Pictures"]);
        channels.set_cloudflare(true);

        let handler = channels.wrap(ok);
        let response = handler(Context::new(Request::new(Method::Get, "/"))).await;
        assert_eq!(
            response.headers().get(CACHE_CHANNEL_HEADER),
            Some("Cat_Articles, Cat_Pictures, Dog_Pictures")
        );
        assert_eq!(
            response.headers().get(CACHE_TAG_HEADER),
            Some("Cat_Articles,Cat_Pictures,Dog_Pictures")
        );
    }
}
