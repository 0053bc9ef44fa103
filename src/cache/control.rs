//! `Cache-Control` directive composition.
//!
//! [`CacheControl`] collects a handful of settings during startup, resolves them
//! into a [`CachePolicy`], renders the policy once, and stamps the rendered
//! string on every response that passes through it.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use super::apply_header;
use crate::context::Context;
use crate::middleware::{Handler, IntoHandler, Middleware, Next, Pipeline, ResponseFuture};

/// Response header written by [`CacheControl`].
pub const CACHE_CONTROL_HEADER: &str = "Cache-Control";

/// A single `Cache-Control` token.
///
/// TTLs are signed and rendered verbatim; `max-age=-5` is well-formed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    NoStore,
    MaxAge(i64),
    StaleWhileRevalidate(i64),
    Private,
    SMaxAge(i64),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStore => f.write_str("no-store"),
            Self::MaxAge(seconds) => write!(f, "max-age={seconds}"),
            Self::StaleWhileRevalidate(seconds) => write!(f, "stale-while-revalidate={seconds}"),
            Self::Private => f.write_str("private"),
            Self::SMaxAge(seconds) => write!(f, "s-maxage={seconds}"),
        }
    }
}

/// The resolved caching policy of a response.
///
/// A private response has no `s_maxage` field: proxies never store it, so a
/// proxy TTL cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Nothing may be stored anywhere; every TTL is ignored.
    NoStore,
    /// Browser-only caching.
    Private {
        max_age: Option<i64>,
        stale_while_revalidate: Option<i64>,
    },
    /// Cacheable by browsers and shared proxies.
    Public {
        max_age: Option<i64>,
        stale_while_revalidate: Option<i64>,
        s_maxage: Option<i64>,
    },
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Public {
            max_age: None,
            stale_while_revalidate: None,
            s_maxage: None,
        }
    }
}

impl CachePolicy {
    /// Directives in emission order: `max-age`, `stale-while-revalidate`, then
    /// either `private` or `s-maxage`.
    pub fn directives(&self) -> Vec<Directive> {
        match *self {
            Self::NoStore => vec![Directive::NoStore],
            Self::Private {
                max_age,
                stale_while_revalidate,
            } => ttl_directives(max_age, stale_while_revalidate)
                .chain(Some(Directive::Private))
                .collect(),
            Self::Public {
                max_age,
                stale_while_revalidate,
                s_maxage,
            } => ttl_directives(max_age, stale_while_revalidate)
                .chain(s_maxage.map(Directive::SMaxAge))
                .collect(),
        }
    }

    /// Renders the header value. An empty policy renders to `""`.
    pub fn render(&self) -> String {
        self.directives()
            .iter()
            .map(Directive::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn ttl_directives(
    max_age: Option<i64>,
    stale_while_revalidate: Option<i64>,
) -> impl Iterator<Item = Directive> {
    max_age
        .map(Directive::MaxAge)
        .into_iter()
        .chain(stale_while_revalidate.map(Directive::StaleWhileRevalidate))
}

/// Middleware that writes a `Cache-Control` header computed from a fixed
/// configuration.
///
/// Configure it before serving; the header value is rendered on the first call
/// to [`compose`](Self::compose) (or the first request) and never recomputed.
///
/// # Examples
///
/// ```
/// use cache_headers::cache::CacheControl;
///
/// let mut control = CacheControl::new().private(true);
/// control.set_max_age(30);
/// control.set_s_maxage(60);
///
/// assert_eq!(control.compose(), "max-age=30, private");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    no_store: bool,
    private: bool,
    max_age: Option<i64>,
    s_maxage: Option<i64>,
    stale_while_revalidate: Option<i64>,
    composed: OnceLock<Arc<str>>,
}

impl CacheControl {
    /// Creates a composer with every setting unset, which renders no header.
    pub fn new() -> Self {
        Self::default()
    }

    /// `no-store`: nothing may keep a copy of the response. Overrides every
    /// other setting.
    #[must_use]
    pub fn no_store(mut self, no_store: bool) -> Self {
        self.warn_if_composed("no-store");
        self.no_store = no_store;
        self
    }

    /// `private`: browsers may cache, shared proxies may not. Drops `s-maxage`.
    #[must_use]
    pub fn private(mut self, private: bool) -> Self {
        self.warn_if_composed("private");
        self.private = private;
        self
    }

    /// TTL in seconds for browsers, and for proxies when `s-maxage` is unset.
    pub fn set_max_age(&mut self, seconds: i64) {
        self.warn_if_composed("max-age");
        self.max_age = Some(seconds);
    }

    /// TTL in seconds for shared proxy caches.
    pub fn set_s_maxage(&mut self, seconds: i64) {
        self.warn_if_composed("s-maxage");
        self.s_maxage = Some(seconds);
    }

    /// Window in seconds during which a stale response may be served while it
    /// is revalidated in the background.
    pub fn set_stale_while_revalidate(&mut self, seconds: i64) {
        self.warn_if_composed("stale-while-revalidate");
        self.stale_while_revalidate = Some(seconds);
    }

    /// Resolves the settings into a [`CachePolicy`].
    pub fn policy(&self) -> CachePolicy {
        if self.no_store {
            return CachePolicy::NoStore;
        }

        if self.private {
            if let Some(s_maxage) = self.s_maxage {
                debug!(s_maxage, "ignoring s-maxage on a private response");
            }
            return CachePolicy::Private {
                max_age: self.max_age,
                stale_while_revalidate: self.stale_while_revalidate,
            };
        }

        CachePolicy::Public {
            max_age: self.max_age,
            stale_while_revalidate: self.stale_while_revalidate,
            s_maxage: self.s_maxage,
        }
    }

    /// Returns the `Cache-Control` value, rendering it on first use.
    pub fn compose(&self) -> &str {
        self.composed()
    }

    /// Wraps `handler` so every response carries this `Cache-Control` header.
    pub fn wrap(self, handler: impl IntoHandler) -> Handler {
        Pipeline::new().layer(Arc::new(self)).endpoint(handler)
    }

    fn composed(&self) -> &Arc<str> {
        self.composed.get_or_init(|| {
            let rendered = self.policy().render();
            debug!(cache_control = %rendered, "composed Cache-Control directives");
            rendered.into()
        })
    }

    fn warn_if_composed(&self, directive: &'static str) {
        if let Some(composed) = self.composed.get() {
            warn!(
                directive,
                cache_control = %composed,
                "Cache-Control already composed; change has no effect"
            );
        }
    }
}

impl From<CachePolicy> for CacheControl {
    fn from(policy: CachePolicy) -> Self {
        match policy {
            CachePolicy::NoStore => Self::new().no_store(true),
            CachePolicy::Private {
                max_age,
                stale_while_revalidate,
            } => Self {
                private: true,
                max_age,
                stale_while_revalidate,
                ..Self::default()
            },
            CachePolicy::Public {
                max_age,
                stale_while_revalidate,
                s_maxage,
            } => Self {
                max_age,
                stale_while_revalidate,
                s_maxage,
                ..Self::default()
            },
        }
    }
}

impl Middleware for CacheControl {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let directives = Arc::clone(self.composed());

        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if !directives.is_empty() {
                apply_header(&mut response, CACHE_CONTROL_HEADER, &directives);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request, Response, StatusCode};

    fn all_ttls(control: &mut CacheControl) {
        control.set_max_age(20);
        control.set_s_maxage(40);
        control.set_stale_while_revalidate(120);
    }

    fn ok(_ctx: Context) -> std::future::Ready<Response> {
        std::future::ready(Response::new(StatusCode::Ok).body("ok!"))
    }

    fn get() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    #[test]
    fn private_drops_s_maxage() {
        let mut control = CacheControl::new().private(true);
        control.set_max_age(30);
        control.set_s_maxage(60);
        assert_eq!(control.compose(), "max-age=30, private");
    }

    #[test]
    fn every_configuration_renders_in_order() {
        for no_store in [false, true] {
            for private in [false, true] {
                for max_age in [None, Some(11)] {
                    for swr in [None, Some(22)] {
                        for s_maxage in [None, Some(33)] {
                            let mut control = CacheControl::new().no_store(no_store).private(private);
                            if let Some(v) = max_age {
                                control.set_max_age(v);
                            }
                            if let Some(v) = swr {
                                control.set_stale_while_revalidate(v);
                            }
                            if let Some(v) = s_maxage {
                                control.set_s_maxage(v);
                            }

                            let expected = if no_store {
                                "no-store".to_owned()
                            } else {
                                let mut parts = Vec::new();
                                if let Some(v) = max_age {
                                    parts.push(format!("max-age={v}"));
                                }
                                if let Some(v) = swr {
                                    parts.push(format!("stale-while-revalidate={v}"));
                                }
                                if private {
                                    parts.push("private".to_owned());
                                } else if let Some(v) = s_maxage {
                                    parts.push(format!("s-maxage={v}"));
                                }
                                parts.join(", ")
                            };

                            let case = (no_store, private, max_age, swr, s_maxage);
                            let first = control.compose().to_owned();
                            assert_eq!(first, expected, "{case:?}");
                            assert_eq!(control.compose(), first, "{case:?}");
                            if private && !no_store {
                                assert!(first.contains("private"), "{case:?}");
                                assert!(!first.contains("s-maxage"), "{case:?}");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn public_orders_all_ttls() {
        let mut control = CacheControl::new();
        all_ttls(&mut control);
        assert_eq!(
            control.compose(),
            "max-age=20, stale-while-revalidate=120, s-maxage=40"
        );
    }

    #[test]
    fn no_store_overrides_everything() {
        let mut control = CacheControl::new().no_store(true).private(true);
        all_ttls(&mut control);
        assert_eq!(control.policy(), CachePolicy::NoStore);
        assert_eq!(control.compose(), "no-store");
    }

    #[test]
    fn private_with_every_ttl() {
        let mut control = CacheControl::new().private(true);
        all_ttls(&mut control);
        let composed = control.compose();
        assert_eq!(composed, "max-age=20, stale-while-revalidate=120, private");
        assert!(!composed.contains("s-maxage"));
    }

    #[test]
    fn private_alone() {
        assert_eq!(CacheControl::new().private(true).compose(), "private");
    }

    #[test]
    fn s_maxage_alone() {
        let mut control = CacheControl::new();
        control.set_s_maxage(600);
        assert_eq!(control.compose(), "s-maxage=600");
    }

    #[test]
    fn empty_configuration_composes_to_empty_string() {
        assert_eq!(CacheControl::new().compose(), "");
        assert_eq!(CachePolicy::default().render(), "");
    }

    #[test]
    fn negative_ttls_render_verbatim() {
        let mut control = CacheControl::new();
        control.set_max_age(-5);
        control.set_stale_while_revalidate(0);
        assert_eq!(control.compose(), "max-age=-5, stale-while-revalidate=0");
    }

    #[test]
    fn compose_is_memoized() {
        let mut control = CacheControl::new();
        control.set_max_age(20);
        let first = control.compose().to_owned();
        assert_eq!(control.compose(), first);

        // later changes do not invalidate the rendered value
        control.set_max_age(99);
        assert_eq!(control.compose(), "max-age=20");
    }

    #[test]
    fn policy_round_trips_through_control() {
        let policy = CachePolicy::Private {
            max_age: Some(10),
            stale_while_revalidate: None,
        };
        let control = CacheControl::from(policy);
        assert_eq!(control.policy(), policy);
        assert_eq!(control.compose(), "max-age=10, private");
    }

    #[test]
    fn directives_in_emission_order() {
        let policy = CachePolicy::Public {
            max_age: Some(1),
            stale_while_revalidate: Some(2),
            s_maxage: Some(3),
        };
        assert_eq!(
            policy.directives(),
            vec![
                Directive::MaxAge(1),
                Directive::StaleWhileRevalidate(2),
                Directive::SMaxAge(3),
            ]
        );
    }

    #[tokio::test]
    async fn wrap_sets_header() {
        let mut control = CacheControl::new().private(true);
        control.set_max_age(30);
        control.set_s_maxage(60);

        let handler = control.wrap(ok);
        let response = handler(get()).await;
        assert_eq!(
            response.headers().get(CACHE_CONTROL_HEADER),
            Some("max-age=30, private")
        );
        assert_eq!(response.body_bytes(), b"ok!");
    }

    #[tokio::test]
    async fn empty_configuration_omits_header() {
        let handler = CacheControl::new().wrap(ok);
        let response = handler(get()).await;
        assert!(!response.headers().contains(CACHE_CONTROL_HEADER));
    }

    #[tokio::test]
    async fn handler_value_wins() {
        let handler = CacheControl::new().no_store(true).wrap(|_ctx: Context| async {
            Response::new(StatusCode::Ok).header("cache-control", "max-age=5")
        });
        let response = handler(get()).await;
        let values: Vec<_> = response.headers().get_all(CACHE_CONTROL_HEADER).collect();
        assert_eq!(values, vec!["max-age=5"]);
    }

    #[tokio::test]
    async fn concurrent_first_requests_agree() {
        let mut control = CacheControl::new();
        all_ttls(&mut control);
        let handler = control.wrap(ok);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler(get()).await })
            })
            .collect();

        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(
                response.headers().get(CACHE_CONTROL_HEADER),
                Some("max-age=20, stale-while-revalidate=120, s-maxage=40")
            );
        }
    }
}
