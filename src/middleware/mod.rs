//! Middleware pipeline — composable layers around a terminal handler.
//!
//! Each middleware wraps the next layer. The cache layers in [`crate::cache`]
//! use it to decorate responses without coupling handlers to proxy concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`Handler`] / [`IntoHandler`] — terminal request handlers.
//! - [`Pipeline`] — an ordered stack of layers closed off by a handler.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Response, StatusCode, context::Context};

/// The boxed future every layer and handler resolves to.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, heap-allocated async handler that turns a [`Context`] into a
/// [`Response`].
///
/// This is what [`Pipeline::endpoint`] and the `wrap` methods of the cache
/// layers return, and what [`crate::server::Server::serve`] accepts.
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in a [`Pipeline`] is stored as a `MiddlewareHandler`; the
/// terminal handler is adapted into one that never calls `next`.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cache_headers::cache::CacheControl;
/// use cache_headers::middleware::from_middleware;
///
/// let handler = from_middleware(Arc::new(CacheControl::new().no_store(true)));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so a middleware can
/// forward a request at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Which middleware the next `run` call invokes.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without any layer producing a response, a
    /// `500 Internal Server Error` is returned.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => {
                tracing::error!("middleware chain exhausted without a response");
                Response::new(StatusCode::InternalServerError)
                    .body("No response generated by middleware pipeline")
            }
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass the
/// request through, short-circuit with their own [`Response`], or decorate the
/// downstream response.
///
/// Implementations must be `Send + Sync` because one instance is shared by
/// every connection task.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// An ordered stack of middleware closed off by a terminal handler.
///
/// Layers run in the order they were added: the first layer sees the request
/// first and the response last.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cache_headers::cache::{CacheChannels, CacheControl};
/// use cache_headers::context::Context;
/// use cache_headers::middleware::Pipeline;
/// use cache_headers::{Response, StatusCode};
///
/// let mut control = CacheControl::new();
/// control.set_max_age(20);
///
/// let mut channels = CacheChannels::new().unwrap().varnish(true);
/// channels.add(["Cat_Articles"]);
///
/// let handler = Pipeline::new()
///     .layer(Arc::new(control))
///     .layer(Arc::new(channels))
///     .endpoint(|_ctx: Context| async { Response::new(StatusCode::Ok).body("ok!") });
/// ```
#[derive(Default)]
pub struct Pipeline {
    layers: Vec<MiddlewareHandler>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware layer.
    #[must_use]
    pub fn layer<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(from_middleware(middleware));
        self
    }

    /// Number of layers added so far, not counting the endpoint.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if no layer has been added.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Closes the stack with `handler` and returns the composed [`Handler`].
    pub fn endpoint(self, handler: impl IntoHandler) -> Handler {
        let handler = Arc::new(handler);
        let terminal: MiddlewareHandler =
            Arc::new(move |ctx: Context, _next: Next| -> ResponseFuture { handler.call(ctx) });

        let mut layers = self.layers;
        layers.push(terminal);
        let chain: Arc<[MiddlewareHandler]> = layers.into();

        Arc::new(move |ctx: Context| -> ResponseFuture {
            let next = Next::new(Arc::clone(&chain));
            Box::pin(next.run(ctx))
        })
    }
}
