//! Per-request context handed down the middleware chain.

use crate::Request;

/// Per-request context.
///
/// The cache layers never look inside it; they only forward it to the next
/// layer. Handlers read the request through [`Context::request`].
#[derive(Debug)]
pub struct Context {
    request: Request,
}

impl Context {
    /// Creates a context for `request`.
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    /// Returns the request being handled.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consumes the context and returns the request.
    pub fn into_request(self) -> Request {
        self.request
    }
}

impl From<Request> for Context {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}
