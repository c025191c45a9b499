//! The HTTP runtime: requests, responses, sessions, routing, middleware
//! and response emission.

pub mod cookie;
pub mod emitter;
pub mod middleware;
pub mod request;
pub mod response;
pub mod router;
pub mod session;
