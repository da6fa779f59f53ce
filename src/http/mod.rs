//! HTTP surface composing the rate limiter and the billing client.

mod layer;
mod routes;
mod server;

pub use layer::{enforce_rate_limit, RouteLimit};
pub use routes::{router, ApiError, AppState};
pub use server::HttpServer;
