//! HTTP surface for the admission gateway.

mod handlers;
mod server;

pub use handlers::AppState;
pub use server::{router, HttpServer};
