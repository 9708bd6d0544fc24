pub mod http;
pub mod responses;

pub use http::{build_router, serve, AppState};
