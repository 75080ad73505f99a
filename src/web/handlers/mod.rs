//! HTTP request handlers
//!
//! Handlers stay thin: they parse query parameters and delegate to the
//! resolver held in [`AppState`](crate::web::AppState).

pub mod favicon;
pub mod health;
pub mod status;
pub mod test_page;
