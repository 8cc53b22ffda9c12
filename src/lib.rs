//! tg-roster: ranks the usernames active in a Telegram group.
//!
//! A JSON web service that scans a group's recent message history through a
//! session provider, deduplicates senders by username, and returns them
//! ordered by message count.

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod scan;
pub mod service;
pub mod session;
pub mod state;

pub use error::AppError;
pub use routes::create_router;
pub use service::ScrapeService;
pub use state::AppState;
