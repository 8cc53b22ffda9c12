//! Shared application state for request handlers.

use crate::service::ScrapeService;

/// Shared application state, cloneable across handlers.
///
/// Holds the process-wide scrape service, which owns the session provider
/// and the scan lock.
#[derive(Clone)]
pub struct AppState {
    pub scraper: ScrapeService,
}

impl AppState {
    /// Creates a new application state around the given scrape service.
    pub fn new(scraper: ScrapeService) -> Self {
        Self { scraper }
    }
}
