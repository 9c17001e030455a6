//! External media catalog abstraction
//!
//! The catalog is treated as an opaque paged data source: given a content type,
//! a page index and a filter set it returns raw records plus the total page count.
//! Ranking inside a page is the catalog's business.

use crate::{
    error::AppResult,
    models::{ContentType, DiscoverPage, DiscoveryFilters},
    services::mood::series_genres,
};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

/// Parameters of one discover call
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverQuery {
    /// Movie genre ids; empty means no genre restriction
    pub genres: Vec<u32>,
    pub platforms: Vec<u32>,
    pub min_rating: f32,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub region: String,
}

impl DiscoverQuery {
    pub fn new(genres: Vec<u32>, filters: &DiscoveryFilters, region: &str) -> Self {
        Self {
            genres,
            platforms: filters.platforms.iter().copied().collect(),
            min_rating: filters.min_rating,
            year_from: filters.year_from,
            year_to: filters.year_to,
            region: region.to_string(),
        }
    }

    pub fn has_genres(&self) -> bool {
        !self.genres.is_empty()
    }

    /// Same query with the genre restriction dropped
    pub fn without_genres(&self) -> Self {
        Self {
            genres: Vec::new(),
            ..self.clone()
        }
    }

    /// Genre ids in the id space of `content_type`
    pub fn genres_for(&self, content_type: ContentType) -> Vec<u32> {
        match content_type {
            ContentType::Movie => self.genres.clone(),
            ContentType::Series => series_genres(&self.genres),
        }
    }
}

/// Trait for catalog providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetch one page of discover results for a content type
    async fn discover(
        &self,
        content_type: ContentType,
        page: u32,
        query: &DiscoverQuery,
    ) -> AppResult<DiscoverPage>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
