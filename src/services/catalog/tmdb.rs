//! TMDB discover provider
//!
//! API Flow:
//! 1. Movies: /discover/movie → paged raw records sorted by popularity
//! 2. Series: /discover/tv → same shape, `name`/`first_air_date` instead of `title`/`release_date`
//!
//! Genre and platform sets are sent pipe-joined, which the API treats as OR.

use crate::{
    error::{AppError, AppResult},
    models::{ContentType, DiscoverPage},
    services::catalog::{CatalogService, DiscoverQuery},
};
use reqwest::{Client as HttpClient, StatusCode};

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbCatalog {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
        }
    }

    /// Query parameters for one discover call, excluding the API key
    fn query_params(
        content_type: ContentType,
        page: u32,
        query: &DiscoverQuery,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", page.to_string()),
            ("sort_by", "popularity.desc".to_string()),
            ("include_adult", "false".to_string()),
            ("watch_region", query.region.clone()),
        ];

        let genres = query.genres_for(content_type);
        if !genres.is_empty() {
            params.push(("with_genres", join_ids(&genres)));
        }
        if !query.platforms.is_empty() {
            params.push(("with_watch_providers", join_ids(&query.platforms)));
        }
        if query.min_rating > 0.0 {
            params.push(("vote_average.gte", query.min_rating.to_string()));
        }

        let (date_from, date_to) = match content_type {
            ContentType::Movie => ("primary_release_date.gte", "primary_release_date.lte"),
            ContentType::Series => ("first_air_date.gte", "first_air_date.lte"),
        };
        if let Some(year) = query.year_from {
            params.push((date_from, format!("{}-01-01", year)));
        }
        if let Some(year) = query.year_to {
            params.push((date_to, format!("{}-12-31", year)));
        }

        params
    }

    /// Maps a non-success status onto the error taxonomy
    fn classify_status(status: StatusCode, body: String) -> AppError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => AppError::UpstreamRateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AppError::AuthExpired(format!("catalog returned {}", status))
            }
            _ => AppError::ExternalApi(format!(
                "Catalog API returned status {}: {}",
                status, body
            )),
        }
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

#[async_trait::async_trait]
impl CatalogService for TmdbCatalog {
    async fn discover(
        &self,
        content_type: ContentType,
        page: u32,
        query: &DiscoverQuery,
    ) -> AppResult<DiscoverPage> {
        let url = format!("{}/discover/{}", self.api_url, content_type.catalog_path());

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(&Self::query_params(content_type, page, query))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                content_type = %content_type,
                page = page,
                status = %status,
                "Catalog discover request failed"
            );
            return Err(Self::classify_status(status, body));
        }

        let discover_page: DiscoverPage = response.json().await?;

        tracing::debug!(
            content_type = %content_type,
            page = page,
            results = discover_page.results.len(),
            total_pages = discover_page.total_pages,
            provider = "tmdb",
            "Discover page fetched"
        );

        Ok(discover_page)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
