use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, ContentType, PageCursor, PageCursors},
    services::catalog::{CatalogService, DiscoverQuery},
};

/// The catalog refuses page indexes past this
pub const MAX_CATALOG_PAGE: u32 = 500;

/// Pages to fetch for one content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub content_type: ContentType,
    pub start_page: u32,
    pub page_count: u32,
}

impl PageRequest {
    /// First `page_count` pages for every type
    pub fn initial(content_types: &[ContentType], page_count: u32) -> Vec<PageRequest> {
        content_types
            .iter()
            .map(|&content_type| PageRequest {
                content_type,
                start_page: 1,
                page_count,
            })
            .collect()
    }

    /// Next unseen pages for every type that still has some
    pub fn continuing(cursors: &PageCursors, page_count: u32) -> Vec<PageRequest> {
        cursors
            .iter()
            .filter(|(_, cursor)| cursor.has_remaining())
            .map(|(&content_type, cursor)| PageRequest {
                content_type,
                start_page: cursor.next_page,
                page_count: page_count.min(cursor.total_pages - cursor.next_page + 1),
            })
            .collect()
    }

    fn pages(&self) -> impl Iterator<Item = u32> {
        let end = self
            .start_page
            .saturating_add(self.page_count)
            .min(MAX_CATALOG_PAGE + 1);
        self.start_page..end
    }
}

/// Normalized items per content type, in fetch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateBatch {
    pub movies: Vec<CatalogItem>,
    pub series: Vec<CatalogItem>,
    pub cursors: PageCursors,
}

impl AggregateBatch {
    pub fn len(&self) -> usize {
        self.movies.len() + self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_mut(&mut self, content_type: ContentType) -> &mut Vec<CatalogItem> {
        match content_type {
            ContentType::Movie => &mut self.movies,
            ContentType::Series => &mut self.series,
        }
    }
}

/// Fans out paged discover calls and fans them back in, tolerating partial failure
#[derive(Clone)]
pub struct CatalogAggregator {
    catalog: Arc<dyn CatalogService>,
    page_timeout: Duration,
}

impl CatalogAggregator {
    pub fn new(catalog: Arc<dyn CatalogService>, page_timeout: Duration) -> Self {
        Self {
            catalog,
            page_timeout,
        }
    }

    /// Fetch every requested page concurrently
    ///
    /// Failed or timed-out pages contribute nothing. Only when every page fails
    /// does the call fail: with `UpstreamRateLimited` or `AuthExpired` if any page
    /// reported one, otherwise with `AggregateFetch`.
    pub async fn fetch(
        &self,
        requests: &[PageRequest],
        query: &DiscoverQuery,
    ) -> AppResult<AggregateBatch> {
        let mut tasks = Vec::new();

        for request in requests {
            for page in request.pages() {
                let catalog = Arc::clone(&self.catalog);
                let query = query.clone();
                let timeout = self.page_timeout;
                let content_type = request.content_type;
                let task = tokio::spawn(async move {
                    fetch_and_normalize(catalog.as_ref(), timeout, content_type, page, &query)
                        .await
                });
                tasks.push((content_type, page, task));
            }
        }

        let mut batch = AggregateBatch::default();
        let mut errors = Vec::new();
        let mut succeeded = 0usize;
        let mut answered = HashSet::new();
        let mut first_failed: BTreeMap<ContentType, u32> = BTreeMap::new();

        // A type with any answered page moves past the requested range, or back
        // to its first failed page so load-more asks for it again
        for request in requests {
            batch.cursors.insert(
                request.content_type,
                PageCursor {
                    next_page: request.pages().last().map_or(request.start_page, |p| p + 1),
                    total_pages: 0,
                },
            );
        }

        for (content_type, page, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Internal(e.to_string())),
            };

            match result {
                Ok((items, total_pages)) => {
                    succeeded += 1;
                    answered.insert(content_type);
                    batch.bucket_mut(content_type).extend(items);
                    if let Some(cursor) = batch.cursors.get_mut(&content_type) {
                        cursor.total_pages = cursor.total_pages.max(total_pages);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        content_type = %content_type,
                        page = page,
                        provider = self.catalog.name(),
                        "Catalog page fetch failed"
                    );
                    first_failed.entry(content_type).or_insert(page);
                    errors.push(e);
                }
            }
        }

        for (content_type, page) in &first_failed {
            if let Some(cursor) = batch.cursors.get_mut(content_type) {
                cursor.next_page = cursor.next_page.min(*page);
            }
        }

        if !errors.is_empty() {
            tracing::warn!(
                success_count = succeeded,
                error_count = errors.len(),
                "Partial catalog fetch failure"
            );
        }

        if succeeded == 0 && !errors.is_empty() {
            if errors.iter().any(|e| matches!(e, AppError::UpstreamRateLimited)) {
                return Err(AppError::UpstreamRateLimited);
            }
            if let Some(pos) = errors.iter().position(|e| matches!(e, AppError::AuthExpired(_))) {
                return Err(errors.swap_remove(pos));
            }
            return Err(AppError::AggregateFetch {
                failed_pages: errors.len(),
            });
        }

        // No cursor for a type whose pages all failed; callers keep their previous one
        batch.cursors.retain(|content_type, _| answered.contains(content_type));

        tracing::info!(
            movies = batch.movies.len(),
            series = batch.series.len(),
            pages = succeeded,
            "Catalog batch fetched"
        );

        Ok(batch)
    }
}

/// Fetch one page and normalize it; returns the items and the reported page count
///
/// The single fetch path shared by initial discovery, fallback attempts and load-more.
async fn fetch_and_normalize(
    catalog: &dyn CatalogService,
    timeout: Duration,
    content_type: ContentType,
    page: u32,
    query: &DiscoverQuery,
) -> AppResult<(Vec<CatalogItem>, u32)> {
    let discover_page = tokio::time::timeout(timeout, catalog.discover(content_type, page, query))
        .await
        .map_err(|_| {
            AppError::ExternalApi(format!(
                "{} page {} timed out after {:?}",
                content_type, page, timeout
            ))
        })??;

    let items = discover_page
        .results
        .into_iter()
        .map(|raw| CatalogItem::from_raw(content_type, raw))
        .collect();

    Ok((items, discover_page.total_pages.min(MAX_CATALOG_PAGE)))
}
