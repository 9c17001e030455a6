use crate::{
    error::{AppError, AppResult},
    models::FetchAttempt,
    services::{
        aggregator::{AggregateBatch, CatalogAggregator, PageRequest},
        catalog::DiscoverQuery,
    },
};

impl FetchAttempt {
    /// Step after this one, if any
    pub fn next(self) -> Option<FetchAttempt> {
        match self {
            FetchAttempt::Full => Some(FetchAttempt::GenreRelaxed),
            FetchAttempt::GenreRelaxed => None,
        }
    }

    /// Query this step sends to the catalog
    pub fn query(self, base: &DiscoverQuery) -> DiscoverQuery {
        match self {
            FetchAttempt::Full => base.clone(),
            FetchAttempt::GenreRelaxed => base.without_genres(),
        }
    }
}

/// Degrade-and-retry wrapper around the aggregator
///
/// Runs `Full`, then `GenreRelaxed` if the first attempt produced nothing or
/// failed on every page. Stops at the first attempt with at least one item.
/// Rate-limit and auth failures are not degraded around; they surface as-is.
pub struct FallbackCascade<'a> {
    aggregator: &'a CatalogAggregator,
}

impl<'a> FallbackCascade<'a> {
    pub fn new(aggregator: &'a CatalogAggregator) -> Self {
        Self { aggregator }
    }

    pub async fn run(
        &self,
        requests: &[PageRequest],
        base: &DiscoverQuery,
    ) -> AppResult<(FetchAttempt, AggregateBatch)> {
        let mut attempt = FetchAttempt::Full;

        loop {
            let outcome = self.aggregator.fetch(requests, &attempt.query(base)).await;

            match outcome {
                Ok(batch) if !batch.is_empty() => {
                    tracing::debug!(attempt = ?attempt, items = batch.len(), "Fallback cascade settled");
                    return Ok((attempt, batch));
                }
                Ok(_) => {
                    tracing::info!(attempt = ?attempt, "Discovery attempt returned no items");
                }
                Err(AppError::AggregateFetch { failed_pages }) => {
                    tracing::info!(attempt = ?attempt, failed_pages, "Discovery attempt failed on every page");
                }
                Err(e) => return Err(e),
            }

            // Without genres the relaxed step would repeat the same query
            attempt = match attempt.next() {
                Some(next) if base.has_genres() => next,
                _ => {
                    tracing::warn!(attempt = ?attempt, "Fallback cascade exhausted");
                    return Err(AppError::NoContentFound);
                }
            };
            tracing::info!(attempt = ?attempt, "Falling back to next discovery attempt");
        }
    }
}
