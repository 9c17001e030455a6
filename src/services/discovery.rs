use std::sync::Arc;
use std::time::Duration;

use crate::{
    cached,
    db::{Cache, CacheKey, WatchlistStore},
    error::AppResult,
    models::{
        Caller, CandidatePool, DiscoveryFilters, DiscoverySession, Mood, PageCursor, PageCursors,
    },
    services::{
        aggregator::{CatalogAggregator, PageRequest},
        catalog::{CatalogService, DiscoverQuery},
        dedup::{dedup_against, dedup_by_identity, interleave},
        fallback::FallbackCascade,
        mood::genres_for,
        pagination::{append_and_reveal, reveal_buffered, seen_identities},
        personalization::{load_affinity, PersonalizationScorer, DEFAULT_AFFINITY_WEIGHT},
    },
};

/// Tunables for the discovery pipeline
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Items revealed per page of results
    pub window_size: usize,
    /// Catalog pages fetched per content type on every fetch
    pub pages_per_fetch: u32,
    /// Candidate pool TTL in seconds
    pub cache_ttl: u64,
    pub affinity_weight: f64,
    pub region: String,
    pub page_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            window_size: 24,
            pages_per_fetch: 2,
            cache_ttl: 1800,
            affinity_weight: DEFAULT_AFFINITY_WEIGHT,
            region: "US".to_string(),
            page_timeout: Duration::from_secs(8),
        }
    }
}

/// Mood/filter driven discovery pipeline
///
/// Every operation takes the prior session by value and returns the next one;
/// the engine itself holds no per-session state.
pub struct DiscoveryEngine {
    aggregator: CatalogAggregator,
    cache: Cache,
    watchlist: Arc<dyn WatchlistStore>,
    scorer: PersonalizationScorer,
    settings: DiscoverySettings,
}

impl DiscoveryEngine {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        cache: Cache,
        watchlist: Arc<dyn WatchlistStore>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            aggregator: CatalogAggregator::new(catalog, settings.page_timeout),
            cache,
            watchlist,
            scorer: PersonalizationScorer::new(settings.affinity_weight),
            settings,
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Fresh discovery for a mood; `filters` defaults to the session's current ones
    pub async fn select_mood(
        &self,
        session: DiscoverySession,
        mood: Mood,
        filters: Option<DiscoveryFilters>,
        caller: &Caller,
    ) -> AppResult<DiscoverySession> {
        let filters = filters.unwrap_or_else(|| session.filters.clone());
        self.discover(session, Some(mood), filters, caller).await
    }

    /// Re-runs discovery for the current mood with a new filter set
    pub async fn apply_filters(
        &self,
        session: DiscoverySession,
        filters: DiscoveryFilters,
        caller: &Caller,
    ) -> AppResult<DiscoverySession> {
        let mood = session.mood;
        self.discover(session, mood, filters, caller).await
    }

    /// Reveals the next window, fetching further catalog pages once the buffer runs dry
    pub async fn load_more(
        &self,
        mut session: DiscoverySession,
        caller: &Caller,
    ) -> AppResult<DiscoverySession> {
        let window = self.settings.window_size;
        if reveal_buffered(&mut session, window) {
            tracing::debug!(visible = session.visible_count, "Revealed buffered candidates");
            return Ok(session);
        }

        let requests = PageRequest::continuing(&session.cursors, self.settings.pages_per_fetch);
        if requests.is_empty() {
            tracing::debug!("No further catalog pages to load");
            return Ok(session);
        }

        let query = session.attempt.query(&self.base_query(session.mood, &session.filters));
        let batch = self.aggregator.fetch(&requests, &query).await?;

        let seen = seen_identities(&session);
        let affinity = load_affinity(self.watchlist.as_ref(), caller).await;
        let movies = self
            .scorer
            .score(dedup_against(batch.movies, &seen), affinity.as_ref());
        let series = self
            .scorer
            .score(dedup_against(batch.series, &seen), affinity.as_ref());
        let fresh_count = movies.len() + series.len();
        let fresh = interleave(movies, series, fresh_count).into_buffer();

        append_and_reveal(&mut session, fresh, batch.cursors, window);

        tracing::info!(
            fresh = fresh_count,
            buffered = session.buffer.len(),
            visible = session.visible_count,
            "Loaded more candidates"
        );

        Ok(session)
    }

    async fn discover(
        &self,
        prior: DiscoverySession,
        mood: Option<Mood>,
        filters: DiscoveryFilters,
        caller: &Caller,
    ) -> AppResult<DiscoverySession> {
        filters.validate()?;

        let pool = self.candidate_pool(mood, &filters).await?;

        // Personalization is per caller, so it runs after the shared cache
        let affinity = load_affinity(self.watchlist.as_ref(), caller).await;
        let movies = self.scorer.score(pool.movies, affinity.as_ref());
        let series = self.scorer.score(pool.series, affinity.as_ref());
        let interleaved = interleave(movies, series, self.settings.window_size);
        let visible_count = interleaved.visible.len();

        tracing::info!(
            mood = ?mood,
            visible = visible_count,
            overflow = interleaved.overflow.len(),
            attempt = ?pool.attempt,
            personalized = affinity.is_some(),
            "Discovery completed"
        );

        Ok(DiscoverySession {
            mood,
            filters,
            generation: prior.generation,
            buffer: interleaved.into_buffer(),
            visible_count,
            cursors: pool.cursors,
            attempt: pool.attempt,
            retry: prior.retry,
        })
    }

    async fn candidate_pool(
        &self,
        mood: Option<Mood>,
        filters: &DiscoveryFilters,
    ) -> AppResult<CandidatePool> {
        let key = CacheKey::discovery(mood, filters);
        cached!(self.cache, key, self.settings.cache_ttl, async {
            self.build_pool(mood, filters).await
        })
    }

    async fn build_pool(
        &self,
        mood: Option<Mood>,
        filters: &DiscoveryFilters,
    ) -> AppResult<CandidatePool> {
        let content_types = filters.content_type.content_types();
        let requests = PageRequest::initial(&content_types, self.settings.pages_per_fetch);
        let base = self.base_query(mood, filters);

        let (attempt, batch) = FallbackCascade::new(&self.aggregator)
            .run(&requests, &base)
            .await?;

        let mut cursors: PageCursors = content_types
            .iter()
            .map(|content_type| (*content_type, PageCursor::start()))
            .collect();
        cursors.extend(batch.cursors);

        Ok(CandidatePool {
            movies: dedup_by_identity(batch.movies),
            series: dedup_by_identity(batch.series),
            cursors,
            attempt,
        })
    }

    fn base_query(&self, mood: Option<Mood>, filters: &DiscoveryFilters) -> DiscoverQuery {
        let genres = mood.map(|m| genres_for(m).to_vec()).unwrap_or_default();
        DiscoverQuery::new(genres, filters, &self.settings.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::watchlist::MockWatchlistStore;
    use crate::db::MemoryCacheBackend;
    use crate::error::AppError;
    use crate::models::{ContentScope, ContentType, DiscoverPage, GenreIds, RawItem, WatchlistEntry};
    use crate::services::catalog::MockCatalogService;
    use mockall::predicate::*;
    use std::collections::{BTreeSet, HashSet};

    fn raw(id: u64, popularity: f64, genres: &[u32]) -> RawItem {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Title {}", id),
            "popularity": popularity,
            "genre_ids": genres,
        }))
        .unwrap()
    }

    /// Page `page` of a content type holding `per_page` items with globally unique ids
    fn page(content_type: ContentType, page: u32, per_page: u64, total_pages: u32) -> DiscoverPage {
        let offset = match content_type {
            ContentType::Movie => 1_000,
            ContentType::Series => 2_000,
        } + u64::from(page) * 100;
        DiscoverPage {
            page,
            results: (0..per_page)
                .map(|i| raw(offset + i, 1_000.0 - (offset + i) as f64, &[35]))
                .collect(),
            total_pages,
        }
    }

    fn anonymous() -> Caller {
        Caller::Anonymous {
            session_token: "tab-1".to_string(),
        }
    }

    fn engine(catalog: MockCatalogService, watchlist: MockWatchlistStore) -> DiscoveryEngine {
        DiscoveryEngine::new(
            Arc::new(catalog),
            Cache::new(Arc::new(MemoryCacheBackend::new())),
            Arc::new(watchlist),
            DiscoverySettings {
                pages_per_fetch: 1,
                ..Default::default()
            },
        )
    }

    fn named_catalog() -> MockCatalogService {
        let mut catalog = MockCatalogService::new();
        catalog.expect_name().return_const("mock");
        catalog
    }

    fn count(session: &DiscoverySession, content_type: ContentType) -> usize {
        session
            .visible()
            .iter()
            .filter(|i| i.content_type == content_type)
            .count()
    }

    #[tokio::test]
    async fn test_happy_mood_balanced_window() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .with(eq(ContentType::Movie), eq(1), always())
            .times(1)
            .returning(|_, _, query| {
                assert_eq!(query.genres, vec![35, 10751, 16]);
                Ok(page(ContentType::Movie, 1, 18, 3))
            });
        catalog
            .expect_discover()
            .with(eq(ContentType::Series), eq(1), always())
            .times(1)
            .returning(|_, _, _| Ok(page(ContentType::Series, 1, 22, 3)));

        let engine = engine(catalog, MockWatchlistStore::new());
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Happy, None, &anonymous())
            .await
            .unwrap();

        assert_eq!(session.buffer.len(), 40);
        assert_eq!(session.visible().len(), 24);
        assert_eq!(count(&session, ContentType::Movie), 12);
        assert_eq!(count(&session, ContentType::Series), 12);
        assert_eq!(session.overflow_len(), 16);
        assert!(session.has_more());
        assert_eq!(session.mood, Some(Mood::Happy));
    }

    #[tokio::test]
    async fn test_second_identical_request_is_served_from_cache() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .times(2)
            .returning(|content_type, p, _| Ok(page(content_type, p, 5, 1)));

        let engine = engine(catalog, MockWatchlistStore::new());
        let first = engine
            .select_mood(DiscoverySession::default(), Mood::Relaxed, None, &anonymous())
            .await
            .unwrap();
        let second = engine
            .select_mood(DiscoverySession::default(), Mood::Relaxed, None, &anonymous())
            .await
            .unwrap();

        assert_eq!(first.buffer, second.buffer);
    }

    #[tokio::test]
    async fn test_cache_hit_is_still_personalized() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .with(eq(ContentType::Movie), eq(1), always())
            .times(1)
            .returning(|_, p, _| {
                Ok(DiscoverPage {
                    page: p,
                    results: vec![raw(1, 100.0, &[35]), raw(2, 90.0, &[27])],
                    total_pages: 1,
                })
            });

        let mut watchlist = MockWatchlistStore::new();
        watchlist.expect_get_watchlist().returning(|_| {
            Ok(vec![WatchlistEntry {
                content_id: 9,
                content_type: ContentType::Movie,
                genres: GenreIds(BTreeSet::from([27])),
            }])
        });

        let engine = engine(catalog, watchlist);
        let filters = DiscoveryFilters {
            content_type: ContentScope::Movie,
            ..Default::default()
        };

        // Warm the cache anonymously
        let anon = engine
            .select_mood(DiscoverySession::default(), Mood::Tense, Some(filters.clone()), &anonymous())
            .await
            .unwrap();
        assert_eq!(anon.visible()[0].id, 1);

        let user = Caller::Authenticated {
            user_id: "u1".to_string(),
        };
        let personalized = engine
            .select_mood(DiscoverySession::default(), Mood::Tense, Some(filters), &user)
            .await
            .unwrap();
        assert_eq!(personalized.visible()[0].id, 2);
        assert_eq!(personalized.visible()[0].personalized_score, Some(140.0));
    }

    #[tokio::test]
    async fn test_relaxed_attempt_rescues_empty_mood() {
        let mut catalog = named_catalog();
        catalog.expect_discover().returning(|content_type, p, query| {
            if query.has_genres() {
                Ok(page(content_type, p, 0, 0))
            } else {
                Ok(page(content_type, p, 4, 1))
            }
        });

        let engine = engine(catalog, MockWatchlistStore::new());
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Thoughtful, None, &anonymous())
            .await
            .unwrap();

        assert_eq!(session.buffer.len(), 8);
        assert_eq!(session.attempt, crate::models::FetchAttempt::GenreRelaxed);
    }

    #[tokio::test]
    async fn test_every_page_failing_rejects_with_no_content_found() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .returning(|_, _, _| Err(AppError::ExternalApi("down".to_string())));

        let engine = engine(catalog, MockWatchlistStore::new());
        let err = engine
            .select_mood(DiscoverySession::default(), Mood::Happy, None, &anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoContentFound));
    }

    #[tokio::test]
    async fn test_invalid_filters_rejected_before_fetch() {
        let mut catalog = MockCatalogService::new();
        catalog.expect_discover().never();

        let engine = engine(catalog, MockWatchlistStore::new());
        let filters = DiscoveryFilters {
            min_rating: -1.0,
            ..Default::default()
        };
        let err = engine
            .select_mood(DiscoverySession::default(), Mood::Happy, Some(filters), &anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_load_more_reveals_buffer_then_fetches_next_pages() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .with(always(), eq(1), always())
            .times(2)
            .returning(|content_type, p, _| Ok(page(content_type, p, 20, 3)));
        catalog
            .expect_discover()
            .with(always(), eq(2), always())
            .times(2)
            .returning(|content_type, p, _| Ok(page(content_type, p, 20, 3)));

        let engine = engine(catalog, MockWatchlistStore::new());
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Excited, None, &anonymous())
            .await
            .unwrap();
        assert_eq!(session.visible_count, 24);
        assert_eq!(session.buffer.len(), 40);

        // Buffered reveal: no network
        let session = engine.load_more(session, &anonymous()).await.unwrap();
        assert_eq!(session.visible_count, 40);

        // Buffer exhausted: page 2 for both types
        let session = engine.load_more(session, &anonymous()).await.unwrap();
        assert_eq!(session.buffer.len(), 80);
        assert_eq!(session.visible_count, 64);
        assert_eq!(session.cursors[&ContentType::Movie].next_page, 3);

        let identities: HashSet<_> = session.buffer.iter().map(|i| i.identity()).collect();
        assert_eq!(identities.len(), session.buffer.len());
    }

    #[tokio::test]
    async fn test_load_more_refetches_page_that_failed() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let failed_once = Arc::new(AtomicBool::new(false));
        let mut catalog = named_catalog();
        catalog.expect_discover().returning(move |content_type, p, _| {
            if p == 2 && !failed_once.swap(true, Ordering::SeqCst) {
                return Err(AppError::ExternalApi("flaky".to_string()));
            }
            Ok(page(content_type, p, 5, 10))
        });

        let engine = DiscoveryEngine::new(
            Arc::new(catalog),
            Cache::new(Arc::new(MemoryCacheBackend::new())),
            Arc::new(MockWatchlistStore::new()),
            DiscoverySettings::default(),
        );
        let filters = DiscoveryFilters {
            content_type: ContentScope::Movie,
            ..Default::default()
        };
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Happy, Some(filters), &anonymous())
            .await
            .unwrap();
        assert_eq!(session.buffer.len(), 5);
        assert_eq!(session.cursors[&ContentType::Movie].next_page, 2);

        let session = engine.load_more(session, &anonymous()).await.unwrap();
        let ids: BTreeSet<u64> = session.buffer.iter().map(|i| i.id).collect();
        assert!(ids.contains(&1_200));
        assert!(ids.contains(&1_300));
        assert_eq!(session.cursors[&ContentType::Movie].next_page, 4);
    }

    #[tokio::test]
    async fn test_load_more_without_remaining_pages_is_a_no_op() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .times(2)
            .returning(|content_type, p, _| Ok(page(content_type, p, 3, 1)));

        let engine = engine(catalog, MockWatchlistStore::new());
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Playful, None, &anonymous())
            .await
            .unwrap();
        assert!(!session.has_more());

        let after = engine.load_more(session.clone(), &anonymous()).await.unwrap();
        assert_eq!(after, session);
    }

    #[tokio::test]
    async fn test_apply_filters_keeps_mood_and_uses_fresh_key() {
        let mut catalog = named_catalog();
        catalog
            .expect_discover()
            .times(3)
            .returning(|content_type, p, _| Ok(page(content_type, p, 2, 1)));

        let engine = engine(catalog, MockWatchlistStore::new());
        let session = engine
            .select_mood(DiscoverySession::default(), Mood::Romantic, None, &anonymous())
            .await
            .unwrap();

        let filters = DiscoveryFilters {
            content_type: ContentScope::Series,
            ..Default::default()
        };
        let session = engine
            .apply_filters(session, filters, &anonymous())
            .await
            .unwrap();

        assert_eq!(session.mood, Some(Mood::Romantic));
        assert!(session
            .buffer
            .iter()
            .all(|i| i.content_type == ContentType::Series));
        assert!(!session.cursors.contains_key(&ContentType::Movie));
    }
}
