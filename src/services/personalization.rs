use std::collections::HashMap;

use crate::{
    db::WatchlistStore,
    models::{Caller, CatalogItem, WatchlistEntry},
};

/// Default boost per matching watchlist genre occurrence
pub const DEFAULT_AFFINITY_WEIGHT: f64 = 50.0;

/// Genre id → number of saved watchlist entries carrying it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreAffinityMap(HashMap<u32, u32>);

impl GenreAffinityMap {
    pub fn from_entries(entries: &[WatchlistEntry]) -> Self {
        let mut counts = HashMap::new();
        for entry in entries {
            for genre in &entry.genres.0 {
                *counts.entry(*genre).or_insert(0) += 1;
            }
        }
        Self(counts)
    }

    pub fn count(&self, genre: u32) -> u32 {
        self.0.get(&genre).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of affinities for the item's genres
    pub fn affinity_for(&self, item: &CatalogItem) -> u32 {
        item.genre_ids.iter().map(|g| self.count(*g)).sum()
    }
}

/// Builds the caller's affinity map; anonymous callers and lookup failures get `None`
pub async fn load_affinity(
    watchlist: &dyn WatchlistStore,
    caller: &Caller,
) -> Option<GenreAffinityMap> {
    let user_id = caller.user_id()?;

    match watchlist.get_watchlist(user_id).await {
        Ok(entries) => {
            let affinity = GenreAffinityMap::from_entries(&entries);
            tracing::debug!(
                user_id = %user_id,
                entries = entries.len(),
                genres = affinity.0.len(),
                "Genre affinity built"
            );
            Some(affinity)
        }
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Watchlist lookup failed, skipping personalization");
            None
        }
    }
}

/// Re-ranks candidates by popularity plus weighted genre affinity
#[derive(Debug, Clone, Copy)]
pub struct PersonalizationScorer {
    weight: f64,
}

impl Default for PersonalizationScorer {
    fn default() -> Self {
        Self::new(DEFAULT_AFFINITY_WEIGHT)
    }
}

impl PersonalizationScorer {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    /// Sorts descending by score with a stable sort
    ///
    /// Without an affinity map the score is popularity and ties keep fetch order.
    /// With one, `personalized_score` is attached and ties fall back to
    /// popularity, then fetch order.
    pub fn score(
        &self,
        mut items: Vec<CatalogItem>,
        affinity: Option<&GenreAffinityMap>,
    ) -> Vec<CatalogItem> {
        match affinity {
            None => {
                items.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
            }
            Some(affinity) => {
                for item in &mut items {
                    let boost = self.weight * f64::from(affinity.affinity_for(item));
                    item.personalized_score = Some(item.popularity + boost);
                }
                items.sort_by(|a, b| {
                    let score_a = a.personalized_score.unwrap_or(a.popularity);
                    let score_b = b.personalized_score.unwrap_or(b.popularity);
                    score_b
                        .total_cmp(&score_a)
                        .then_with(|| b.popularity.total_cmp(&a.popularity))
                });
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::watchlist::MockWatchlistStore;
    use crate::error::AppError;
    use crate::models::{ContentType, GenreIds};
    use std::collections::BTreeSet;

    fn item(id: u64, popularity: f64, genres: &[u32]) -> CatalogItem {
        CatalogItem {
            id,
            content_type: ContentType::Movie,
            title: format!("Movie {}", id),
            overview: String::new(),
            poster_ref: None,
            rating: 7.0,
            vote_count: 100,
            popularity,
            release_date: None,
            genre_ids: genres.iter().copied().collect(),
            personalized_score: None,
        }
    }

    fn entry(id: u64, genres: &[u32]) -> WatchlistEntry {
        WatchlistEntry {
            content_id: id,
            content_type: ContentType::Movie,
            genres: GenreIds(genres.iter().copied().collect::<BTreeSet<_>>()),
        }
    }

    fn ids(items: &[CatalogItem]) -> Vec<u64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_affinity_counts_genre_occurrences() {
        let affinity = GenreAffinityMap::from_entries(&[
            entry(1, &[35, 18]),
            entry(2, &[35]),
            entry(3, &[]),
        ]);
        assert_eq!(affinity.count(35), 2);
        assert_eq!(affinity.count(18), 1);
        assert_eq!(affinity.count(99), 0);
        assert_eq!(affinity.affinity_for(&item(9, 0.0, &[35, 18, 99])), 3);
    }

    #[test]
    fn test_anonymous_sorts_by_popularity_stably() {
        let items = vec![
            item(1, 10.0, &[]),
            item(2, 30.0, &[]),
            item(3, 10.0, &[]),
            item(4, 20.0, &[]),
        ];
        let scored = PersonalizationScorer::default().score(items, None);
        assert_eq!(ids(&scored), vec![2, 4, 1, 3]);
        assert!(scored.iter().all(|i| i.personalized_score.is_none()));
    }

    #[test]
    fn test_affinity_boost_reorders() {
        let affinity = GenreAffinityMap::from_entries(&[entry(1, &[27]), entry(2, &[27])]);
        let items = vec![item(1, 100.0, &[35]), item(2, 20.0, &[27])];

        let scored = PersonalizationScorer::new(50.0).score(items, Some(&affinity));
        assert_eq!(ids(&scored), vec![2, 1]);
        assert_eq!(scored[0].personalized_score, Some(120.0));
        assert_eq!(scored[1].personalized_score, Some(100.0));
    }

    #[test]
    fn test_personalized_order_is_non_increasing() {
        let affinity =
            GenreAffinityMap::from_entries(&[entry(1, &[35, 18]), entry(2, &[35]), entry(3, &[99])]);
        let items: Vec<CatalogItem> = (0..20)
            .map(|i| {
                let genres: &[u32] = match i % 4 {
                    0 => &[35],
                    1 => &[18, 99],
                    2 => &[],
                    _ => &[35, 18],
                };
                item(i, ((i * 37) % 11) as f64 * 9.5, genres)
            })
            .collect();

        let scored = PersonalizationScorer::default().score(items, Some(&affinity));
        for pair in scored.windows(2) {
            assert!(pair[0].personalized_score >= pair[1].personalized_score);
        }
    }

    #[test]
    fn test_ties_break_by_popularity_then_order() {
        let affinity = GenreAffinityMap::from_entries(&[entry(1, &[35])]);
        // 1: 10 + 50 = 60, 2: 60 + 0 = 60, 3: 60 + 0 = 60
        let items = vec![item(1, 10.0, &[35]), item(2, 60.0, &[]), item(3, 60.0, &[])];

        let scored = PersonalizationScorer::new(50.0).score(items, Some(&affinity));
        assert_eq!(ids(&scored), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_load_affinity_for_anonymous_is_none() {
        let mut mock = MockWatchlistStore::new();
        mock.expect_get_watchlist().never();

        let caller = Caller::Anonymous {
            session_token: "s".to_string(),
        };
        assert!(load_affinity(&mock, &caller).await.is_none());
    }

    #[tokio::test]
    async fn test_load_affinity_absorbs_failures() {
        let mut mock = MockWatchlistStore::new();
        mock.expect_get_watchlist()
            .returning(|_| Err(AppError::Internal("db down".to_string())));

        let caller = Caller::Authenticated {
            user_id: "u1".to_string(),
        };
        assert!(load_affinity(&mock, &caller).await.is_none());
    }

    #[tokio::test]
    async fn test_load_affinity_builds_map() {
        let mut mock = MockWatchlistStore::new();
        mock.expect_get_watchlist()
            .withf(|user_id| user_id == "u1")
            .returning(|_| Ok(vec![entry(1, &[35]), entry(2, &[35, 16])]));

        let caller = Caller::Authenticated {
            user_id: "u1".to_string(),
        };
        let affinity = load_affinity(&mock, &caller).await.unwrap();
        assert_eq!(affinity.count(35), 2);
        assert_eq!(affinity.count(16), 1);
    }
}
