//! Deduplication and type-balanced interleaving of candidate lists.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::models::{CatalogItem, ItemIdentity};

/// Removes repeated `(content_type, id)` entries
///
/// The last-seen record wins, placed at the position of the first occurrence.
pub fn dedup_by_identity(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let mut unique: IndexMap<ItemIdentity, CatalogItem> = IndexMap::with_capacity(items.len());
    for item in items {
        unique.insert(item.identity(), item);
    }
    unique.into_values().collect()
}

/// Deduplicates and drops anything already in `seen`
pub fn dedup_against(items: Vec<CatalogItem>, seen: &HashSet<ItemIdentity>) -> Vec<CatalogItem> {
    dedup_by_identity(items)
        .into_iter()
        .filter(|item| !seen.contains(&item.identity()))
        .collect()
}

/// Result of interleaving: the first window and everything after it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interleaved {
    pub visible: Vec<CatalogItem>,
    pub overflow: Vec<CatalogItem>,
}

impl Interleaved {
    pub fn into_buffer(self) -> Vec<CatalogItem> {
        let mut buffer = self.visible;
        buffer.extend(self.overflow);
        buffer
    }
}

/// Merges per-type lists into one window, alternating movie/series
///
/// Each type gets at most half the window unless the other type runs out, in
/// which case the leftover slots go to whichever type still has supply. The
/// remainder keeps alternating into the overflow buffer. Each type keeps its
/// internal order.
pub fn interleave(movies: Vec<CatalogItem>, series: Vec<CatalogItem>, window: usize) -> Interleaved {
    let movie_cap = window.div_ceil(2);
    let series_cap = window / 2;

    let mut take_movies = movies.len().min(movie_cap);
    let mut take_series = series.len().min(series_cap);
    let mut leftover = window - take_movies - take_series;

    let extra_movies = (movies.len() - take_movies).min(leftover);
    take_movies += extra_movies;
    leftover -= extra_movies;
    take_series += (series.len() - take_series).min(leftover);

    let mut movies = movies.into_iter();
    let mut series = series.into_iter();

    let visible = alternate(
        movies.by_ref().take(take_movies).collect(),
        series.by_ref().take(take_series).collect(),
    );
    let overflow = alternate(movies.collect(), series.collect());

    Interleaved { visible, overflow }
}

fn alternate(movies: Vec<CatalogItem>, series: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let mut merged = Vec::with_capacity(movies.len() + series.len());
    let mut movies = movies.into_iter();
    let mut series = series.into_iter();

    loop {
        match (movies.next(), series.next()) {
            (None, None) => break,
            (movie, show) => {
                merged.extend(movie);
                merged.extend(show);
            }
        }
    }

    merged
}
