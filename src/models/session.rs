use serde::{Deserialize, Serialize};

use super::{CatalogItem, DiscoveryFilters, FetchAttempt, Mood, PageCursors};

/// Serializable discovery state for one client session
///
/// The pipeline never reads ambient state: the prior session is passed in and a
/// new one is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub mood: Option<Mood>,
    pub filters: DiscoveryFilters,
    /// Bumped for every request started against this session
    pub generation: u64,
    /// Every candidate fetched so far, in display order
    pub buffer: Vec<CatalogItem>,
    pub visible_count: usize,
    pub cursors: PageCursors,
    pub attempt: FetchAttempt,
    /// Echoed back for diagnostics only
    pub retry: u32,
}

impl Default for DiscoverySession {
    fn default() -> Self {
        Self {
            mood: None,
            filters: DiscoveryFilters::default(),
            generation: 0,
            buffer: Vec::new(),
            visible_count: 0,
            cursors: PageCursors::new(),
            attempt: FetchAttempt::Full,
            retry: 0,
        }
    }
}

impl DiscoverySession {
    pub fn visible(&self) -> &[CatalogItem] {
        &self.buffer[..self.visible_count.min(self.buffer.len())]
    }

    /// Buffered items not yet revealed
    pub fn overflow_len(&self) -> usize {
        self.buffer.len().saturating_sub(self.visible_count)
    }

    pub fn has_more(&self) -> bool {
        self.overflow_len() > 0 || self.cursors.values().any(|c| c.has_remaining())
    }

    pub fn page(&self) -> DiscoveryPage {
        DiscoveryPage {
            items: self.visible().to_vec(),
            has_more: self.has_more(),
            generation: self.generation,
            retry: self.retry,
        }
    }
}

/// What the UI layer receives after every discovery operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryPage {
    pub items: Vec<CatalogItem>,
    pub has_more: bool,
    pub generation: u64,
    pub retry: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, PageCursor};
    use std::collections::BTreeSet;

    fn item(id: u64) -> CatalogItem {
        CatalogItem {
            id,
            content_type: ContentType::Movie,
            title: format!("Movie {}", id),
            overview: String::new(),
            poster_ref: None,
            rating: 7.0,
            vote_count: 10,
            popularity: 1.0,
            release_date: None,
            genre_ids: BTreeSet::new(),
            personalized_score: None,
        }
    }

    #[test]
    fn test_visible_is_clamped_to_buffer() {
        let session = DiscoverySession {
            buffer: (1..=5).map(item).collect(),
            visible_count: 24,
            ..Default::default()
        };
        assert_eq!(session.visible().len(), 5);
        assert_eq!(session.overflow_len(), 0);
        assert!(!session.has_more());
    }

    #[test]
    fn test_has_more_from_remaining_pages() {
        let mut session = DiscoverySession {
            buffer: (1..=3).map(item).collect(),
            visible_count: 3,
            ..Default::default()
        };
        session.cursors.insert(
            ContentType::Movie,
            PageCursor {
                next_page: 3,
                total_pages: 10,
            },
        );
        assert!(session.has_more());
    }

    #[test]
    fn test_page_view() {
        let session = DiscoverySession {
            buffer: (1..=4).map(item).collect(),
            visible_count: 2,
            generation: 7,
            retry: 1,
            ..Default::default()
        };
        let page = session.page();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.generation, 7);
        assert_eq!(page.retry, 1);
    }
}
