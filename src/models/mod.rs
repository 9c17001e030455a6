use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

pub mod mood;
pub mod quota;
pub mod session;

pub use mood::Mood;
pub use quota::{Caller, QuotaSubject, UsageLimits, UsageQuota};
pub use session::{DiscoveryPage, DiscoverySession};

/// Kind of catalog entry; ids are only unique within one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
}

impl ContentType {
    /// Path segment the catalog uses for this kind
    pub fn catalog_path(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "tv",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Movie => write!(f, "movie"),
            ContentType::Series => write!(f, "series"),
        }
    }
}

/// Which content types a discovery request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentScope {
    Movie,
    Series,
    #[default]
    All,
}

impl ContentScope {
    pub fn content_types(&self) -> Vec<ContentType> {
        match self {
            ContentScope::Movie => vec![ContentType::Movie],
            ContentScope::Series => vec![ContentType::Series],
            ContentScope::All => vec![ContentType::Movie, ContentType::Series],
        }
    }
}

impl Display for ContentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentScope::Movie => write!(f, "movie"),
            ContentScope::Series => write!(f, "series"),
            ContentScope::All => write!(f, "all"),
        }
    }
}

/// Filter set for one discovery request
///
/// Compared by value: two requests with equal filters share a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryFilters {
    pub platforms: BTreeSet<u32>,
    pub content_type: ContentScope,
    pub min_rating: f32,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

impl Default for DiscoveryFilters {
    fn default() -> Self {
        Self {
            platforms: BTreeSet::new(),
            content_type: ContentScope::All,
            min_rating: 0.0,
            year_from: None,
            year_to: None,
        }
    }
}

impl DiscoveryFilters {
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=10.0).contains(&self.min_rating) {
            return Err(AppError::InvalidInput(format!(
                "min_rating must be between 0 and 10, got {}",
                self.min_rating
            )));
        }

        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(AppError::InvalidInput(format!(
                    "year_from ({}) is after year_to ({})",
                    from, to
                )));
            }
        }

        Ok(())
    }
}

/// One discoverable movie or series, normalized from a catalog record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: u64,
    pub content_type: ContentType,
    pub title: String,
    pub overview: String,
    pub poster_ref: Option<String>,
    pub rating: f32,
    pub vote_count: u32,
    pub popularity: f64,
    pub release_date: Option<NaiveDate>,
    pub genre_ids: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized_score: Option<f64>,
}

/// Unique identity of an item inside any candidate pool
pub type ItemIdentity = (ContentType, u64);

impl CatalogItem {
    pub fn identity(&self) -> ItemIdentity {
        (self.content_type, self.id)
    }

    /// Normalizes a raw catalog record; missing optional fields fall back to empty values
    pub fn from_raw(content_type: ContentType, raw: RawItem) -> Self {
        let title = raw.title.or(raw.name).unwrap_or_default();
        let date = match content_type {
            ContentType::Movie => raw.release_date.or(raw.first_air_date),
            ContentType::Series => raw.first_air_date.or(raw.release_date),
        };

        Self {
            id: raw.id,
            content_type,
            title,
            overview: raw.overview.unwrap_or_default(),
            poster_ref: raw.poster_path.filter(|p| !p.is_empty()),
            rating: raw.vote_average.unwrap_or(0.0),
            vote_count: raw.vote_count.unwrap_or(0),
            popularity: raw.popularity.unwrap_or(0.0),
            release_date: date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            genre_ids: raw.genre_ids.0,
            personalized_score: None,
        }
    }
}

/// Genre ids as delivered by loosely-typed sources
///
/// Accepts an integer array, an array of numeric strings, a single integer, or a
/// string separated by commas or pipes. Unparseable entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreIds(pub BTreeSet<u32>);

impl GenreIds {
    pub fn from_value(value: &Value) -> Self {
        let mut ids = BTreeSet::new();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    ids.extend(Self::from_value(entry).0);
                }
            }
            Value::Number(n) => {
                if let Some(id) = n.as_u64().and_then(|id| u32::try_from(id).ok()) {
                    ids.insert(id);
                }
            }
            Value::String(s) => {
                ids.extend(
                    s.split([',', '|'])
                        .filter_map(|part| part.trim().parse::<u32>().ok()),
                );
            }
            _ => {}
        }
        Self(ids)
    }
}

impl<'de> Deserialize<'de> for GenreIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

// ============================================================================
// Catalog API Types
// ============================================================================

/// Raw record from the catalog's discover endpoint (movie and tv share the shape)
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
    #[serde(default)]
    pub vote_count: Option<u32>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub genre_ids: GenreIds,
}

/// One page of discover results
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<RawItem>,
    #[serde(default)]
    pub total_pages: u32,
}

/// Next unseen page and known page count for one content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub next_page: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn start() -> Self {
        Self {
            next_page: 1,
            total_pages: 1,
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.next_page <= self.total_pages
    }
}

pub type PageCursors = BTreeMap<ContentType, PageCursor>;

/// Which fallback step produced a candidate pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchAttempt {
    /// Mood genres, platforms and rating floor
    #[default]
    Full,
    /// Genre restriction dropped, everything else kept
    GenreRelaxed,
}

/// Deduplicated, mood/filter-scoped candidates before personalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePool {
    pub movies: Vec<CatalogItem>,
    pub series: Vec<CatalogItem>,
    pub cursors: PageCursors,
    pub attempt: FetchAttempt,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.movies.len() + self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Saved watchlist entry, used only to derive genre affinity
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEntry {
    pub content_id: u64,
    pub content_type: ContentType,
    pub genres: GenreIds,
}
