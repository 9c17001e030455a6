pub mod aggregator;
pub mod assistant;
pub mod catalog;
pub mod dedup;
pub mod discovery;
pub mod fallback;
pub mod mood;
pub mod pagination;
pub mod personalization;
pub mod quota;

pub use aggregator::{AggregateBatch, CatalogAggregator, PageRequest};
pub use assistant::{submit_query, AssistantOutcome, LimitReachedResponse};
pub use catalog::{CatalogService, DiscoverQuery, TmdbCatalog};
pub use discovery::{DiscoveryEngine, DiscoverySettings};
pub use fallback::FallbackCascade;
pub use personalization::{GenreAffinityMap, PersonalizationScorer};
pub use quota::{QuotaGovernor, QuotaPolicy};
