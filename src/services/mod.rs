pub mod affinity;
pub mod providers;
pub mod recommendation_cache;
pub mod recommendations;
pub mod similarity_index;
pub mod vectorizer;
pub mod watchlist;

pub use affinity::GenreAffinityCalculator;
pub use recommendation_cache::RecommendationCache;
pub use recommendations::RecommendationGenerator;
pub use similarity_index::SimilarityIndex;
pub use vectorizer::ContentVectorizer;
pub use watchlist::WatchlistStore;
