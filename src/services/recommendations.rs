use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    clock::Clock,
    models::{
        ContentMetadata, GenreAffinityMap, GenreId, RecommendationBasis, RecommendationItem,
        RecommendationSource, TitleKey, WatchlistItem,
    },
    services::{
        affinity::{top_genres, GenreAffinityCalculator},
        providers::MetadataProvider,
        similarity_index::{cosine_similarity, SimilarityIndex},
        vectorizer::genre_name,
        watchlist::WatchlistStore,
    },
};

pub const AFFINITY_WEIGHT: f64 = 0.7;
pub const SIMILARITY_WEIGHT: f64 = 0.3;

/// Size of the diversity-constrained head of the list
pub const DIVERSITY_WINDOW: usize = 10;
/// Most items any one genre may place in the diversity window
pub const MAX_PER_GENRE: usize = 3;

const SEED_COUNT: usize = 3;
const TOP_GENRE_COUNT: usize = 3;
const GENRE_QUERY_TOP_K: usize = 20;
const GENRE_QUERY_MIN_SCORE: f64 = 0.1;

/// A finished recommendation run and the inputs it was derived from
#[derive(Debug, Clone)]
pub struct GeneratedRecommendations {
    pub items: Vec<RecommendationItem>,
    pub based_on: RecommendationBasis,
}

struct Candidate {
    key: TitleKey,
    metadata: ContentMetadata,
    source: RecommendationSource,
    reason: String,
    similarity: f64,
}

/// Candidates in discovery order; the first branch to offer a title names it
#[derive(Default)]
struct CandidatePool {
    candidates: Vec<Candidate>,
    positions: HashMap<TitleKey, usize>,
}

impl CandidatePool {
    fn offer(
        &mut self,
        key: TitleKey,
        metadata: ContentMetadata,
        source: RecommendationSource,
        reason: &str,
        similarity: f64,
    ) {
        if self.raise_similarity(&key, similarity) {
            return;
        }
        self.positions.insert(key, self.candidates.len());
        self.candidates.push(Candidate {
            key,
            metadata,
            source,
            reason: reason.to_string(),
            similarity,
        });
    }

    /// Keeps the best similarity seen for a known candidate
    fn raise_similarity(&mut self, key: &TitleKey, similarity: f64) -> bool {
        match self.positions.get(key) {
            Some(position) => {
                let candidate = &mut self.candidates[*position];
                candidate.similarity = candidate.similarity.max(similarity);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn score(self, affinity: &GenreAffinityMap) -> Vec<RecommendationItem> {
        self.candidates
            .into_iter()
            .map(|candidate| {
                let score = AFFINITY_WEIGHT
                    * affinity_component(&candidate.metadata.genre_ids, affinity)
                    + SIMILARITY_WEIGHT * candidate.similarity;
                RecommendationItem {
                    id: candidate.key.id,
                    media_type: candidate.key.media_type,
                    title: candidate.metadata.title,
                    poster_path: candidate.metadata.poster_path,
                    genre_ids: candidate.metadata.genre_ids,
                    vote_average: candidate.metadata.vote_average,
                    score,
                    source: candidate.source,
                    reason: candidate.reason,
                }
            })
            .collect()
    }
}

/// Mean over the candidate's genres of its positive affinity, scaled by the
/// strongest affinity. Zero when the user has no positive affinity at all.
pub fn affinity_component(genre_ids: &[GenreId], affinity: &GenreAffinityMap) -> f64 {
    let strongest = affinity.values().copied().max().unwrap_or(0);
    let genres: BTreeSet<GenreId> = genre_ids.iter().copied().collect();
    if strongest <= 0 || genres.is_empty() {
        return 0.0;
    }

    let total: f64 = genres
        .iter()
        .map(|genre| affinity.get(genre).copied().unwrap_or(0).max(0) as f64 / strongest as f64)
        .sum();
    total / genres.len() as f64
}

/// Reorders a ranked list so no genre holds more than `max_per_genre` of the
/// first `window` places. Items that do not fit keep their relative order and
/// follow the constrained head; nothing is dropped.
pub fn diversify(
    items: Vec<RecommendationItem>,
    window: usize,
    max_per_genre: usize,
) -> Vec<RecommendationItem> {
    let mut head = Vec::with_capacity(window.min(items.len()));
    let mut rest = Vec::new();
    let mut genre_counts: HashMap<GenreId, usize> = HashMap::new();

    for item in items {
        let genres: BTreeSet<GenreId> = item.genre_ids.iter().copied().collect();
        let fits = head.len() < window
            && genres
                .iter()
                .all(|genre| genre_counts.get(genre).copied().unwrap_or(0) < max_per_genre);

        if fits {
            for genre in genres {
                *genre_counts.entry(genre).or_insert(0) += 1;
            }
            head.push(item);
        } else {
            rest.push(item);
        }
    }

    head.extend(rest);
    head
}

/// Seeds are watched, not disliked titles: liked before unrated, then most
/// recently watched
fn select_seeds(saved: &[WatchlistItem]) -> Vec<WatchlistItem> {
    let mut seeds: Vec<WatchlistItem> = saved
        .iter()
        .filter(|item| item.is_seed_candidate())
        .cloned()
        .collect();
    seeds.sort_by(|a, b| {
        i8::from(b.rating)
            .cmp(&i8::from(a.rating))
            .then_with(|| b.watched_at.cmp(&a.watched_at))
            .then_with(|| a.key().cmp(&b.key()))
    });
    seeds.truncate(SEED_COUNT);
    seeds
}

/// Ranks titles the user has not saved by how well they match the watchlist
pub struct RecommendationGenerator {
    watchlist: Arc<WatchlistStore>,
    affinity: GenreAffinityCalculator,
    index: Arc<SimilarityIndex>,
    clock: Arc<dyn Clock>,
}

impl RecommendationGenerator {
    pub fn new(
        watchlist: Arc<WatchlistStore>,
        index: Arc<SimilarityIndex>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            affinity: GenreAffinityCalculator::new(watchlist.clone()),
            watchlist,
            index,
            clock,
        }
    }

    pub fn watchlist_revision(&self) -> u64 {
        self.watchlist.revision()
    }

    /// Runs the full pipeline. Provider failures only shrink the candidate
    /// pool; generation itself never fails.
    pub async fn generate(
        &self,
        supplier: &dyn MetadataProvider,
        dismissed: &HashSet<TitleKey>,
    ) -> GeneratedRecommendations {
        // Read before the snapshot: a concurrent mutation can only make the
        // basis look older than it is
        let watchlist_revision = self.watchlist.revision();
        let affinity = self.affinity.compute().await;
        let saved = self.watchlist.all().await;
        let excluded: HashSet<TitleKey> = saved
            .iter()
            .map(WatchlistItem::key)
            .chain(dismissed.iter().copied())
            .collect();
        let seeds = select_seeds(&saved);
        let today = self.clock.now().date_naive();
        let vectorizer = self.index.vectorizer();
        let mut pool = CandidatePool::default();

        for seed in &seeds {
            let titles = match supplier.fetch_similar(seed.id, seed.media_type).await {
                Ok(titles) => titles,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        seed = %seed.key(),
                        operation = "fetch_similar",
                        "Seed fetch failed, continuing without it"
                    );
                    continue;
                }
            };

            let seed_vector = vectorizer.vectorize(seed.media_type, &seed.metadata, today);
            let reason = format!("Similar to {}", seed.metadata.title);
            let mut vectors = Vec::with_capacity(titles.len());

            for title in titles {
                let key = title.key();
                let vector = vectorizer.vectorize(title.media_type, &title.metadata, today);
                vectors.push((key, vector));
                if excluded.contains(&key) {
                    continue;
                }
                pool.offer(
                    key,
                    title.metadata,
                    RecommendationSource::Similar,
                    &reason,
                    cosine_similarity(&seed_vector, &vector),
                );
            }
            self.index.index(vectors);
        }

        let similar_count = pool.len();

        for genre in top_genres(&affinity, TOP_GENRE_COUNT)
            .into_iter()
            .filter(|genre| genre.score > 0)
        {
            let reason = format!("Because you like {}", genre_name(genre.genre_id));
            let hits =
                self.index
                    .query_by_genre(genre.genre_id, GENRE_QUERY_MIN_SCORE, GENRE_QUERY_TOP_K);

            for hit in hits {
                let key = hit.key();
                if excluded.contains(&key) || pool.raise_similarity(&key, hit.score) {
                    continue;
                }
                match supplier.fetch_metadata(key.id, key.media_type).await {
                    Ok(metadata) => pool.offer(
                        key,
                        metadata,
                        RecommendationSource::Genre,
                        &reason,
                        hit.score,
                    ),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            key = %key,
                            operation = "fetch_metadata",
                            "Dropping genre candidate without metadata"
                        );
                    }
                }
            }
        }

        let genre_count = pool.len() - similar_count;
        let mut items = pool.score(&affinity);
        // Stable: equal scores keep discovery order
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        let items = diversify(items, DIVERSITY_WINDOW, MAX_PER_GENRE);

        tracing::info!(
            seeds = seeds.len(),
            similar_candidates = similar_count,
            genre_candidates = genre_count,
            returned = items.len(),
            "Recommendations generated"
        );

        GeneratedRecommendations {
            items,
            based_on: RecommendationBasis {
                affinity,
                liked_ids: seeds.iter().map(WatchlistItem::key).collect(),
                watchlist_revision,
                dismissal_epoch: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::storage::MemoryStorage;
    use crate::error::AppError;
    use crate::models::{MediaType, Rating, Title, WatchStatus, WatchlistPatch};
    use crate::services::providers::MockMetadataProvider;
    use crate::services::vectorizer::ContentVectorizer;
    use chrono::{NaiveDate, TimeZone, Utc};

    struct Fixture {
        store: Arc<WatchlistStore>,
        index: Arc<SimilarityIndex>,
        generator: RecommendationGenerator,
    }

    fn create_fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(WatchlistStore::new(
            Arc::new(MemoryStorage::new()),
            clock.clone(),
        ));
        let index = Arc::new(SimilarityIndex::new(
            ContentVectorizer::default(),
            clock.clone(),
            1000,
        ));
        let generator = RecommendationGenerator::new(store.clone(), index.clone(), clock);
        Fixture {
            store,
            index,
            generator,
        }
    }

    fn metadata(title: &str, genres: &[u32]) -> ContentMetadata {
        ContentMetadata {
            genre_ids: genres.to_vec(),
            popularity: 40.0,
            vote_average: 7.5,
            release_date: NaiveDate::from_ymd_opt(2010, 5, 1),
            ..ContentMetadata::titled(title)
        }
    }

    fn movie(id: u64, title: &str, genres: &[u32]) -> Title {
        Title {
            id,
            media_type: MediaType::Movie,
            metadata: metadata(title, genres),
        }
    }

    async fn add_liked(store: &WatchlistStore, id: u64, title: &str, genres: &[u32]) {
        store
            .add(id, MediaType::Movie, metadata(title, genres), WatchStatus::Watched)
            .await
            .unwrap();
        store
            .update(id, MediaType::Movie, WatchlistPatch::rating(Rating::Liked))
            .await
            .unwrap();
    }

    fn ids(items: &[RecommendationItem]) -> Vec<u64> {
        items.iter().map(|item| item.id).collect()
    }

    #[tokio::test]
    async fn test_similar_candidates_carry_seed_reason() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18, 53]).await;

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_fetch_similar()
            .returning(|_, _| Ok(vec![movie(807, "Se7en", &[80, 9648, 53])]));
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        assert_eq!(ids(&run.items), vec![807]);
        assert_eq!(run.items[0].source, RecommendationSource::Similar);
        assert_eq!(run.items[0].reason, "Similar to Fight Club");
        assert_eq!(run.based_on.liked_ids, vec![TitleKey::new(550, MediaType::Movie)]);
        assert_eq!(run.based_on.affinity.get(&18), Some(&3));
        assert_eq!(run.based_on.watchlist_revision, 2);
        assert!(fixture.index.contains(&TitleKey::new(807, MediaType::Movie)));
    }

    #[tokio::test]
    async fn test_dismissed_and_watchlisted_are_excluded() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18]).await;
        fixture
            .store
            .add(13, MediaType::Movie, metadata("Forrest Gump", &[35, 18]), WatchStatus::WantToWatch)
            .await
            .unwrap();

        let mut provider = MockMetadataProvider::new();
        provider.expect_fetch_similar().returning(|_, _| {
            Ok(vec![
                movie(13, "Forrest Gump", &[35, 18]),
                movie(123, "Dismissed", &[18]),
                movie(680, "Pulp Fiction", &[53, 80]),
            ])
        });
        provider.expect_fetch_metadata().never();

        let dismissed: HashSet<TitleKey> = [TitleKey::new(123, MediaType::Movie)].into();
        let run = fixture.generator.generate(&provider, &dismissed).await;

        assert_eq!(ids(&run.items), vec![680]);
    }

    #[tokio::test]
    async fn test_failed_seed_fetch_is_skipped() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 1, "Broken Seed", &[28]).await;
        add_liked(&fixture.store, 2, "Working Seed", &[28]).await;

        let mut provider = MockMetadataProvider::new();
        provider.expect_fetch_similar().returning(|id, _| {
            if id == 1 {
                Err(AppError::ExternalFetch("TMDB returned status 500".to_string()))
            } else {
                Ok(vec![movie(77, "Action Pick", &[28])])
            }
        });
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        assert_eq!(ids(&run.items), vec![77]);
        assert_eq!(run.items[0].reason, "Similar to Working Seed");
    }

    #[tokio::test]
    async fn test_genre_branch_resolves_metadata() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18]).await;

        let vectorizer = ContentVectorizer::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        fixture.index.index(vec![
            (
                TitleKey::new(999, MediaType::Movie),
                vectorizer.vectorize(MediaType::Movie, &metadata("Drama Pick", &[18]), today),
            ),
            (
                TitleKey::new(998, MediaType::Movie),
                vectorizer.vectorize(MediaType::Movie, &metadata("Unreachable", &[18]), today),
            ),
        ]);

        let mut provider = MockMetadataProvider::new();
        provider.expect_fetch_similar().returning(|_, _| Ok(Vec::new()));
        provider.expect_fetch_metadata().returning(|id, _| {
            if id == 999 {
                Ok(metadata("Drama Pick", &[18]))
            } else {
                Err(AppError::ExternalFetch("timeout".to_string()))
            }
        });

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        assert_eq!(ids(&run.items), vec![999]);
        assert_eq!(run.items[0].source, RecommendationSource::Genre);
        assert_eq!(run.items[0].reason, "Because you like Drama");
    }

    #[tokio::test]
    async fn test_score_weights_affinity_and_similarity() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18, 53]).await;

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_fetch_similar()
            .returning(|_, _| Ok(vec![movie(1, "Drama", &[18]), movie(2, "Comedy", &[35])]));
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        let vectorizer = ContentVectorizer::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let seed = vectorizer.vectorize(MediaType::Movie, &metadata("Fight Club", &[18, 53]), today);
        let drama = vectorizer.vectorize(MediaType::Movie, &metadata("Drama", &[18]), today);
        let comedy = vectorizer.vectorize(MediaType::Movie, &metadata("Comedy", &[35]), today);

        assert_eq!(ids(&run.items), vec![1, 2]);
        let expected_drama = AFFINITY_WEIGHT + SIMILARITY_WEIGHT * cosine_similarity(&seed, &drama);
        let expected_comedy = SIMILARITY_WEIGHT * cosine_similarity(&seed, &comedy);
        assert!((run.items[0].score - expected_drama).abs() < 1e-9);
        assert!((run.items[1].score - expected_comedy).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_diversity_limits_genre_repeats_in_top_ten() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18]).await;

        let mut pool = Vec::new();
        for (offset, genre) in [18, 35, 28, 27].into_iter().enumerate() {
            for n in 0..8 {
                let id = 1000 + (offset as u64) * 100 + n;
                pool.push(movie(id, &format!("Title {}", id), &[genre]));
            }
        }
        let expected_len = pool.len();

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_fetch_similar()
            .returning(move |_, _| Ok(pool.clone()));
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        assert_eq!(run.items.len(), expected_len);
        let mut counts: HashMap<GenreId, usize> = HashMap::new();
        for item in &run.items[..DIVERSITY_WINDOW] {
            for genre in &item.genre_ids {
                *counts.entry(*genre).or_insert(0) += 1;
            }
        }
        assert!(counts.values().all(|count| *count <= MAX_PER_GENRE));
    }

    #[tokio::test]
    async fn test_large_pool_is_reordered_not_shortened() {
        let fixture = create_fixture();
        add_liked(&fixture.store, 550, "Fight Club", &[18]).await;

        let pool: Vec<Title> = (1..=60)
            .map(|id| movie(id, &format!("Drama {}", id), &[18]))
            .collect();

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_fetch_similar()
            .returning(move |_, _| Ok(pool.clone()));
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;

        assert_eq!(run.items.len(), 60);
        let mut returned = ids(&run.items);
        returned.sort_unstable();
        assert_eq!(returned, (1..=60).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_no_seeds_and_no_affinity_yields_nothing() {
        let fixture = create_fixture();
        let mut provider = MockMetadataProvider::new();
        provider.expect_fetch_similar().never();
        provider.expect_fetch_metadata().never();

        let run = fixture
            .generator
            .generate(&provider, &HashSet::new())
            .await;
        assert!(run.items.is_empty());
        assert!(run.based_on.liked_ids.is_empty());
    }

    #[tokio::test]
    async fn test_seeds_prefer_liked_then_recent() {
        let fixture = create_fixture();
        for id in 1..=4 {
            fixture
                .store
                .add(id, MediaType::Movie, metadata("Seen", &[18]), WatchStatus::Watched)
                .await
                .unwrap();
        }
        fixture
            .store
            .update(3, MediaType::Movie, WatchlistPatch::rating(Rating::Liked))
            .await
            .unwrap();
        fixture
            .store
            .update(4, MediaType::Movie, WatchlistPatch::rating(Rating::Disliked))
            .await
            .unwrap();

        let seeds = select_seeds(&fixture.store.all().await);
        let keys: Vec<u64> = seeds.iter().map(|seed| seed.id).collect();
        assert_eq!(keys, vec![3, 1, 2]);
    }

    fn item(id: u64, genres: &[u32]) -> RecommendationItem {
        RecommendationItem {
            id,
            media_type: MediaType::Movie,
            title: format!("Title {}", id),
            poster_path: None,
            genre_ids: genres.to_vec(),
            vote_average: 7.0,
            score: 1.0,
            source: RecommendationSource::Similar,
            reason: String::new(),
        }
    }

    #[test]
    fn test_diversify_appends_skipped_in_original_order() {
        let items = vec![
            item(1, &[18]),
            item(2, &[18]),
            item(3, &[18]),
            item(4, &[18]),
            item(5, &[35]),
            item(6, &[18, 35]),
            item(7, &[28]),
        ];
        let ordered = diversify(items, 10, 3);
        assert_eq!(ids(&ordered), vec![1, 2, 3, 5, 7, 4, 6]);
    }

    #[test]
    fn test_diversify_window_is_bounded() {
        let items: Vec<RecommendationItem> = (1..=12).map(|id| item(id, &[id as u32])).collect();
        let ordered = diversify(items, 10, 3);
        assert_eq!(ids(&ordered), (1..=12).collect::<Vec<u64>>());
    }

    #[test]
    fn test_affinity_component() {
        let mut affinity = GenreAffinityMap::new();
        affinity.insert(18, 4);
        affinity.insert(35, 2);
        affinity.insert(27, -1);

        assert_eq!(affinity_component(&[18], &affinity), 1.0);
        assert_eq!(affinity_component(&[18, 35], &affinity), 0.75);
        assert_eq!(affinity_component(&[27], &affinity), 0.0);
        assert_eq!(affinity_component(&[], &affinity), 0.0);
        assert_eq!(affinity_component(&[18], &GenreAffinityMap::new()), 0.0);
    }
}
