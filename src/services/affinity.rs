use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    models::{GenreAffinityMap, GenreScore, Rating, WatchStatus, WatchlistItem},
    services::watchlist::WatchlistStore,
};

/// Derives per-genre preference scores from the watchlist. Holds no state of
/// its own, so the result is never stale.
#[derive(Clone)]
pub struct GenreAffinityCalculator {
    watchlist: Arc<WatchlistStore>,
}

impl GenreAffinityCalculator {
    pub fn new(watchlist: Arc<WatchlistStore>) -> Self {
        Self { watchlist }
    }

    pub async fn compute(&self) -> GenreAffinityMap {
        score_items(&self.watchlist.all().await)
    }
}

/// How much one item moves each of its genres
fn item_weight(item: &WatchlistItem) -> i64 {
    match (item.status, item.rating) {
        (WatchStatus::Watched, Rating::Liked) => 3,
        (WatchStatus::Watched, Rating::Unrated) => 1,
        (WatchStatus::Watched, Rating::Disliked) => -1,
        (WatchStatus::WantToWatch, _) => 1,
    }
}

/// Sums item weights into every genre each item lists (once per genre)
pub fn score_items(items: &[WatchlistItem]) -> GenreAffinityMap {
    let mut affinity = GenreAffinityMap::new();
    for item in items {
        let weight = item_weight(item);
        let genres: BTreeSet<_> = item.metadata.genre_ids.iter().copied().collect();
        for genre in genres {
            *affinity.entry(genre).or_insert(0) += weight;
        }
    }
    affinity
}

/// Highest-scoring genres first; equal scores by ascending genre id
pub fn top_genres(affinity: &GenreAffinityMap, n: usize) -> Vec<GenreScore> {
    let mut ranked: Vec<GenreScore> = affinity
        .iter()
        .map(|(genre_id, score)| GenreScore {
            genre_id: *genre_id,
            score: *score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.genre_id.cmp(&b.genre_id)));
    ranked.truncate(n);
    ranked
}
