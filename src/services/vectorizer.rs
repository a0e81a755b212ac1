//! Rule-based content embeddings.
//!
//! Layout of the 32 components:
//!
//! | range  | feature                                   |
//! |--------|-------------------------------------------|
//! | 0..18  | genre slots (1.0 / 0.6 / 0.3 by position) |
//! | 18..22 | popularity bucket, one-hot                |
//! | 22..26 | average-rating bucket, one-hot            |
//! | 26..30 | age bucket, one-hot (oldest last)         |
//! | 30..32 | media type, one-hot                       |
//!
//! The whole vector is L2-normalised so cosine similarity is a dot product.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{ContentMetadata, GenreId, MediaType};

pub const EMBEDDING_DIM: usize = 32;

const GENRE_SLOTS: usize = 18;
const POPULARITY_OFFSET: usize = 18;
const RATING_OFFSET: usize = 22;
const AGE_OFFSET: usize = 26;
const MEDIA_TYPE_OFFSET: usize = 30;

/// Genres with a dedicated slot, in slot order
pub const KNOWN_GENRES: [(GenreId, &str); GENRE_SLOTS] = [
    (28, "Action"),
    (12, "Adventure"),
    (16, "Animation"),
    (35, "Comedy"),
    (80, "Crime"),
    (99, "Documentary"),
    (18, "Drama"),
    (10751, "Family"),
    (14, "Fantasy"),
    (36, "History"),
    (27, "Horror"),
    (10402, "Music"),
    (9648, "Mystery"),
    (10749, "Romance"),
    (878, "Science Fiction"),
    (53, "Thriller"),
    (10752, "War"),
    (37, "Western"),
];

/// Series-only genres that share a slot with the nearest movie genre
const GENRE_ALIASES: [(GenreId, GenreId, &str); 4] = [
    (10759, 28, "Action & Adventure"),
    (10762, 10751, "Kids"),
    (10765, 878, "Sci-Fi & Fantasy"),
    (10768, 10752, "War & Politics"),
];

/// Genres that are named but carry no slot
const UNSLOTTED_GENRES: [(GenreId, &str); 5] = [
    (10763, "News"),
    (10764, "Reality"),
    (10766, "Soap"),
    (10767, "Talk"),
    (10770, "TV Movie"),
];

/// Slot index of a genre, following aliases
pub fn genre_slot(genre: GenreId) -> Option<usize> {
    let canonical = GENRE_ALIASES
        .iter()
        .find(|(alias, _, _)| *alias == genre)
        .map(|(_, target, _)| *target)
        .unwrap_or(genre);
    KNOWN_GENRES.iter().position(|(id, _)| *id == canonical)
}

/// Human-readable genre name, used in recommendation reasons
pub fn genre_name(genre: GenreId) -> String {
    KNOWN_GENRES
        .iter()
        .find(|(id, _)| *id == genre)
        .map(|(_, name)| *name)
        .or_else(|| {
            GENRE_ALIASES
                .iter()
                .find(|(alias, _, _)| *alias == genre)
                .map(|(_, _, name)| *name)
        })
        .or_else(|| {
            UNSLOTTED_GENRES
                .iter()
                .find(|(id, _)| *id == genre)
                .map(|(_, name)| *name)
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("Genre {}", genre))
}

/// A fixed-length, L2-normalised (or all-zero) feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector([f64; EMBEDDING_DIM]);

impl EmbeddingVector {
    pub fn zeros() -> Self {
        Self([0.0; EMBEDDING_DIM])
    }

    /// Normalises raw components; an all-zero input stays all-zero
    pub fn normalized(raw: [f64; EMBEDDING_DIM]) -> Self {
        let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Self::zeros();
        }
        let mut components = raw;
        for x in components.iter_mut() {
            *x /= norm;
        }
        Self(components)
    }

    pub fn components(&self) -> &[f64; EMBEDDING_DIM] {
        &self.0
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|x| *x == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopularityBucket {
    Niche,
    Moderate,
    Popular,
    Trending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBucket {
    Poor,
    Mixed,
    Good,
    Acclaimed,
}

/// Age buckets, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyBucket {
    New,
    Recent,
    Modern,
    Classic,
}

impl PopularityBucket {
    fn index(self) -> usize {
        self as usize
    }
}

impl RatingBucket {
    fn index(self) -> usize {
        self as usize
    }
}

impl RecencyBucket {
    fn index(self) -> usize {
        self as usize
    }
}

/// Bucket boundaries. Each array is ascending; a value equal to a threshold
/// falls in the higher bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorizerConfig {
    pub popularity_thresholds: [f64; 3],
    pub rating_thresholds: [f64; 3],
    pub age_thresholds_days: [i64; 3],
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            popularity_thresholds: [10.0, 50.0, 100.0],
            rating_thresholds: [5.0, 6.5, 8.0],
            age_thresholds_days: [365, 5 * 365, 15 * 365],
        }
    }
}

/// Criteria for building a query vector without a concrete item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCriteria {
    #[serde(default)]
    pub genres: Vec<GenreId>,
    #[serde(default)]
    pub popularity: Option<PopularityBucket>,
    #[serde(default)]
    pub rating: Option<RatingBucket>,
    #[serde(default)]
    pub recency: Option<RecencyBucket>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
}

impl QueryCriteria {
    pub fn genre(genre: GenreId) -> Self {
        Self {
            genres: vec![genre],
            ..Self::default()
        }
    }
}

/// Turns metadata into embeddings. Holds only configuration.
#[derive(Debug, Clone, Default)]
pub struct ContentVectorizer {
    config: VectorizerConfig,
}

impl ContentVectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }

    /// Embeds a title. `today` anchors the age computation.
    pub fn vectorize(
        &self,
        media_type: MediaType,
        metadata: &ContentMetadata,
        today: NaiveDate,
    ) -> EmbeddingVector {
        let mut raw = [0.0; EMBEDDING_DIM];
        set_genres(&mut raw, &metadata.genre_ids);

        let popularity = bucket_f64(metadata.popularity, &self.config.popularity_thresholds);
        raw[POPULARITY_OFFSET + popularity] = 1.0;

        let rating = bucket_f64(metadata.vote_average, &self.config.rating_thresholds);
        raw[RATING_OFFSET + rating] = 1.0;

        let age = match metadata.release_date {
            Some(released) => {
                let days = (today - released).num_days();
                self.config
                    .age_thresholds_days
                    .iter()
                    .filter(|threshold| days >= **threshold)
                    .count()
            }
            None => RecencyBucket::Classic.index(),
        };
        raw[AGE_OFFSET + age] = 1.0;

        raw[MEDIA_TYPE_OFFSET + media_type_index(media_type)] = 1.0;

        EmbeddingVector::normalized(raw)
    }

    /// Builds a vector with the item layout from criteria; unspecified groups stay zero
    pub fn query_vector(&self, criteria: &QueryCriteria) -> EmbeddingVector {
        let mut raw = [0.0; EMBEDDING_DIM];
        set_genres(&mut raw, &criteria.genres);

        if let Some(popularity) = criteria.popularity {
            raw[POPULARITY_OFFSET + popularity.index()] = 1.0;
        }
        if let Some(rating) = criteria.rating {
            raw[RATING_OFFSET + rating.index()] = 1.0;
        }
        if let Some(recency) = criteria.recency {
            raw[AGE_OFFSET + recency.index()] = 1.0;
        }
        if let Some(media_type) = criteria.media_type {
            raw[MEDIA_TYPE_OFFSET + media_type_index(media_type)] = 1.0;
        }

        EmbeddingVector::normalized(raw)
    }
}

/// Position weights: first genre 1.0, second 0.6, the rest 0.3. The first
/// occurrence of a slot keeps its weight.
fn set_genres(raw: &mut [f64; EMBEDDING_DIM], genres: &[GenreId]) {
    for (position, genre) in genres.iter().enumerate() {
        let Some(slot) = genre_slot(*genre) else {
            continue;
        };
        if raw[slot] != 0.0 {
            continue;
        }
        raw[slot] = match position {
            0 => 1.0,
            1 => 0.6,
            _ => 0.3,
        };
    }
}

fn bucket_f64(value: f64, thresholds: &[f64; 3]) -> usize {
    thresholds.iter().filter(|threshold| value >= **threshold).count()
}

fn media_type_index(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Movie => 0,
        MediaType::Series => 1,
    }
}
