use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::AppError;

/// TMDB genre identifier
pub type GenreId = u32;

/// Type of content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    #[serde(alias = "tv")]
    Series,
}

impl MediaType {
    /// Path segment the metadata provider uses for this media type
    pub fn tmdb_path(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "tv",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Series => write!(f, "series"),
        }
    }
}

impl FromStr for MediaType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "series" | "tv" => Ok(MediaType::Series),
            other => Err(AppError::Validation(format!("Unknown media type: {}", other))),
        }
    }
}

/// Identity of a title: the provider id is only unique within a media type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct TitleKey {
    pub id: u64,
    pub media_type: MediaType,
}

impl TitleKey {
    pub fn new(id: u64, media_type: MediaType) -> Self {
        Self { id, media_type }
    }
}

impl Display for TitleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.media_type, self.id)
    }
}

/// Descriptive metadata for a movie or series, as supplied by the metadata provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Ordered, most significant genre first
    #[serde(default)]
    pub genre_ids: Vec<GenreId>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub runtime: Option<u32>,
}

impl ContentMetadata {
    /// Creates metadata with only a title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            poster_path: None,
            genre_ids: Vec::new(),
            popularity: 0.0,
            vote_average: 0.0,
            release_date: None,
            runtime: None,
        }
    }
}

/// A movie or series returned by the metadata provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    pub id: u64,
    pub media_type: MediaType,
    #[serde(flatten)]
    pub metadata: ContentMetadata,
}

impl Title {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }
}
