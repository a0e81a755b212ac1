//! TMDB API provider
//!
//! API Flow:
//! 1. Metadata: /{movie|tv}/{id} → title, genres, popularity, rating, release date
//! 2. Similar: /{movie|tv}/{id}/similar → first page of similar titles
//! 3. Providers: /{movie|tv}/{id}/watch/providers → services per region
//!
//! Movies and series use different field names for the same things
//! (`title`/`name`, `release_date`/`first_air_date`); both are accepted.

use crate::{
    error::{AppError, AppResult},
    models::{ContentMetadata, GenreId, MediaType, Title},
    services::providers::MetadataProvider,
};
use chrono::NaiveDate;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashMap;

/// Region whose watch providers are reported
const WATCH_REGION: &str = "US";

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: GenreId,
}

#[derive(Debug, Deserialize)]
struct TmdbDetails {
    #[serde(alias = "name")]
    title: String,
    poster_path: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_average: f64,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    runtime: Option<u32>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbListItem {
    id: u64,
    #[serde(alias = "name")]
    title: String,
    poster_path: Option<String>,
    #[serde(default)]
    genre_ids: Vec<GenreId>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_average: f64,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbPage {
    #[serde(default)]
    results: Vec<TmdbListItem>,
}

#[derive(Debug, Deserialize)]
struct TmdbWatchProvider {
    provider_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbRegionProviders {
    #[serde(default)]
    flatrate: Vec<TmdbWatchProvider>,
    #[serde(default)]
    free: Vec<TmdbWatchProvider>,
    #[serde(default)]
    ads: Vec<TmdbWatchProvider>,
    #[serde(default)]
    rent: Vec<TmdbWatchProvider>,
    #[serde(default)]
    buy: Vec<TmdbWatchProvider>,
}

#[derive(Debug, Deserialize)]
struct TmdbWatchProviders {
    #[serde(default)]
    results: HashMap<String, TmdbRegionProviders>,
}

/// TMDB sends `""` for unknown dates
fn parse_release_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.filter(|date| !date.is_empty())
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

impl From<TmdbDetails> for ContentMetadata {
    fn from(details: TmdbDetails) -> Self {
        let runtime = details
            .runtime
            .or_else(|| details.episode_run_time.first().copied());
        ContentMetadata {
            title: details.title,
            poster_path: details.poster_path,
            genre_ids: details.genres.iter().map(|genre| genre.id).collect(),
            popularity: details.popularity,
            vote_average: details.vote_average,
            release_date: parse_release_date(details.release_date.as_deref()),
            runtime,
        }
    }
}

impl TmdbListItem {
    fn into_title(self, media_type: MediaType) -> Title {
        Title {
            id: self.id,
            media_type,
            metadata: ContentMetadata {
                title: self.title,
                poster_path: self.poster_path,
                genre_ids: self.genre_ids,
                popularity: self.popularity,
                vote_average: self.vote_average,
                release_date: parse_release_date(self.release_date.as_deref()),
                runtime: None,
            },
        }
    }
}

/// Streaming services for one region, subscription tiers first, de-duplicated
fn region_services(region: TmdbRegionProviders) -> Vec<String> {
    let mut services: Vec<String> = Vec::new();
    for provider in region
        .flatrate
        .into_iter()
        .chain(region.free)
        .chain(region.ads)
        .chain(region.rent)
        .chain(region.buy)
    {
        if !services.contains(&provider.provider_name) {
            services.push(provider.provider_name);
        }
    }
    services
}

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, id: u64, media_type: MediaType, suffix: &str) -> String {
        format!("{}/{}/{}{}", self.api_url, media_type.tmdb_path(), id, suffix)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> AppResult<T> {
        let response = self
            .http_client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("TMDB has no resource at {}", url)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalFetch(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to deserialize TMDB response");
            AppError::ExternalFetch(format!("Failed to parse TMDB response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn fetch_metadata(&self, id: u64, media_type: MediaType) -> AppResult<ContentMetadata> {
        let details: TmdbDetails = self.get_json(&self.url(id, media_type, "")).await?;
        let metadata = ContentMetadata::from(details);

        tracing::info!(
            id = id,
            media_type = %media_type,
            genres = metadata.genre_ids.len(),
            provider = "tmdb",
            "Metadata fetched"
        );
        Ok(metadata)
    }

    async fn fetch_similar(&self, id: u64, media_type: MediaType) -> AppResult<Vec<Title>> {
        let page: TmdbPage = self.get_json(&self.url(id, media_type, "/similar")).await?;
        let titles: Vec<Title> = page
            .results
            .into_iter()
            .map(|item| item.into_title(media_type))
            .collect();

        tracing::info!(
            id = id,
            media_type = %media_type,
            results = titles.len(),
            provider = "tmdb",
            "Similar titles fetched"
        );
        Ok(titles)
    }

    async fn fetch_providers(&self, id: u64, media_type: MediaType) -> AppResult<Vec<String>> {
        let mut providers: TmdbWatchProviders = self
            .get_json(&self.url(id, media_type, "/watch/providers"))
            .await?;
        let services = providers
            .results
            .remove(WATCH_REGION)
            .map(region_services)
            .unwrap_or_default();

        tracing::info!(
            id = id,
            media_type = %media_type,
            services = services.len(),
            region = WATCH_REGION,
            provider = "tmdb",
            "Watch providers fetched"
        );
        Ok(services)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_details_conversion() {
        let json = r#"{
            "id": 550,
            "title": "Fight Club",
            "poster_path": "/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 53, "name": "Thriller"}],
            "popularity": 45.2,
            "vote_average": 8.4,
            "release_date": "1999-10-15",
            "runtime": 139
        }"#;
        let details: TmdbDetails = serde_json::from_str(json).unwrap();
        let metadata = ContentMetadata::from(details);

        assert_eq!(metadata.title, "Fight Club");
        assert_eq!(metadata.genre_ids, vec![18, 53]);
        assert_eq!(metadata.release_date, NaiveDate::from_ymd_opt(1999, 10, 15));
        assert_eq!(metadata.runtime, Some(139));
    }

    #[test]
    fn test_series_details_conversion() {
        let json = r#"{
            "id": 1399,
            "name": "Game of Thrones",
            "poster_path": null,
            "genres": [{"id": 10765, "name": "Sci-Fi & Fantasy"}],
            "popularity": 300.0,
            "vote_average": 8.4,
            "first_air_date": "2011-04-17",
            "episode_run_time": [60]
        }"#;
        let details: TmdbDetails = serde_json::from_str(json).unwrap();
        let metadata = ContentMetadata::from(details);

        assert_eq!(metadata.title, "Game of Thrones");
        assert_eq!(metadata.genre_ids, vec![10765]);
        assert_eq!(metadata.release_date, NaiveDate::from_ymd_opt(2011, 4, 17));
        assert_eq!(metadata.runtime, Some(60));
        assert!(metadata.poster_path.is_none());
    }

    #[test]
    fn test_empty_release_date_is_none() {
        assert_eq!(parse_release_date(Some("")), None);
        assert_eq!(parse_release_date(Some("not-a-date")), None);
        assert_eq!(parse_release_date(None), None);
    }

    #[test]
    fn test_similar_page_conversion() {
        let json = r#"{
            "page": 1,
            "results": [
                {"id": 807, "title": "Se7en", "genre_ids": [80, 9648, 53], "popularity": 60.1, "vote_average": 8.4, "release_date": "1995-09-22"},
                {"id": 1, "title": "Untitled", "release_date": ""}
            ]
        }"#;
        let page: TmdbPage = serde_json::from_str(json).unwrap();
        let titles: Vec<Title> = page
            .results
            .into_iter()
            .map(|item| item.into_title(MediaType::Movie))
            .collect();

        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].id, 807);
        assert_eq!(titles[0].metadata.genre_ids, vec![80, 9648, 53]);
        assert_eq!(titles[1].metadata.release_date, None);
        assert_eq!(titles[1].metadata.popularity, 0.0);
    }

    #[test]
    fn test_region_services_deduplicates() {
        let json = r#"{
            "id": 550,
            "results": {
                "US": {
                    "flatrate": [{"provider_id": 8, "provider_name": "Netflix"}],
                    "rent": [{"provider_id": 2, "provider_name": "Apple TV"}],
                    "buy": [{"provider_id": 2, "provider_name": "Apple TV"}]
                },
                "GB": {"flatrate": [{"provider_id": 9, "provider_name": "Prime Video"}]}
            }
        }"#;
        let mut providers: TmdbWatchProviders = serde_json::from_str(json).unwrap();
        let services = region_services(providers.results.remove(WATCH_REGION).unwrap());
        assert_eq!(services, vec!["Netflix".to_string(), "Apple TV".to_string()]);
    }

    #[test]
    fn test_url_layout() {
        let provider = TmdbProvider::new("key".to_string(), "https://api.themoviedb.org/3/".to_string());
        assert_eq!(
            provider.url(1399, MediaType::Series, "/similar"),
            "https://api.themoviedb.org/3/tv/1399/similar"
        );
    }
}
