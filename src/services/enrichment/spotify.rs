/// Spotify Web API metadata provider
///
/// Authenticates with the client-credentials flow and reads track details:
/// 1. Token: POST {token_url} with grant_type=client_credentials
/// 2. One track: GET {api_url}/tracks/{id}
/// 3. Many tracks: GET {api_url}/tracks?ids=a,b,c (at most 50 per request)
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{embed_url, TrackId, TrackMetadata},
    services::enrichment::MetadataProvider,
};

const METADATA_CACHE_TTL: u64 = 86_400; // 24 hours
const BATCH_SIZE: usize = 50;
/// Tokens are renewed this long before Spotify says they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Known answers per track id; `None` means Spotify does not know the track
type MetadataEntries = HashMap<TrackId, Option<TrackMetadata>>;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

impl AccessToken {
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            value: response.access_token,
            refresh_at: now + Duration::seconds(response.expires_in - TOKEN_REFRESH_MARGIN_SECS),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
    height: Option<u32>,
    width: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracksResponse {
    tracks: Vec<Option<SpotifyTrack>>,
}

impl SpotifyTrack {
    fn into_metadata(self, fetched_at: DateTime<Utc>) -> TrackMetadata {
        let image_url = self
            .album
            .images
            .into_iter()
            .max_by_key(|img| u64::from(img.height.unwrap_or(0)) * u64::from(img.width.unwrap_or(0)))
            .map(|img| img.url);
        let track_id = TrackId::new(self.id);

        TrackMetadata {
            embed_url: embed_url(&track_id),
            track_id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album_name: self.album.name,
            image_url,
            preview_url: self.preview_url,
            spotify_url: self.external_urls.spotify,
            fetched_at,
        }
    }
}

#[derive(Clone)]
pub struct SpotifyClient {
    http_client: HttpClient,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
    cache: Option<Cache>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl SpotifyClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        api_url: String,
        cache: Option<Cache>,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            client_id,
            client_secret,
            token_url,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns a valid bearer token, fetching a new one when close to expiry
    #[instrument(level = "debug", skip(self))]
    async fn access_token(&self) -> AppResult<String> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify token endpoint returned status {}: {}",
                status, body
            )));
        }

        let token = AccessToken::from_response(response.json().await?, now);
        tracing::debug!(refresh_at = %token.refresh_at, "Obtained Spotify access token");

        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    #[instrument(level = "debug", skip(self, track_id), fields(track_id = %track_id))]
    async fn fetch_track(&self, track_id: &TrackId) -> AppResult<Option<TrackMetadata>> {
        let token = self.access_token().await?;
        let url = format!("{}/tracks/{}", self.api_url, track_id);

        let response = self.http_client.get(&url).bearer_auth(token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(track_id = %track_id, "Track not found on Spotify");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify API returned status {}: {}",
                status, body
            )));
        }

        let track: SpotifyTrack = response.json().await?;
        Ok(Some(track.into_metadata(Utc::now())))
    }

    #[instrument(level = "debug", skip(self, token, chunk), fields(chunk_size = chunk.len()))]
    async fn fetch_batch(&self, token: &str, chunk: &[TrackId]) -> AppResult<Vec<TrackMetadata>> {
        let ids = chunk
            .iter()
            .map(TrackId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/tracks", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&[("ids", ids.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify API returned status {}: {}",
                status, body
            )));
        }

        let body: TracksResponse = response.json().await?;
        Ok(collect_tracks(body, Utc::now()))
    }

    /// Cached answers for `track_ids`; read failures count as misses
    async fn cached_entries(&self, cache: &Cache, track_ids: &[TrackId]) -> MetadataEntries {
        let mut entries = MetadataEntries::new();
        for track_id in track_ids {
            if entries.contains_key(track_id) {
                continue;
            }
            let key = CacheKey::SpotifyTrack(track_id.to_string());
            match cache.get_from_cache::<Option<TrackMetadata>>(&key).await {
                Ok(Some(entry)) => {
                    entries.insert(track_id.clone(), entry);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, track_id = %track_id, "Metadata cache read failed");
                }
            }
        }
        entries
    }
}

/// Requested ids without a known answer, first occurrence only
fn missing_ids(track_ids: &[TrackId], known: &MetadataEntries) -> Vec<TrackId> {
    let mut seen = HashSet::new();
    track_ids
        .iter()
        .filter(|id| !known.contains_key(*id) && seen.insert(*id))
        .cloned()
        .collect()
}

/// Answers for one fetched chunk; ids Spotify left out are recorded as unknown
fn chunk_entries(chunk: &[TrackId], fetched: Vec<TrackMetadata>) -> MetadataEntries {
    let mut entries: MetadataEntries = chunk.iter().map(|id| (id.clone(), None)).collect();
    for metadata in fetched {
        entries.insert(metadata.track_id.clone(), Some(metadata));
    }
    entries
}

/// Known metadata in request order, skipping unknown ids
fn in_request_order(track_ids: &[TrackId], known: &MetadataEntries) -> Vec<TrackMetadata> {
    track_ids
        .iter()
        .filter_map(|id| known.get(id).cloned().flatten())
        .collect()
}

/// Converts a batch response, dropping ids Spotify answered with `null`
fn collect_tracks(response: TracksResponse, fetched_at: DateTime<Utc>) -> Vec<TrackMetadata> {
    response
        .tracks
        .into_iter()
        .flatten()
        .map(|t| t.into_metadata(fetched_at))
        .collect()
}

#[async_trait::async_trait]
impl MetadataProvider for SpotifyClient {
    #[instrument(level = "debug", skip(self, track_id), fields(track_id = %track_id))]
    async fn track_metadata(&self, track_id: &TrackId) -> AppResult<Option<TrackMetadata>> {
        match &self.cache {
            Some(cache) => cached!(
                cache,
                CacheKey::SpotifyTrack(track_id.to_string()),
                METADATA_CACHE_TTL,
                self.fetch_track(track_id)
            ),
            None => self.fetch_track(track_id).await,
        }
    }

    #[instrument(level = "debug", skip(self, track_ids), fields(requested = track_ids.len()))]
    async fn tracks_metadata(&self, track_ids: &[TrackId]) -> AppResult<Vec<TrackMetadata>> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut known = match &self.cache {
            Some(cache) => self.cached_entries(cache, track_ids).await,
            None => MetadataEntries::new(),
        };
        let cache_hits = known.len();
        let misses = missing_ids(track_ids, &known);

        if !misses.is_empty() {
            let token = self.access_token().await?;
            for chunk in misses.chunks(BATCH_SIZE) {
                let fetched = match self.fetch_batch(&token, chunk).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        tracing::warn!(error = %e, chunk_size = chunk.len(), "Skipping failed Spotify batch");
                        continue;
                    }
                };

                let entries = chunk_entries(chunk, fetched);
                if let Some(cache) = &self.cache {
                    for (track_id, entry) in &entries {
                        let key = CacheKey::SpotifyTrack(track_id.to_string());
                        cache.set_in_background(&key, entry, METADATA_CACHE_TTL);
                    }
                }
                known.extend(entries);
            }
        }

        let found = in_request_order(track_ids, &known);
        tracing::info!(
            requested = track_ids.len(),
            cache_hits,
            fetched = misses.len(),
            found = found.len(),
            "Resolved Spotify metadata batch"
        );

        Ok(found)
    }

    fn name(&self) -> &'static str {
        "spotify"
    }
}
