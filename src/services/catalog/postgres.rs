use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{like_pattern, AudioFeatures, ReferenceVector, SearchPage, Track, TrackId},
    services::{
        catalog::CatalogSource,
        similarity::{
            self, DIMENSIONS, EXPLICIT_MISMATCH_PENALTY, SAME_GENRE_BONUS,
            SHARED_ARTIST_BONUS,
        },
    },
};

const TRACK_COLUMNS: &str = "track_id, name, artist_ids, album_id, genre_id, popularity, \
     duration_ms, explicit, danceability, energy, valence, acousticness, instrumentalness, \
     liveness, speechiness, loudness, tempo, key, mode, time_signature";

const FEATURE_COLUMNS: [&str; 12] = [
    "danceability",
    "energy",
    "valence",
    "acousticness",
    "instrumentalness",
    "liveness",
    "speechiness",
    "loudness",
    "tempo",
    "key",
    "mode",
    "time_signature",
];

/// Raw `tracks` row; audio features are nullable columns
#[derive(Debug, sqlx::FromRow)]
struct TrackRow {
    track_id: String,
    name: String,
    artist_ids: Vec<i32>,
    album_id: i32,
    genre_id: Option<i32>,
    popularity: i32,
    duration_ms: i64,
    explicit: bool,
    danceability: Option<f64>,
    energy: Option<f64>,
    valence: Option<f64>,
    acousticness: Option<f64>,
    instrumentalness: Option<f64>,
    liveness: Option<f64>,
    speechiness: Option<f64>,
    loudness: Option<f64>,
    tempo: Option<f64>,
    key: Option<i32>,
    mode: Option<i32>,
    time_signature: Option<i32>,
}

impl TrackRow {
    fn audio_features(&self) -> Option<AudioFeatures> {
        Some(AudioFeatures {
            danceability: self.danceability?,
            energy: self.energy?,
            valence: self.valence?,
            acousticness: self.acousticness?,
            instrumentalness: self.instrumentalness?,
            liveness: self.liveness?,
            speechiness: self.speechiness?,
            loudness: self.loudness?,
            tempo: self.tempo?,
            key: self.key?,
            mode: self.mode?,
            time_signature: self.time_signature?,
        })
    }
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        let audio_features = row.audio_features();
        Track {
            track_id: TrackId(row.track_id),
            name: row.name,
            artist_ids: row.artist_ids,
            album_id: row.album_id,
            genre_id: row.genre_id,
            popularity: row.popularity,
            duration_ms: row.duration_ms,
            explicit: row.explicit,
            audio_features,
        }
    }
}

/// Catalog backed by the PostgreSQL `tracks` table
///
/// Similarity is evaluated inside the database. The score expression is generated
/// from the same dimension table as the in-process metric.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, mut query: QueryBuilder<'static, Postgres>) -> AppResult<Vec<Track>> {
        let rows: Vec<TrackRow> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }
}

fn order_clause(sort_by_popularity: bool) -> &'static str {
    if sort_by_popularity {
        " ORDER BY popularity DESC, track_id ASC"
    } else {
        " ORDER BY name ASC, track_id ASC"
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Appends the weighted distance of one numeric dimension
fn push_numeric_distance(qb: &mut QueryBuilder<'static, Postgres>, column: &str, reference: f64) {
    // Both-zero is covered by the unit-range branch
    if (0.0..=1.0).contains(&reference) {
        qb.push(format!("(CASE WHEN {column} BETWEEN 0 AND 1 THEN ABS({column} - "));
        qb.push_bind(reference);
        qb.push(format!("::float8) ELSE ABS({column} - "));
        qb.push_bind(reference);
        qb.push(format!("::float8) / GREATEST(ABS({column}), "));
        qb.push_bind(reference.abs());
        qb.push("::float8, 1) END)");
    } else {
        qb.push(format!("(ABS({column} - "));
        qb.push_bind(reference);
        qb.push(format!("::float8) / GREATEST(ABS({column}), "));
        qb.push_bind(reference.abs());
        qb.push("::float8, 1))");
    }
}

/// Appends the full similarity score of a row against `reference`
fn push_score(qb: &mut QueryBuilder<'static, Postgres>, reference: &ReferenceVector) {
    let track = reference.track();
    let features = reference.features();

    qb.push("GREATEST(0::float8, (");
    for (i, dimension) in DIMENSIONS.iter().enumerate() {
        if i > 0 {
            qb.push(" + ");
        }
        match dimension.value(track, features) {
            Some(value) => push_numeric_distance(qb, dimension.column(), value),
            None => {
                qb.push(format!("(CASE WHEN {} = ", dimension.column()));
                qb.push_bind(track.explicit);
                qb.push(format!(
                    " THEN 0::float8 ELSE {EXPLICIT_MISMATCH_PENALTY:?}::float8 END)"
                ));
            }
        }
        qb.push(format!(" * {:?}::float8", dimension.weight()));
    }
    qb.push(format!(") / {:?}::float8", similarity::total_weight()));

    if track.genre_id.is_none() && track.artist_ids.is_empty() {
        qb.push(")");
        return;
    }

    // Genre bonus wins over artist bonus
    qb.push(" - CASE");
    if let Some(genre_id) = track.genre_id {
        qb.push(" WHEN genre_id = ");
        qb.push_bind(genre_id);
        qb.push(format!(" THEN {SAME_GENRE_BONUS:?}::float8"));
    }
    if !track.artist_ids.is_empty() {
        qb.push(" WHEN artist_ids && ");
        qb.push_bind(track.artist_ids.clone());
        qb.push(format!("::int4[] THEN {SHARED_ARTIST_BONUS:?}::float8"));
    }
    qb.push(" ELSE 0::float8 END)");
}

/// Builds the thresholded similarity query, optionally restricted to one genre
fn scored_query(
    reference: &ReferenceVector,
    genre_id: Option<i32>,
    threshold: f64,
    n: usize,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM (SELECT ");
    qb.push(TRACK_COLUMNS);
    qb.push(", ");
    push_score(&mut qb, reference);
    qb.push(" AS similarity_score FROM tracks WHERE track_id <> ");
    qb.push_bind(reference.id().as_str().to_string());
    for column in FEATURE_COLUMNS {
        qb.push(format!(" AND {column} IS NOT NULL"));
    }
    if let Some(genre_id) = genre_id {
        qb.push(" AND genre_id = ");
        qb.push_bind(genre_id);
    }
    qb.push(") AS scored WHERE similarity_score < ");
    qb.push_bind(threshold);
    qb.push(" ORDER BY similarity_score ASC, track_id ASC LIMIT ");
    qb.push_bind(limit(n));
    qb
}

/// Appends the name-or-artist match condition for a search pattern
fn push_search_filter(qb: &mut QueryBuilder<'static, Postgres>, pattern: &str) {
    qb.push(" WHERE name ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" OR artist_ids && ARRAY(SELECT artist_id FROM artists WHERE name ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(")");
}

fn search_count_query(pattern: &str) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM tracks");
    push_search_filter(&mut qb, pattern);
    qb
}

/// Name matches first, then artist matches, each by track id
fn search_page_query(pattern: &str, limit_n: usize, offset: usize) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {TRACK_COLUMNS} FROM tracks"));
    push_search_filter(&mut qb, pattern);
    qb.push(" ORDER BY (name ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(") DESC, track_id ASC LIMIT ");
    qb.push_bind(limit(limit_n));
    qb.push(" OFFSET ");
    qb.push_bind(limit(offset));
    qb
}

#[async_trait::async_trait]
impl CatalogSource for PgCatalog {
    #[instrument(level = "debug", skip(self))]
    async fn sample_random(&self, n: usize) -> AppResult<Vec<Track>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY random() LIMIT "
        ));
        qb.push_bind(limit(n));
        self.fetch(qb).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn by_genre(
        &self,
        genre_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE genre_id = "
        ));
        qb.push_bind(genre_id);
        qb.push(order_clause(sort_by_popularity));
        qb.push(" LIMIT ");
        qb.push_bind(limit(n));
        self.fetch(qb).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn by_artist(
        &self,
        artist_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>> {
        let mut qb = QueryBuilder::new(format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE "));
        qb.push_bind(artist_id);
        qb.push(" = ANY(artist_ids)");
        qb.push(order_clause(sort_by_popularity));
        qb.push(" LIMIT ");
        qb.push_bind(limit(n));
        self.fetch(qb).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn by_tempo_window(
        &self,
        target_tempo: f64,
        range_bpm: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE tempo BETWEEN "
        ));
        qb.push_bind(target_tempo - range_bpm);
        qb.push(" AND ");
        qb.push_bind(target_tempo + range_bpm);
        qb.push(" ORDER BY track_id ASC LIMIT ");
        qb.push_bind(limit(n));
        self.fetch(qb).await
    }

    #[instrument(level = "debug", skip(self, reference), fields(reference = %reference.id()))]
    async fn scored_similar(
        &self,
        reference: &ReferenceVector,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        let tracks = self.fetch(scored_query(reference, None, threshold, n)).await?;
        tracing::debug!(
            threshold,
            found = tracks.len(),
            "Scored similarity query"
        );
        Ok(tracks)
    }

    #[instrument(level = "debug", skip(self, reference), fields(reference = %reference.id()))]
    async fn scored_similar_in_genre(
        &self,
        reference: &ReferenceVector,
        genre_id: i32,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        let tracks = self
            .fetch(scored_query(reference, Some(genre_id), threshold, n))
            .await?;
        tracing::debug!(
            threshold,
            genre_id,
            found = tracks.len(),
            "Scored same-genre similarity query"
        );
        Ok(tracks)
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, query: &str, limit: usize, offset: usize) -> AppResult<SearchPage> {
        let pattern = like_pattern(query);

        let mut count = search_count_query(&pattern);
        let (total, tracks) = tokio::try_join!(
            async {
                let total = count
                    .build_query_scalar::<i64>()
                    .fetch_one(&self.pool)
                    .await?;
                Ok::<_, AppError>(total)
            },
            self.fetch(search_page_query(&pattern, limit, offset)),
        )?;

        let total = usize::try_from(total).unwrap_or(0);
        tracing::debug!(total, returned = tracks.len(), "Catalog search");
        Ok(SearchPage::new(tracks, total, offset, limit))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
