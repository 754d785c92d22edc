/// Read-through caching over [`crate::db::Cache`].
///
/// Returns the cached value for `$key` when present. Otherwise awaits `$block`, queues the
/// result for a background write with `$ttl` seconds to live, and returns it. Expands to an
/// `AppResult`, and cache or block errors are propagated with `?`.
///
/// # Example
/// ```rust,ignore
/// let metadata: Option<TrackMetadata> = cached!(
///     cache,
///     CacheKey::SpotifyTrack(id.to_string()),
///     86_400,
///     client.fetch_track(&id)
/// )?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_from_cache(&key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&key, &value, $ttl);
            Ok(value)
        }
    }};
}
