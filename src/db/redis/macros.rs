/// Read-through caching for provider calls.
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$block`, queues the result for a background write with `$ttl` seconds
/// and returns it. A failing cache read is logged and treated as a miss so
/// an unavailable Redis never takes the API down with it.
///
/// # Arguments
/// * `$cache`: value with `get_from_cache` and `set_in_background` methods.
/// * `$key`: the `CacheKey` to read and write.
/// * `$ttl`: time-to-live in seconds.
/// * `$block`: future producing an `AppResult` on a miss.
///
/// # Example
/// ```rust,ignore
/// let details: MovieDetails = cached!(self.cache, CacheKey::MovieDetails(id), TTL, async move {
///     self.get_json(&format!("/movie/{}", id), &[]).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        let hit = match $cache.get_from_cache(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        };

        match hit {
            Some(cached) => Ok(cached),
            None => match $block.await {
                Ok(value) => {
                    $cache.set_in_background(&key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
